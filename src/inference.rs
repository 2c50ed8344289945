use crate::error::InferenceError;
use crate::rms::rms_level;
use std::collections::HashMap;

/// label -> confidence in [0, 1]
pub type Prediction = HashMap<String, f32>;

/// Scores one analysis window.
///
/// `predict` is called once per window, in order, on tokio's blocking pool, so a slow model
/// never stalls the UDP sources. It may block but must not re-enter the runtime.
pub trait Inference {
    fn predict(&mut self, window: &[i16]) -> Result<Prediction, InferenceError>;

    /// Every label `predict` can ever return, when known up front. Used at startup to refuse
    /// an allow-list that could never match.
    fn labels(&self) -> Option<Vec<String>> {
        None
    }
}

impl<F> Inference for F
where
    F: FnMut(&[i16]) -> Result<Prediction, InferenceError>,
{
    fn predict(&mut self, window: &[i16]) -> Result<Prediction, InferenceError> {
        self(window)
    }
}

pub const DEFAULT_RMS_LABEL: &str = "energy";
pub const DEFAULT_FULL_SCALE_RMS: f32 = 5000.0; // loud speech close to the mic

/// Energy scorer for running the bridge without a wake word model.
///
/// Emits a single label whose confidence is the window RMS relative to `full_scale`.
#[derive(Debug, Clone)]
pub struct RmsInference {
    label: String,
    full_scale: f32,
}

impl RmsInference {
    pub fn new(label: &str, full_scale: f32) -> Self {
        RmsInference {
            label: label.to_string(),
            full_scale,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Default for RmsInference {
    fn default() -> Self {
        RmsInference::new(DEFAULT_RMS_LABEL, DEFAULT_FULL_SCALE_RMS)
    }
}

impl Inference for RmsInference {
    fn predict(&mut self, window: &[i16]) -> Result<Prediction, InferenceError> {
        if window.is_empty() {
            return Err(InferenceError("empty window".to_string()));
        }
        Ok(HashMap::from([(self.label.clone(), rms_level(window, self.full_scale))]))
    }

    fn labels(&self) -> Option<Vec<String>> {
        Some(vec![self.label.clone()])
    }
}
