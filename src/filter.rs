use crate::config::{check_thresholds, OwwConfig};
use crate::error::ConfigError;
use circular_buffer::CircularBuffer;
use log::{debug, warn};
use std::collections::HashMap;

/// Upper bound for the moving average length.
pub const MAX_ACTIVATION_SAMPLES: usize = 32;

const TRACE_AVERAGE: f32 = 0.1; // averages above this get logged

/// Moving average window and trigger state of one wake word.
#[derive(Debug, Clone)]
pub struct WakewordState {
    scores: CircularBuffer<MAX_ACTIVATION_SAMPLES, f32>,
    capacity: usize,
    active: bool,
}

impl WakewordState {
    fn new(capacity: usize) -> Self {
        WakewordState {
            scores: CircularBuffer::new(),
            capacity,
            active: false,
        }
    }

    fn record(&mut self, score: f32) {
        if self.scores.len() == self.capacity {
            self.scores.pop_front();
        }
        self.scores.push_back(score);
    }

    /// Mean of the buffered scores. Uses however many are buffered, so it warms up
    /// with fewer than `capacity` samples.
    pub fn moving_average(&self) -> f32 {
        if self.scores.is_empty() {
            return 0.0;
        }
        self.scores.iter().sum::<f32>() / self.scores.len() as f32
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn scores(&self) -> Vec<f32> {
        self.scores.to_vec()
    }
}

/// Turns per-window confidences into one trigger per utterance.
///
/// Each label fires once when its moving average reaches the activation threshold and
/// stays quiet until the average falls below the deactivation threshold, which re-arms it
/// without firing.
#[derive(Debug)]
pub struct ActivationFilter {
    states: HashMap<String, WakewordState>,
    activation_threshold: f32,
    deactivation_threshold: f32,
    activation_samples: usize,
}

impl ActivationFilter {
    pub fn new(activation_threshold: f32, deactivation_threshold: f32, activation_samples: usize) -> Result<Self, ConfigError> {
        check_thresholds(activation_threshold, deactivation_threshold)?;
        if activation_samples == 0 || activation_samples > MAX_ACTIVATION_SAMPLES {
            return Err(ConfigError::ActivationSamples {
                value: activation_samples,
                max: MAX_ACTIVATION_SAMPLES,
            });
        }
        Ok(ActivationFilter {
            states: HashMap::new(),
            activation_threshold,
            deactivation_threshold,
            activation_samples,
        })
    }

    pub fn from_config(config: &OwwConfig) -> Result<Self, ConfigError> {
        Self::new(
            config.activation_threshold,
            config.deactivation_threshold,
            config.activation_samples,
        )
    }

    pub fn activation_threshold(&self) -> f32 {
        self.activation_threshold
    }

    /// Records one confidence for `label`; true only on the Inactive -> Active edge.
    pub fn observe(&mut self, label: &str, confidence: f32) -> bool {
        if !confidence.is_finite() {
            warn!("Ignoring non-finite confidence {} for {}", confidence, label);
            return false;
        }
        let capacity = self.activation_samples;
        let state = self
            .states
            .entry(label.to_string())
            .or_insert_with(|| WakewordState::new(capacity));
        state.record(confidence);

        let moving_average = state.moving_average();
        let mut activated = false;
        if !state.active && moving_average >= self.activation_threshold {
            state.active = true;
            activated = true;
        } else if state.active && moving_average < self.deactivation_threshold {
            state.active = false;
        }

        if moving_average > TRACE_AVERAGE {
            debug!(
                "{:<16} {:<8} avg {:.3} active {} scores {:?}",
                label,
                activated,
                moving_average,
                state.active,
                state.scores()
            );
        }
        activated
    }

    pub fn is_active(&self, label: &str) -> bool {
        self.states.get(label).is_some_and(WakewordState::is_active)
    }

    pub fn state(&self, label: &str) -> Option<&WakewordState> {
        self.states.get(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }
}
