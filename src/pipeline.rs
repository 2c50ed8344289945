use crate::chunk::AnalysisWindow;
use crate::config::OwwConfig;
use crate::error::{ConfigError, InferenceError};
use crate::filter::ActivationFilter;
use crate::hermes::DetectionEvent;
use crate::inference::Inference;
use crate::publish::Publisher;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::HashSet;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::{self, JoinError};
use tokio_util::sync::CancellationToken;

/// Labels that may be published. Every label still goes through the filter.
#[derive(Debug, Clone, PartialEq)]
pub enum AllowList {
    Any,
    Labels(HashSet<String>),
}

impl AllowList {
    pub fn labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AllowList::Labels(labels.into_iter().map(Into::into).collect())
    }

    pub fn from_config(config: &OwwConfig) -> Result<Self, ConfigError> {
        if config.publish_all_models {
            return Ok(AllowList::Any);
        }
        if config.model_names.is_empty() {
            return Err(ConfigError::EmptyAllowList);
        }
        Ok(AllowList::labels(config.model_names.iter().cloned()))
    }

    pub fn permits(&self, label: &str) -> bool {
        match self {
            AllowList::Any => true,
            AllowList::Labels(labels) => labels.contains(label),
        }
    }

    /// Fails when none of `emitted` can ever pass. Unknown label sets are never rejected.
    pub fn check_reachable(&self, emitted: Option<Vec<String>>) -> Result<(), ConfigError> {
        let (AllowList::Labels(allowed), Some(emitted)) = (self, emitted) else {
            return Ok(());
        };
        if emitted.iter().any(|label| allowed.contains(label)) {
            return Ok(());
        }
        let mut allowed: Vec<String> = allowed.iter().cloned().collect();
        allowed.sort();
        Err(ConfigError::NoPublishableLabels { allowed, emitted })
    }
}

/// A window tagged with where and when its last burst arrived.
#[derive(Debug, Clone)]
pub struct QueuedWindow {
    pub site_id: String,
    pub received_at: DateTime<Utc>,
    pub window: AnalysisWindow,
}

#[derive(Debug, Default, PartialEq)]
pub struct WindowOutcome {
    pub emitted: Vec<DetectionEvent>,
    pub publish_failures: usize,
}

/// Inference, activation filtering and publishing for a stream of windows.
///
/// Owns the filter state, so it must only ever be driven from one consumer.
pub struct DetectionPipeline<I, P> {
    inference: I,
    publisher: P,
    filter: ActivationFilter,
    allow_list: AllowList,
}

impl<I: Inference, P: Publisher> DetectionPipeline<I, P> {
    pub fn new(inference: I, publisher: P, filter: ActivationFilter, allow_list: AllowList) -> Self {
        DetectionPipeline {
            inference,
            publisher,
            filter,
            allow_list,
        }
    }

    /// Fails fast on bad thresholds and on an allow-list `inference` can never satisfy.
    pub fn from_config(config: &OwwConfig, inference: I, publisher: P) -> Result<Self, ConfigError> {
        let filter = ActivationFilter::from_config(config)?;
        let allow_list = AllowList::from_config(config)?;
        allow_list.check_reachable(inference.labels())?;
        Ok(Self::new(inference, publisher, filter, allow_list))
    }

    pub fn filter(&self) -> &ActivationFilter {
        &self.filter
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Runs one window through inference and the filter, publishing every allowed rising edge.
    ///
    /// An inference error leaves the filter untouched. A publish error is counted but the
    /// activation it belongs to stands.
    pub fn process_window(&mut self, queued: &QueuedWindow) -> Result<WindowOutcome, InferenceError> {
        let prediction = self.inference.predict(queued.window.samples())?;

        let mut scores: Vec<(String, f32)> = prediction.into_iter().collect();
        scores.sort_by(|a, b| a.0.cmp(&b.0));

        let mut outcome = WindowOutcome::default();
        for (label, confidence) in scores {
            if !self.filter.observe(&label, confidence) {
                continue;
            }
            if !self.allow_list.permits(&label) {
                debug!("{} activated in {} but is not published", label, queued.site_id);
                continue;
            }
            let event = DetectionEvent::new(&label, &queued.site_id, queued.received_at);
            match self.publisher.publish(&event) {
                Ok(()) => info!("Detected {} in {}", event.label, event.site_id),
                Err(e) => {
                    warn!("Publishing {} for {} failed: {}", event.label, event.site_id, e);
                    outcome.publish_failures += 1;
                }
            }
            outcome.emitted.push(event);
        }
        Ok(outcome)
    }

}

impl<I, P> DetectionPipeline<I, P>
where
    I: Inference + Send + 'static,
    P: Publisher + Send + 'static,
{
    /// Consumes windows until cancelled or until every producer has hung up.
    ///
    /// Each window is processed on the blocking pool. Fails only if processing panicked, in
    /// which case the pipeline is lost.
    pub async fn run(self, mut windows: UnboundedReceiver<QueuedWindow>, cancel: CancellationToken) -> Result<Self, JoinError> {
        info!("Detection consumer started");
        let mut pipeline = self;
        loop {
            let queued = tokio::select! {
                _ = cancel.cancelled() => break,
                queued = windows.recv() => match queued {
                    Some(queued) => queued,
                    None => break,
                },
            };
            let (returned, result) = task::spawn_blocking(move || {
                let result = pipeline.process_window(&queued);
                (pipeline, result.map_err(|e| (queued.site_id, e)))
            })
            .await?;
            pipeline = returned;
            if let Err((site_id, e)) = result {
                warn!("Skipping window from {}: {}", site_id, e);
            }
        }
        info!("Detection consumer stopped");
        Ok(pipeline)
    }
}
