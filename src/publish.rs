use crate::error::PublishError;
use crate::hermes::DetectionEvent;
use log::info;
use serde_derive::Serialize;
use std::io::Write;

/// Sink for detections. The core does not care what carries them.
pub trait Publisher {
    fn publish(&mut self, event: &DetectionEvent) -> Result<(), PublishError>;
}

impl<F> Publisher for F
where
    F: FnMut(&DetectionEvent) -> Result<(), PublishError>,
{
    fn publish(&mut self, event: &DetectionEvent) -> Result<(), PublishError> {
        self(event)
    }
}

/// Logs the Hermes message instead of sending it anywhere.
#[derive(Debug)]
pub struct LogPublisher {
    sensitivity: f32,
}

impl LogPublisher {
    pub fn new(sensitivity: f32) -> Self {
        LogPublisher { sensitivity }
    }
}

impl Publisher for LogPublisher {
    fn publish(&mut self, event: &DetectionEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_string(&event.payload(self.sensitivity))?;
        info!("Published wakeword {}, siteId {}: {} {}", event.label, event.site_id, event.topic(), payload);
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonLine<'a, T> {
    topic: &'a str,
    payload: T,
}

/// Writes one `{"topic": .., "payload": ..}` object per line, ready to pipe into an MQTT client.
#[derive(Debug)]
pub struct JsonLinesPublisher<W: Write> {
    out: W,
    sensitivity: f32,
}

impl<W: Write> JsonLinesPublisher<W> {
    pub fn new(out: W, sensitivity: f32) -> Self {
        JsonLinesPublisher { out, sensitivity }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Publisher for JsonLinesPublisher<W> {
    fn publish(&mut self, event: &DetectionEvent) -> Result<(), PublishError> {
        let topic = event.topic();
        let line = JsonLine {
            topic: &topic,
            payload: event.payload(self.sensitivity),
        };
        serde_json::to_writer(&mut self.out, &line)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::hermes::DetectionEvent;
    use crate::publish::{JsonLinesPublisher, LogPublisher, Publisher};
    use chrono::Utc;
    use serde_json::Value;

    #[test]
    fn test_json_lines() {
        let mut publisher = JsonLinesPublisher::new(vec![], 0.7);
        publisher.publish(&DetectionEvent::new("alexa", "base", Utc::now())).unwrap();
        publisher.publish(&DetectionEvent::new("timer", "office", Utc::now())).unwrap();

        let out = String::from_utf8(publisher.into_inner()).unwrap();
        let lines: Vec<Value> = out.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["topic"], "hermes/hotword/alexa/detected");
        assert_eq!(lines[0]["payload"]["siteId"], "base");
        assert_eq!(lines[1]["payload"]["modelId"], "timer");
    }

    #[test]
    fn test_log_publisher_never_fails() {
        let mut publisher = LogPublisher::new(0.7);
        assert!(publisher.publish(&DetectionEvent::new("alexa", "base", Utc::now())).is_ok());
    }
}
