use chrono::{DateTime, Utc};
use serde_derive::Serialize;

/// One rising edge of an allow-listed wake word in one site.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionEvent {
    pub label: String,
    pub site_id: String,
    pub detected_at: DateTime<Utc>,
}

impl DetectionEvent {
    pub fn new(label: &str, site_id: &str, detected_at: DateTime<Utc>) -> Self {
        DetectionEvent {
            label: label.to_string(),
            site_id: site_id.to_string(),
            detected_at,
        }
    }

    pub fn topic(&self) -> String {
        hotword_detected_topic(&self.label)
    }

    pub fn payload(&self, sensitivity: f32) -> HotwordDetected {
        HotwordDetected {
            model_id: self.label.clone(),
            model_version: String::new(),
            model_type: "universal".to_string(),
            current_sensitivity: sensitivity,
            site_id: self.site_id.clone(),
            session_id: None,
            send_audio_captured: None,
            lang: None,
            custom_entities: None,
        }
    }
}

pub fn hotword_detected_topic(label: &str) -> String {
    format!("hermes/hotword/{label}/detected")
}

/// Body of `hermes/hotword/<wakewordId>/detected`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HotwordDetected {
    pub model_id: String,
    pub model_version: String,
    pub model_type: String,
    pub current_sensitivity: f32,
    pub site_id: String,
    pub session_id: Option<String>,
    pub send_audio_captured: Option<bool>,
    pub lang: Option<String>,
    pub custom_entities: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use crate::hermes::DetectionEvent;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_payload_shape() {
        let event = DetectionEvent::new("hey_jarvis", "kitchen", Utc::now());
        assert_eq!(event.topic(), "hermes/hotword/hey_jarvis/detected");

        let value = serde_json::to_value(event.payload(0.5)).unwrap();
        assert_eq!(
            value,
            json!({
                "modelId": "hey_jarvis",
                "modelVersion": "",
                "modelType": "universal",
                "currentSensitivity": 0.5,
                "siteId": "kitchen",
                "sessionId": null,
                "sendAudioCaptured": null,
                "lang": null,
                "customEntities": null,
            })
        );
    }
}
