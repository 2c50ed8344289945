use crate::error::ConfigError;
use crate::filter::MAX_ACTIVATION_SAMPLES;
use crate::{OWW_WINDOW_SIZE, VOICE_SAMPLE_RATE};
use log::{debug, info};
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct OwwConfig {
    pub model_names: Vec<String>,
    pub publish_all_models: bool,
    pub activation_threshold: f32,
    pub deactivation_threshold: f32,
    pub activation_samples: usize,
}

impl Default for OwwConfig {
    fn default() -> Self {
        OwwConfig {
            model_names: ["alexa", "hey_mycroft", "hey_jarvis", "timer", "weather"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            publish_all_models: false,  // publish only labels listed in model_names
            activation_threshold: 0.7,  // moving average needed to trigger
            deactivation_threshold: 0.2, // moving average needed to re-arm
            activation_samples: 3,      // moving average length, in windows
        }
    }
}

impl OwwConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_thresholds(self.activation_threshold, self.deactivation_threshold)?;
        if self.activation_samples == 0 || self.activation_samples > MAX_ACTIVATION_SAMPLES {
            return Err(ConfigError::ActivationSamples {
                value: self.activation_samples,
                max: MAX_ACTIVATION_SAMPLES,
            });
        }
        if !self.publish_all_models && self.model_names.is_empty() {
            return Err(ConfigError::EmptyAllowList);
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub window_size: usize,
    pub hop_size: usize,
    pub max_buffered: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        AudioConfig {
            window_size: OWW_WINDOW_SIZE, // 80 ms @ 16 kHz
            hop_size: OWW_WINDOW_SIZE,    // disjoint windows
            max_buffered: VOICE_SAMPLE_RATE, // 1 sec of audio waiting for the consumer
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::WindowSize);
        }
        if self.hop_size == 0 || self.hop_size > self.window_size {
            return Err(ConfigError::HopSize {
                hop_size: self.hop_size,
                window_size: self.window_size,
            });
        }
        if self.max_buffered < self.window_size {
            return Err(ConfigError::MaxBuffered {
                max_buffered: self.max_buffered,
                window_size: self.window_size,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub oww: OwwConfig,
    pub audio: AudioConfig,
    /// site id -> UDP port Rhasspy streams that site's audio to
    pub udp_ports: BTreeMap<String, u16>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            oww: OwwConfig::default(),
            audio: AudioConfig::default(),
            udp_ports: BTreeMap::from([("base".to_string(), 12202)]),
        }
    }
}

impl BridgeConfig {
    /// Checks everything that would make the bridge run without ever emitting a detection.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.oww.validate()?;
        self.audio.validate()?;
        if self.udp_ports.is_empty() {
            return Err(ConfigError::NoUdpPorts);
        }
        Ok(())
    }

    pub fn from_yaml_str(raw: &str, origin: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })
    }
}

/// Loads the YAML config. A missing file means built-in defaults; anything else unreadable is an error.
pub fn load_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("Config {:?} not found, using defaults", path);
            return Ok(BridgeConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            })
        }
    };
    // an empty file is valid YAML for "no overrides"
    if raw.trim().is_empty() {
        return Ok(BridgeConfig::default());
    }
    let config = BridgeConfig::from_yaml_str(&raw, &path.display().to_string())?;
    debug!("Loaded config {:?}", config);
    Ok(config)
}

pub(crate) fn check_thresholds(activation: f32, deactivation: f32) -> Result<(), ConfigError> {
    if !(activation > 0.0 && activation <= 1.0) {
        return Err(ConfigError::ThresholdRange {
            name: "activation",
            value: activation,
        });
    }
    if !(0.0..=1.0).contains(&deactivation) {
        return Err(ConfigError::ThresholdRange {
            name: "deactivation",
            value: deactivation,
        });
    }
    if activation <= deactivation {
        return Err(ConfigError::ThresholdOrder {
            activation,
            deactivation,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::config::{load_config, BridgeConfig};
    use crate::error::ConfigError;
    use std::path::Path;

    #[test]
    fn test_defaults_are_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.audio.window_size, 1280);
        assert_eq!(config.udp_ports.get("base"), Some(&12202));
        assert_eq!(config.oww.model_names.len(), 5);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let raw = r#"
mqtt:
  broker: 192.168.1.10
oww:
  activation_threshold: 0.8
  vad_threshold: 0.5
udp_ports:
  kitchen: 12203
  office: 12204
"#;
        let config = BridgeConfig::from_yaml_str(raw, "test").unwrap();
        assert_eq!(config.oww.activation_threshold, 0.8);
        assert_eq!(config.oww.deactivation_threshold, 0.2);
        assert_eq!(config.oww.activation_samples, 3);
        assert_eq!(config.udp_ports.len(), 2);
        assert!(!config.udp_ports.contains_key("base"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inverted_thresholds_fail() {
        let raw = "oww: { activation_threshold: 0.3, deactivation_threshold: 0.5 }";
        let config = BridgeConfig::from_yaml_str(raw, "test").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::ThresholdOrder { .. })));
    }

    #[test]
    fn test_equal_thresholds_fail() {
        let raw = "oww: { activation_threshold: 0.5, deactivation_threshold: 0.5 }";
        let config = BridgeConfig::from_yaml_str(raw, "test").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::ThresholdOrder { .. })));
    }

    #[test]
    fn test_empty_allow_list_fails_unless_publishing_all() {
        let config = BridgeConfig::from_yaml_str("oww: { model_names: [] }", "test").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyAllowList)));

        let config = BridgeConfig::from_yaml_str("oww: { model_names: [], publish_all_models: true }", "test").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_audio_settings_fail() {
        let config = BridgeConfig::from_yaml_str("audio: { window_size: 0 }", "test").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::WindowSize)));

        let config = BridgeConfig::from_yaml_str("audio: { hop_size: 2000 }", "test").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::HopSize { .. })));

        let config = BridgeConfig::from_yaml_str("audio: { max_buffered: 100 }", "test").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::MaxBuffered { .. })));
    }

    #[test]
    fn test_no_ports_fail() {
        let config = BridgeConfig::from_yaml_str("udp_ports: {}", "test").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::NoUdpPorts)));
    }

    #[test]
    fn test_activation_samples_bounds() {
        let config = BridgeConfig::from_yaml_str("oww: { activation_samples: 0 }", "test").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::ActivationSamples { .. })));

        let config = BridgeConfig::from_yaml_str("oww: { activation_samples: 33 }", "test").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::ActivationSamples { .. })));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = load_config(Path::new("/nonexistent/oww-rhasspy/config.yaml")).unwrap();
        assert_eq!(config, BridgeConfig::default());
    }
}
