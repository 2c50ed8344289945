use thiserror::Error;

/// Fatal problems found while loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("can't parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("activation threshold {activation} must be greater than deactivation threshold {deactivation}")]
    ThresholdOrder { activation: f32, deactivation: f32 },
    #[error("{name} threshold {value} out of range")]
    ThresholdRange { name: &'static str, value: f32 },
    #[error("activation samples must be in 1..={max}, got {value}")]
    ActivationSamples { value: usize, max: usize },
    #[error("window size must be positive")]
    WindowSize,
    #[error("hop size must be in 1..={window_size}, got {hop_size}")]
    HopSize { hop_size: usize, window_size: usize },
    #[error("max buffered samples {max_buffered} smaller than window size {window_size}")]
    MaxBuffered { max_buffered: usize, window_size: usize },
    #[error("model allow-list is empty; nothing would ever be published")]
    EmptyAllowList,
    #[error("none of the allowed models {allowed:?} is produced by the inference, which only emits {emitted:?}")]
    NoPublishableLabels { allowed: Vec<String>, emitted: Vec<String> },
    #[error("no UDP ports configured; configure UDP ports to receive audio for wakeword detection")]
    NoUdpPorts,
}

/// Rejected audio input. Never fatal, the offending burst is dropped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AudioError {
    #[error("empty sample burst")]
    EmptyBurst,
    #[error("odd PCM byte count {0}")]
    OddByteCount(usize),
    #[error("buffer overflow: {buffered} samples not drained (max {max}), dropping {incoming}")]
    BufferOverflow {
        buffered: usize,
        incoming: usize,
        max: usize,
    },
    #[error("unsupported WAV format: {0}")]
    UnsupportedFormat(String),
    #[error("malformed WAV datagram: {0}")]
    MalformedWav(String),
}

#[derive(Debug, Error)]
#[error("inference failed: {0}")]
pub struct InferenceError(pub String);

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("can't encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("publish I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("can't bind UDP port {port} for {site_id}: {source}")]
    Bind {
        site_id: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
