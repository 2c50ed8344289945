use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::inference::Inference;
use crate::pipeline::DetectionPipeline;
use crate::publish::Publisher;
use crate::udp::UdpAudioSource;
use log::info;
use std::net::{IpAddr, SocketAddr};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub mod chunk;
pub mod config;
pub mod error;
pub mod filter;
pub mod hermes;
pub mod inference;
pub mod pipeline;
pub mod publish;
pub mod rms;
pub mod udp;


pub const VOICE_SAMPLE_RATE: usize = 16000;

/// Samples per analysis window, 80 ms @ 16 kHz.
pub const OWW_WINDOW_SIZE: usize = 1280;

/// UDP sources bound for every configured site, ready to be wired to a pipeline.
pub struct Bridge {
    config: BridgeConfig,
    sources: Vec<UdpAudioSource>,
}

impl Bridge {
    /// Validates the config and binds one UDP socket per site. Any failure here is fatal.
    pub async fn bind(config: BridgeConfig, ip: IpAddr) -> Result<Self, BridgeError> {
        config.validate()?;
        let mut sources = Vec::with_capacity(config.udp_ports.len());
        for (site_id, port) in &config.udp_ports {
            sources.push(UdpAudioSource::bind(site_id, SocketAddr::new(ip, *port), &config.audio).await?);
        }
        Ok(Bridge { config, sources })
    }

    pub fn local_addrs(&self) -> Vec<(String, SocketAddr)> {
        self.sources
            .iter()
            .filter_map(|s| s.local_addr().ok().map(|addr| (s.site_id().to_string(), addr)))
            .collect()
    }

    /// One producer task per site feeding a single consumer. Returns the pipeline once
    /// `cancel` fires and every task has drained.
    ///
    /// Refuses to start, before any task is spawned, when `inference` can never produce an
    /// allowed label.
    pub async fn run<I, P>(self, inference: I, publisher: P, cancel: CancellationToken) -> Result<DetectionPipeline<I, P>, BridgeError>
    where
        I: Inference + Send + 'static,
        P: Publisher + Send + 'static,
    {
        let pipeline = DetectionPipeline::from_config(&self.config.oww, inference, publisher)?;
        let (windows_sender, windows) = mpsc::unbounded_channel();

        let producers: Vec<_> = self
            .sources
            .into_iter()
            .map(|source| tokio::spawn(source.run(windows_sender.clone(), cancel.clone())))
            .collect();
        drop(windows_sender);
        info!("Started {} audio source(s)", producers.len());

        let consumer = tokio::spawn(pipeline.run(windows, cancel.clone()));
        let pipeline = consumer.await??;
        // consumer only stops early if everything else already did
        cancel.cancel();
        for producer in producers {
            producer.await?;
        }
        Ok(pipeline)
    }
}
