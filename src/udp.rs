use crate::chunk::AudioRechunker;
use crate::config::AudioConfig;
use crate::error::{AudioError, BridgeError};
use crate::pipeline::QueuedWindow;
use crate::VOICE_SAMPLE_RATE;
use chrono::{DateTime, Utc};
use hound::{SampleFormat, WavReader};
use log::{debug, info, warn};
use std::io::Cursor;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// Largest datagram we accept. Rhasspy sends ~2 KB WAV files.
const MAX_DATAGRAM_SIZE: usize = 65_536;

const RECV_BACKOFF_MIN: Duration = Duration::from_millis(10);
const RECV_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause after the n-th receive error in a row: doubles from 10 ms up to 1 s.
fn recv_backoff(consecutive_errors: u32) -> Duration {
    let doublings = consecutive_errors.saturating_sub(1).min(7);
    (RECV_BACKOFF_MIN * (1 << doublings)).min(RECV_BACKOFF_MAX)
}

/// Decodes one Rhasspy audio datagram: a complete 16-bit mono 16 kHz WAV file.
pub fn decode_wav_datagram(data: &[u8]) -> Result<Vec<i16>, AudioError> {
    let reader = WavReader::new(Cursor::new(data)).map_err(|e| AudioError::MalformedWav(e.to_string()))?;
    let spec = reader.spec();
    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(AudioError::UnsupportedFormat(format!(
            "{:?} {} bit",
            spec.sample_format, spec.bits_per_sample
        )));
    }
    if spec.channels != 1 {
        return Err(AudioError::UnsupportedFormat(format!("{} channels", spec.channels)));
    }
    if spec.sample_rate != VOICE_SAMPLE_RATE as u32 {
        return Err(AudioError::UnsupportedFormat(format!("{} Hz", spec.sample_rate)));
    }
    reader
        .into_samples::<i16>()
        .collect::<Result<Vec<i16>, _>>()
        .map_err(|e| AudioError::MalformedWav(e.to_string()))
}

/// Receives one site's audio stream and queues its analysis windows.
pub struct UdpAudioSource {
    site_id: String,
    socket: UdpSocket,
    rechunker: AudioRechunker,
}

impl UdpAudioSource {
    pub async fn bind(site_id: &str, addr: SocketAddr, audio: &AudioConfig) -> Result<Self, BridgeError> {
        let rechunker = AudioRechunker::new(audio)?;
        let socket = UdpSocket::bind(addr).await.map_err(|source| BridgeError::Bind {
            site_id: site_id.to_string(),
            port: addr.port(),
            source,
        })?;
        Ok(UdpAudioSource {
            site_id: site_id.to_string(),
            socket,
            rechunker,
        })
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receives until cancelled or until the consumer is gone.
    pub async fn run(mut self, windows: UnboundedSender<QueuedWindow>, cancel: CancellationToken) {
        match self.local_addr() {
            Ok(addr) => info!("Listening for {} audio on UDP {}", self.site_id, addr),
            Err(_) => info!("Listening for {} audio", self.site_id),
        }
        let mut datagram = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut errors = 0u32;
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.socket.recv_from(&mut datagram) => received,
            };
            match received {
                Ok((len, peer)) => {
                    errors = 0;
                    let data = &datagram[..len];
                    if !self.handle_datagram(data, Utc::now(), &windows) {
                        info!("Consumer gone, stopping {} source", self.site_id);
                        break;
                    }
                    debug!("{} bytes from {}", len, peer);
                }
                Err(e) => {
                    errors = errors.saturating_add(1);
                    let pause = recv_backoff(errors);
                    warn!("UDP receive error on {}: {}, retrying in {:?}", self.site_id, e, pause);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(pause) => {}
                    }
                }
            }
        }
        info!("Stopped listening for {} audio", self.site_id);
    }

    /// Returns false once nobody is listening for windows anymore.
    fn handle_datagram(&mut self, data: &[u8], received_at: DateTime<Utc>, windows: &UnboundedSender<QueuedWindow>) -> bool {
        let samples = match decode_wav_datagram(data) {
            Ok(samples) => samples,
            Err(e) => {
                warn!("Dropping datagram from {}: {}", self.site_id, e);
                return true;
            }
        };
        let ready = match self.rechunker.push(&samples) {
            Ok(ready) => ready,
            Err(e) => {
                warn!("Dropping burst from {}: {}", self.site_id, e);
                return true;
            }
        };
        for window in ready {
            let queued = QueuedWindow {
                site_id: self.site_id.clone(),
                received_at,
                window,
            };
            if windows.send(queued).is_err() {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::error::AudioError;
    use crate::udp::{decode_wav_datagram, recv_backoff};
    use hound::{SampleFormat, WavSpec, WavWriter};
    use std::io::Cursor;
    use std::time::Duration;

    pub(crate) fn wav_bytes(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut out = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut out, spec).unwrap();
            for s in samples {
                writer.write_sample(*s).unwrap();
            }
            writer.finalize().unwrap();
        }
        out.into_inner()
    }

    #[test]
    fn test_decode_rhasspy_datagram() {
        let samples: Vec<i16> = (0..1024).map(|i| (i * 7 - 3000) as i16).collect();
        let data = wav_bytes(&samples, 1, 16000);
        assert_eq!(decode_wav_datagram(&data).unwrap(), samples);
    }

    #[test]
    fn test_reject_unsupported_wav() {
        let stereo = wav_bytes(&[1, 2, 3, 4], 2, 16000);
        assert!(matches!(decode_wav_datagram(&stereo), Err(AudioError::UnsupportedFormat(_))));

        let fast = wav_bytes(&[1, 2, 3, 4], 1, 48000);
        assert!(matches!(decode_wav_datagram(&fast), Err(AudioError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_reject_garbage() {
        assert!(matches!(decode_wav_datagram(b"not a wav file"), Err(AudioError::MalformedWav(_))));
        assert!(matches!(decode_wav_datagram(&[]), Err(AudioError::MalformedWav(_))));
    }

    #[test]
    fn test_recv_backoff_grows_and_caps() {
        let pauses: Vec<Duration> = [1, 2, 3, 7, 8, 100, u32::MAX].into_iter().map(recv_backoff).collect();
        assert_eq!(pauses[0], Duration::from_millis(10));
        assert_eq!(pauses[1], Duration::from_millis(20));
        assert_eq!(pauses[2], Duration::from_millis(40));
        assert_eq!(pauses[3], Duration::from_millis(640));
        assert!(pauses[4..].iter().all(|p| *p == Duration::from_secs(1)));
    }
}
