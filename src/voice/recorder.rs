//! Microphone capture with cpal.
//!
//! The input callback pushes each captured buffer into a chunk channel, and
//! the same aggregator used for chat text folds the buffers into one
//! recording. Nothing polls: the consumer simply awaits the next buffer.

use std::future::Future;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tracing::{info, warn};

use crate::config::SttConfig;
use crate::stream::{self, aggregate, AggregationResult};
use crate::{Error, Result};

/// Records mono f32 audio at the configured rate.
pub struct AudioRecorder {
    sample_rate: u32,
    channels: u16,
    max_duration: Duration,
}

impl AudioRecorder {
    #[must_use]
    pub fn new(config: &SttConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            channels: config.channels,
            max_duration: Duration::from_secs_f64(config.max_duration.max(0.1)),
        }
    }

    fn max_samples(&self) -> usize {
        (self.max_duration.as_secs_f64() * f64::from(self.sample_rate) * f64::from(self.channels))
            as usize
    }

    /// Capture audio until `stop` resolves or the maximum duration elapses.
    ///
    /// The returned future is not `Send`: the cpal stream must stay on the
    /// task that opened it.
    ///
    /// # Errors
    ///
    /// Returns error if no input device is available or the device fails
    /// while recording
    pub async fn record<F>(&self, stop: F) -> Result<Vec<f32>>
    where
        F: Future<Output = ()>,
    {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input audio device available".to_string()))?;

        info!(
            "Using audio device: {}",
            device.name().unwrap_or_else(|_| "unknown".into())
        );

        let stream_config = StreamConfig {
            channels: self.channels,
            sample_rate: SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (tx, source) = stream::channel::<Vec<f32>>();
        let stopper = tx.clone();
        let errors = tx.clone();
        let max_samples = self.max_samples();
        let mut captured = 0usize;

        let input = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    if captured >= max_samples {
                        return;
                    }
                    let take = data.len().min(max_samples - captured);
                    captured += take;
                    tx.content(data[..take].to_vec());
                    if captured >= max_samples {
                        warn!("Max recording samples reached");
                        tx.done();
                    }
                },
                move |err| {
                    warn!("Audio stream error: {err}");
                    errors.error(err.to_string());
                },
                None,
            )
            .map_err(|e| Error::Audio(format!("failed to build input stream: {e}")))?;

        input
            .play()
            .map_err(|e| Error::Audio(format!("failed to start audio stream: {e}")))?;
        info!("Recording started");

        let mut collect = std::pin::pin!(aggregate(source, |_: &Vec<f32>| {}));
        let finished = tokio::select! {
            result = &mut collect => Some(result),
            () = stop => None,
            () = tokio::time::sleep(self.max_duration) => {
                info!("Max recording duration reached ({:.0}s)", self.max_duration.as_secs_f64());
                None
            }
        };

        let result = match finished {
            Some(result) => result,
            None => {
                stopper.done();
                collect.await
            }
        };
        drop(input);

        match result {
            AggregationResult::Completed(samples) => {
                let secs = samples.len() as f64 / f64::from(self.sample_rate);
                info!("Recording stopped: {secs:.1}s ({} samples)", samples.len());
                Ok(samples)
            }
            AggregationResult::Failed(detail) => Err(Error::Audio(detail)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_samples_follows_duration_and_rate() {
        let config = SttConfig {
            sample_rate: 16000,
            channels: 1,
            max_duration: 2.5,
            ..SttConfig::default()
        };
        assert_eq!(AudioRecorder::new(&config).max_samples(), 40000);
    }
}
