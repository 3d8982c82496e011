use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, StreamTrait};
use log::{debug, error, info};
use std::sync::mpsc::Sender;

use super::device::{input_config_for, resolve_input_device};
use super::resampler::StreamResampler;

/// Factory for opening an audio input. The production implementation talks to
/// cpal; tests substitute a synthetic source.
pub trait AudioInput: Send + Sync {
    /// Open the input and start delivering mono f32 frames at `sample_rate`
    /// through `sink`. The returned handle owns the device; dropping it
    /// releases the device. The handle stays on the opening thread (cpal
    /// streams are not `Send`).
    fn open(
        &self,
        device_name: Option<&str>,
        sample_rate: u32,
        sink: Sender<Vec<f32>>,
    ) -> Result<Box<dyn AudioCapture>>;
}

/// RAII handle over an open capture stream.
pub trait AudioCapture {
    fn sample_rate(&self) -> u32;
}

pub struct CpalAudioInput;

impl AudioInput for CpalAudioInput {
    fn open(
        &self,
        device_name: Option<&str>,
        sample_rate: u32,
        sink: Sender<Vec<f32>>,
    ) -> Result<Box<dyn AudioCapture>> {
        let stream = CaptureStream::open(device_name, sample_rate, sink)?;
        Ok(Box::new(stream))
    }
}

/// A live cpal input stream delivering mono f32 frames at the target rate,
/// downmixing and resampling from whatever the device actually supports.
pub struct CaptureStream {
    // Held for its Drop: dropping the stream closes the device.
    _stream: cpal::Stream,
    sample_rate: u32,
}

impl CaptureStream {
    pub fn open(
        device_name: Option<&str>,
        target_rate: u32,
        sink: Sender<Vec<f32>>,
    ) -> Result<Self> {
        let device = resolve_input_device(device_name)?;
        let (config, actual_rate, channels) = input_config_for(&device, target_rate)?;

        info!(
            "opening input '{}' at {}Hz, {}ch (target {}Hz mono)",
            device.name().unwrap_or_else(|_| "<unknown>".into()),
            actual_rate,
            channels,
            target_rate,
        );

        let mut resampler = StreamResampler::new(actual_rate, target_rate);
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono = downmix_to_mono(data, channels);
                    resampler.push(&mono, |block| {
                        if sink.send(block.to_vec()).is_err() {
                            debug!("capture sink closed");
                        }
                    });
                },
                |err| error!("audio capture error: {err}"),
                None,
            )
            .context("failed to build audio input stream")?;

        stream.play().context("failed to start audio stream")?;

        Ok(Self {
            _stream: stream,
            sample_rate: target_rate,
        })
    }
}

impl AudioCapture for CaptureStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Downmix interleaved multi-channel audio to mono by averaging each frame.
fn downmix_to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}
