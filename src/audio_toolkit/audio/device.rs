use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, SampleRate, StreamConfig};
use log::warn;

pub struct CpalDeviceInfo {
    pub name: String,
    pub device: Device,
}

/// Enumerate available audio input devices on the default host.
pub fn list_input_devices() -> Result<Vec<CpalDeviceInfo>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .context("failed to enumerate input devices")?;
    Ok(devices
        .filter_map(|device| {
            let name = device.name().ok()?;
            Some(CpalDeviceInfo { name, device })
        })
        .collect())
}

/// Find an input device by (exact) name, falling back to the host default.
pub fn resolve_input_device(name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();
    if let Some(wanted) = name {
        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if device.name().map(|n| n == wanted).unwrap_or(false) {
                    return Ok(device);
                }
            }
        }
        warn!("input device '{}' not found, using default", wanted);
    }
    host.default_input_device()
        .context("no input audio device found")
}

/// Build a mono `StreamConfig` at the requested sample rate when the device
/// supports it, otherwise fall back to the device default.
/// Returns `(config, actual_sample_rate, channels)`.
pub fn input_config_for(device: &Device, sample_rate: u32) -> Result<(StreamConfig, u32, u16)> {
    let desired = SampleRate(sample_rate);
    let config: StreamConfig = match device
        .supported_input_configs()
        .context("cannot query device input configs")?
        .find(|c| {
            c.channels() >= 1 && c.min_sample_rate() <= desired && desired <= c.max_sample_rate()
        }) {
        Some(range) => {
            let mut config: StreamConfig = range.with_sample_rate(desired).into();
            config.channels = 1;
            config
        }
        None => {
            let default = device
                .default_input_config()
                .context("no default input config")?;
            warn!(
                "{}Hz not supported by '{}'; falling back to {}Hz, {}ch",
                sample_rate,
                device.name().unwrap_or_else(|_| "<unknown>".into()),
                default.sample_rate().0,
                default.channels(),
            );
            default.into()
        }
    };

    let actual_rate = config.sample_rate.0;
    let channels = config.channels;
    Ok((config, actual_rate, channels))
}
