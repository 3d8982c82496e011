use anyhow::Result;
use hound::{WavReader, WavSpec, WavWriter};
use log::debug;
use std::path::Path;

/// Save mono 16kHz audio samples as a WAV file (debug dumps).
pub fn save_wav_file<P: AsRef<Path>>(file_path: P, samples: &[f32]) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(file_path.as_ref(), spec)?;
    for sample in samples {
        let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(sample_i16)?;
    }
    writer.finalize()?;
    debug!("saved WAV file: {:?}", file_path.as_ref());
    Ok(())
}

/// Load audio samples from a WAV file as f32.
pub fn load_wav_file<P: AsRef<Path>>(file_path: P) -> Result<Vec<f32>> {
    let mut reader = WavReader::open(file_path.as_ref())?;
    let spec = reader.spec();

    let samples: Result<Vec<f32>, _> = match spec.sample_format {
        hound::SampleFormat::Int => match spec.bits_per_sample {
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|sample| sample as f32 / i16::MAX as f32))
                .collect(),
            32 => reader
                .samples::<i32>()
                .map(|s| s.map(|sample| sample as f32 / i32::MAX as f32))
                .collect(),
            _ => {
                return Err(anyhow::anyhow!(
                    "unsupported bit depth: {}",
                    spec.bits_per_sample
                ))
            }
        },
        hound::SampleFormat::Float => reader.samples::<f32>().collect(),
    };

    Ok(samples?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        let samples = vec![0.0f32, 0.5, -0.5, 0.25];
        save_wav_file(&path, &samples).unwrap();

        let loaded = load_wav_file(&path).unwrap();
        assert_eq!(loaded.len(), samples.len());
        for (a, b) in loaded.iter().zip(samples.iter()) {
            assert!((a - b).abs() < 0.001, "{a} vs {b}");
        }
    }
}
