use rubato::{FftFixedIn, Resampler};

const CHUNK_SIZE: usize = 1024;

/// Streaming mono resampler feeding fixed-size chunks through rubato.
/// When input and output rates match it passes samples straight through.
pub struct StreamResampler {
    resampler: Option<FftFixedIn<f32>>,
    in_buf: Vec<f32>,
}

impl StreamResampler {
    pub fn new(in_hz: u32, out_hz: u32) -> Self {
        let resampler = (in_hz != out_hz).then(|| {
            FftFixedIn::<f32>::new(in_hz as usize, out_hz as usize, CHUNK_SIZE, 1, 1)
                .expect("failed to create resampler")
        });
        Self {
            resampler,
            in_buf: Vec::with_capacity(CHUNK_SIZE),
        }
    }

    /// Feed input samples; emits resampled blocks as they become available.
    pub fn push(&mut self, mut src: &[f32], mut emit: impl FnMut(&[f32])) {
        if self.resampler.is_none() {
            if !src.is_empty() {
                emit(src);
            }
            return;
        }

        while !src.is_empty() {
            let space = CHUNK_SIZE - self.in_buf.len();
            let take = space.min(src.len());
            self.in_buf.extend_from_slice(&src[..take]);
            src = &src[take..];

            if self.in_buf.len() == CHUNK_SIZE {
                if let Ok(out) = self
                    .resampler
                    .as_mut()
                    .unwrap()
                    .process(&[&self.in_buf[..]], None)
                {
                    if !out[0].is_empty() {
                        emit(&out[0]);
                    }
                }
                self.in_buf.clear();
            }
        }
    }

    /// Flush buffered input, zero-padded to a full chunk.
    pub fn finish(&mut self, mut emit: impl FnMut(&[f32])) {
        if let Some(resampler) = self.resampler.as_mut() {
            if !self.in_buf.is_empty() {
                self.in_buf.resize(CHUNK_SIZE, 0.0);
                if let Ok(out) = resampler.process(&[&self.in_buf[..]], None) {
                    if !out[0].is_empty() {
                        emit(&out[0]);
                    }
                }
                self.in_buf.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_when_rates_match() {
        let mut resampler = StreamResampler::new(16_000, 16_000);
        let mut collected = Vec::new();
        resampler.push(&[0.1, 0.2, 0.3], |block| collected.extend_from_slice(block));
        resampler.finish(|block| collected.extend_from_slice(block));
        assert_eq!(collected, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn downsamples_to_roughly_half_the_samples() {
        let mut resampler = StreamResampler::new(32_000, 16_000);
        let input = vec![0.0f32; 32_000];
        let mut collected = Vec::new();
        resampler.push(&input, |block| collected.extend_from_slice(block));
        resampler.finish(|block| collected.extend_from_slice(block));
        let expected = 16_000.0;
        let actual = collected.len() as f32;
        assert!(
            (actual - expected).abs() / expected < 0.1,
            "expected ~{} samples, got {}",
            expected,
            actual
        );
    }
}
