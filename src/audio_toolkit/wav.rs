//! In-memory RIFF/WAVE framing for capture windows.
//!
//! The transcription provider expects a plain 44-byte-header PCM WAV. The
//! header is written up front with zeroed length fields and backfilled by
//! `finalize` once the total byte count is known, mirroring how a streaming
//! recorder cannot know the data size until capture completes.

pub const HEADER_LEN: usize = 44;

/// Byte offsets of the header fields callers may need to inspect.
pub const RIFF_SIZE_OFFSET: usize = 4;
pub const CHANNELS_OFFSET: usize = 22;
pub const SAMPLE_RATE_OFFSET: usize = 24;
pub const BYTE_RATE_OFFSET: usize = 28;
pub const BITS_PER_SAMPLE_OFFSET: usize = 34;
pub const DATA_SIZE_OFFSET: usize = 40;

const BITS_PER_SAMPLE: u16 = 16;

/// A single bounded capture window: PCM samples framed as a WAV byte buffer.
pub struct AudioWindow {
    bytes: Vec<u8>,
}

impl AudioWindow {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        let mut bytes = Vec::with_capacity(HEADER_LEN + sample_rate as usize * 2);
        write_header(&mut bytes, sample_rate, channels, 0);
        Self { bytes }
    }

    /// Append f32 samples in -1.0..1.0 as 16-bit little-endian PCM.
    pub fn push_samples(&mut self, samples: &[f32]) {
        self.bytes.reserve(samples.len() * 2);
        for &sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
            self.bytes.extend_from_slice(&value.to_le_bytes());
        }
    }

    pub fn sample_count(&self) -> usize {
        self.data_len() / 2
    }

    pub fn data_len(&self) -> usize {
        self.bytes.len() - HEADER_LEN
    }

    /// Backfill the RIFF and data length fields and yield the framed bytes.
    pub fn finalize(mut self) -> Vec<u8> {
        let data_size = self.data_len() as u32;
        let riff_size = 36 + data_size;
        self.bytes[RIFF_SIZE_OFFSET..RIFF_SIZE_OFFSET + 4]
            .copy_from_slice(&riff_size.to_le_bytes());
        self.bytes[DATA_SIZE_OFFSET..DATA_SIZE_OFFSET + 4]
            .copy_from_slice(&data_size.to_le_bytes());
        self.bytes
    }
}

fn write_header(out: &mut Vec<u8>, sample_rate: u32, channels: u16, data_size: u32) {
    let byte_rate = sample_rate * channels as u32 * BITS_PER_SAMPLE as u32 / 8;
    let block_align = channels * BITS_PER_SAMPLE / 8;

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_size).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes()); // fmt chunk size, PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // audio format: PCM
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_size.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    fn u16_at(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes(bytes[offset..offset + 2].try_into().unwrap())
    }

    #[test]
    fn header_fields_round_trip() {
        let mut window = AudioWindow::new(16_000, 1);
        let samples = vec![0.25f32; 1000];
        window.push_samples(&samples);
        let bytes = window.finalize();

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(u32_at(&bytes, RIFF_SIZE_OFFSET), 36 + 2000);
        assert_eq!(u16_at(&bytes, CHANNELS_OFFSET), 1);
        assert_eq!(u32_at(&bytes, SAMPLE_RATE_OFFSET), 16_000);
        assert_eq!(u32_at(&bytes, BYTE_RATE_OFFSET), 32_000);
        assert_eq!(u16_at(&bytes, BITS_PER_SAMPLE_OFFSET), 16);
        assert_eq!(u32_at(&bytes, DATA_SIZE_OFFSET), 2000);
        assert_eq!(bytes.len(), HEADER_LEN + 2000);
    }

    #[test]
    fn empty_window_is_header_only() {
        let bytes = AudioWindow::new(16_000, 1).finalize();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(u32_at(&bytes, DATA_SIZE_OFFSET), 0);
        assert_eq!(u32_at(&bytes, RIFF_SIZE_OFFSET), 36);
    }

    #[test]
    fn hound_reads_the_framing_back() {
        let mut window = AudioWindow::new(16_000, 1);
        window.push_samples(&[0.0, 0.5, -0.5, 1.0]);
        let bytes = window.finalize();

        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[3], 32767);
    }

    #[test]
    fn clipping_is_applied_before_conversion() {
        let mut window = AudioWindow::new(16_000, 1);
        window.push_samples(&[2.0, -2.0]);
        let bytes = window.finalize();
        let data = &bytes[HEADER_LEN..];
        assert_eq!(i16::from_le_bytes([data[0], data[1]]), 32767);
        assert_eq!(i16::from_le_bytes([data[2], data[3]]), -32767);
    }
}
