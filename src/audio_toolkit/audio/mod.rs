// Re-export all audio components
pub mod device;
pub mod recorder;
pub mod resampler;
pub mod utils;

pub use device::{list_input_devices, CpalDeviceInfo};
pub use recorder::{AudioCapture, AudioInput, CaptureStream, CpalAudioInput};
pub use resampler::StreamResampler;
pub use utils::{load_wav_file, save_wav_file};
