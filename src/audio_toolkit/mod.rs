pub mod audio;
pub mod text;
pub mod wav;

pub use audio::{list_input_devices, AudioCapture, AudioInput, CpalAudioInput};
pub use text::{contains_keyword, fuzzy_contains_keyword};
pub use wav::AudioWindow;
