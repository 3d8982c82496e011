use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variables that override the corresponding settings fields so
/// API keys never have to live in the settings file.
const GEMINI_KEY_ENV: &str = "LARDER_GEMINI_API_KEY";
const TRANSCRIPTION_KEY_ENV: &str = "LARDER_TRANSCRIPTION_API_KEY";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Settings {
    #[serde(default = "default_transcription_url")]
    pub transcription_url: String,
    #[serde(default)]
    pub transcription_api_key: String,
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,
    #[serde(default)]
    pub gemini_api_key: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_command_keyword")]
    pub command_keyword: String,
    /// Length of one voice capture window, in milliseconds.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default)]
    pub selected_microphone: Option<String>,
    /// Analyze one out of every N submitted camera frames.
    #[serde(default = "default_frame_skip")]
    pub frame_skip: u32,
    /// Candidate part-of-speech lexicon files, tried in order. Missing files
    /// are skipped; if none load, tagged extraction is disabled.
    #[serde(default = "default_pos_model_paths")]
    pub pos_model_paths: Vec<PathBuf>,
    /// When set, transcripts are also matched against the command keyword
    /// with fuzzy string similarity at this threshold (0.0..1.0).
    #[serde(default)]
    pub fuzzy_keyword_threshold: Option<f64>,
    /// When set, every finalized capture window is written here as a WAV file.
    #[serde(default)]
    pub dump_audio_dir: Option<PathBuf>,
}

fn default_transcription_url() -> String {
    "http://127.0.0.1:5001/command".to_string()
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash-lite".to_string()
}

fn default_command_keyword() -> String {
    "update".to_string()
}

fn default_window_ms() -> u64 {
    3000
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_frame_skip() -> u32 {
    4
}

fn default_pos_model_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("models/en-pos-perceptron.txt"),
        PathBuf::from("models/en-pos-maxent.txt"),
    ]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            transcription_url: default_transcription_url(),
            transcription_api_key: String::new(),
            transcription_model: default_transcription_model(),
            gemini_api_key: String::new(),
            gemini_model: default_gemini_model(),
            command_keyword: default_command_keyword(),
            window_ms: default_window_ms(),
            sample_rate: default_sample_rate(),
            selected_microphone: None,
            frame_skip: default_frame_skip(),
            pos_model_paths: default_pos_model_paths(),
            fuzzy_keyword_threshold: None,
            dump_audio_dir: None,
        }
    }
}

impl Settings {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms.max(1))
    }

    /// Load settings from a JSON file, falling back to defaults when the file
    /// is absent. A malformed file is an error; a missing one is not.
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read settings file {:?}", path))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse settings file {:?}", path))?
        } else {
            debug!("no settings file at {:?}, using defaults", path);
            Settings::default()
        };
        settings.apply_env_overrides();
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw).with_context(|| format!("failed to write settings file {:?}", path))
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(GEMINI_KEY_ENV) {
            if !key.trim().is_empty() {
                self.gemini_api_key = key.trim().to_string();
            }
        }
        if let Ok(key) = std::env::var(TRANSCRIPTION_KEY_ENV) {
            if !key.trim().is_empty() {
                self.transcription_api_key = key.trim().to_string();
            }
        }
        if self.gemini_api_key.is_empty() {
            warn!("no Gemini API key configured; description and recipe calls will be unavailable");
        }
    }
}
