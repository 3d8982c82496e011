//! Remote transcription client: uploads one WAV-framed capture window per
//! request as multipart form data and parses the `{text, is_command}` reply.

use anyhow::{anyhow, Result};
use futures_util::future::BoxFuture;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::sync::Arc;

use crate::audio_toolkit::wav;
use crate::managers::voice::TranscriptionProvider;

/// One transcript per capture window. `is_command` is set by providers that
/// do their own keyword spotting; the voice loop still scans `text` itself.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptEvent {
    pub text: String,
    #[serde(default, alias = "is_update_command")]
    pub is_command: bool,
}

pub struct WhisperApi {
    url: String,
    api_key: String,
    model: String,
    /// Serializes outbound requests; windows are transcribed one at a time.
    serial: Arc<tokio::sync::Mutex<()>>,
}

impl WhisperApi {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            model: model.into(),
            serial: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

impl TranscriptionProvider for WhisperApi {
    fn transcribe(&self, wav_bytes: Vec<u8>) -> BoxFuture<'static, Result<TranscriptEvent>> {
        let url = self.url.clone();
        let api_key = self.api_key.clone();
        let model = self.model.clone();
        let serial = Arc::clone(&self.serial);
        Box::pin(async move {
            let _serialized = serial.lock().await;
            transcribe_window(&url, &api_key, &model, wav_bytes).await
        })
    }
}

fn build_headers(api_key: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if !api_key.is_empty() {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| anyhow!("invalid authorization header value: {}", e))?,
        );
    }
    Ok(headers)
}

async fn transcribe_window(
    url: &str,
    api_key: &str,
    model: &str,
    wav_bytes: Vec<u8>,
) -> Result<TranscriptEvent> {
    if wav_bytes.len() <= wav::HEADER_LEN {
        return Err(anyhow!("capture window contains no audio"));
    }

    debug!(
        "sending transcription request to {} ({} bytes)",
        url,
        wav_bytes.len()
    );

    let headers = build_headers(api_key)?;
    let client = reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(std::time::Duration::from_secs(10))
        .timeout(std::time::Duration::from_secs(120))
        .build()
        .map_err(|e| anyhow!("failed to build HTTP client: {}", e))?;

    let audio_part = Part::bytes(wav_bytes)
        .file_name("audio.wav")
        .mime_str("audio/wav")
        .map_err(|e| anyhow!("failed to create audio part: {}", e))?;
    let form = Form::new()
        .part("file", audio_part)
        .text("model", model.to_string());

    let response = client.post(url).multipart(form).send().await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read error response".to_string());
        return Err(anyhow!(
            "transcription failed with status {}: {}",
            status,
            error_text
        ));
    }

    let event: TranscriptEvent = response.json().await?;
    debug!(
        "transcription completed: '{}' (is_command={})",
        event.text, event.is_command
    );
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_event_parses_provider_variants() {
        let event: TranscriptEvent =
            serde_json::from_str(r#"{"text":"update please","is_command":true}"#).unwrap();
        assert!(event.is_command);
        assert_eq!(event.text, "update please");

        let event: TranscriptEvent =
            serde_json::from_str(r#"{"text":"hello","is_update_command":true,"success":true}"#)
                .unwrap();
        assert!(event.is_command);

        let event: TranscriptEvent = serde_json::from_str(r#"{"text":"hello"}"#).unwrap();
        assert!(!event.is_command);
    }

    #[test]
    fn header_only_window_is_rejected_before_upload() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let api = WhisperApi::new("http://127.0.0.1:1/command", "", "whisper-1");
        let result = rt.block_on(api.transcribe(vec![0u8; wav::HEADER_LEN]));
        assert!(result.is_err());
    }
}
