//! Gemini `generateContent` client, used for two capabilities: recipe
//! generation from an ingredient list and image description for camera
//! frames. Requests are serialized per capability concern by the callers'
//! contract; one client instance carries its own serializing lock.

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use futures_util::future::BoxFuture;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::managers::describer::{DescriptionProvider, FeatureStatus, ProgressSink, TextSink};
use crate::managers::recipes::RecipeProvider;

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<Candidate>>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

pub struct GeminiClient {
    api_key: String,
    model: String,
    serial: Arc<tokio::sync::Mutex<()>>,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            serial: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    fn request_context(&self) -> (String, Arc<tokio::sync::Mutex<()>>) {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );
        (url, Arc::clone(&self.serial))
    }
}

/// The instruction sent along with the detected item list. The detector is
/// deliberately over-inclusive, so the model is told to discard non-food
/// items instead of filtering on-device.
fn recipe_prompt(ingredients: &[String]) -> String {
    let mut prompt = String::new();
    prompt.push_str("Given these detected items: ");
    prompt.push_str(&ingredients.join(", "));
    prompt.push_str("\n\nIMPORTANT: Only consider items that are FOOD INGREDIENTS. ");
    prompt.push_str(
        "Ignore all non-food items including: people, body parts, clothing, shoes, furniture, \
         background objects, surfaces, materials, and any other non-edible items. ",
    );
    prompt.push_str(
        "Focus only on actual food items like vegetables, fruits, meat, dairy, spices, etc.",
    );
    prompt.push_str("\n\nFrom the actual food ingredients identified, generate 3-5 realistic recipes. ");
    prompt.push_str("If no food ingredients are found, return an empty array [].");
    prompt.push_str("\n\nReturn ONLY a JSON array with this exact format:\n");
    prompt.push_str("[\n");
    prompt.push_str("  {\n");
    prompt.push_str("    \"title\": \"Recipe Name\",\n");
    prompt.push_str("    \"description\": \"Brief description\",\n");
    prompt.push_str("    \"ingredients\": \"ingredient1,ingredient2,ingredient3\",\n");
    prompt.push_str("    \"instructions\": \"Step 1\\nStep 2\\nStep 3\"\n");
    prompt.push_str("  }\n");
    prompt.push_str("]\n");
    prompt.push_str("Make recipes practical and realistic. Use common cooking techniques.");
    prompt
}

/// Models wrap the array in prose or code fences; keep the outermost
/// bracketed span only.
fn extract_json_array(text: &str) -> Result<String> {
    let start = text.find('[');
    let end = text.rfind(']');
    match (start, end) {
        (Some(start), Some(end)) if end > start => Ok(text[start..=end].to_string()),
        _ => Err(anyhow!("no JSON array in model response")),
    }
}

async fn generate(url: String, request: GeminiRequest) -> Result<String> {
    let client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .timeout(std::time::Duration::from_secs(60))
        .build()?;

    let response = client
        .post(&url)
        .header("Content-Type", "application/json")
        .json(&request)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        return Err(anyhow!(
            "Gemini API request failed with status {}: {}",
            status,
            error_text
        ));
    }

    let gemini_response: GeminiResponse = response.json().await?;

    if let Some(feedback) = gemini_response.prompt_feedback {
        if let Some(block_reason) = feedback.block_reason {
            return Err(anyhow!("Gemini API blocked the request: {}", block_reason));
        }
    }

    let text = gemini_response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .and_then(|candidate| candidate.content.parts.into_iter().next())
        .map(|part| part.text)
        .ok_or_else(|| anyhow!("no text in Gemini response"))?;

    Ok(text.trim().to_string())
}

impl RecipeProvider for GeminiClient {
    fn generate_recipes(&self, ingredients: Vec<String>) -> BoxFuture<'static, Result<String>> {
        let (url, serial) = self.request_context();
        Box::pin(async move {
            let _serialized = serial.lock().await;
            let request = GeminiRequest {
                contents: vec![Content {
                    parts: vec![Part::Text {
                        text: recipe_prompt(&ingredients),
                    }],
                }],
                generation_config: Some(GenerationConfig {
                    temperature: 0.4,
                    max_output_tokens: Some(8192),
                }),
            };
            let text = generate(url, request).await?;
            extract_json_array(&text)
        })
    }
}

impl DescriptionProvider for GeminiClient {
    fn feature_status(&self) -> BoxFuture<'static, Result<FeatureStatus>> {
        // A remote capability needs no on-device download; it is available
        // whenever a key is configured.
        let status = if self.api_key.trim().is_empty() {
            FeatureStatus::Unavailable
        } else {
            FeatureStatus::Available
        };
        Box::pin(async move { Ok(status) })
    }

    fn download_feature(&self, _progress: ProgressSink) -> BoxFuture<'static, Result<()>> {
        debug!("download_feature is a no-op for the remote describer");
        Box::pin(async move { Ok(()) })
    }

    fn describe(&self, image_png: Vec<u8>, on_text: TextSink) -> BoxFuture<'static, Result<()>> {
        let (url, serial) = self.request_context();
        Box::pin(async move {
            let _serialized = serial.lock().await;
            let request = GeminiRequest {
                contents: vec![Content {
                    parts: vec![
                        Part::Text {
                            text: "Describe the objects visible in this image in one short \
                                   sentence. Name each distinct item."
                                .to_string(),
                        },
                        Part::InlineData {
                            inline_data: InlineData {
                                mime_type: "image/png".to_string(),
                                data: general_purpose::STANDARD.encode(&image_png),
                            },
                        },
                    ],
                }],
                generation_config: Some(GenerationConfig {
                    temperature: 0.0,
                    max_output_tokens: Some(1024),
                }),
            };
            let text = generate(url, request).await?;
            on_text(&text);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_ingredients_and_format_contract() {
        let prompt = recipe_prompt(&["Tomato".to_string(), "basil".to_string()]);
        assert!(prompt.starts_with("Given these detected items: Tomato, basil"));
        assert!(prompt.contains("FOOD INGREDIENTS"));
        assert!(prompt.contains("\"instructions\""));
    }

    #[test]
    fn json_array_is_extracted_from_prose() {
        let text = "Sure! Here are your recipes:\n```json\n[{\"title\":\"x\"}]\n```";
        assert_eq!(extract_json_array(text).unwrap(), "[{\"title\":\"x\"}]");
    }

    #[test]
    fn missing_array_is_an_error() {
        assert!(extract_json_array("no recipes today").is_err());
        assert!(extract_json_array("](").is_err());
    }

    #[test]
    fn unconfigured_key_reports_unavailable() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let client = GeminiClient::new(String::new(), "gemini-2.5-flash-lite".to_string());
        let status = rt.block_on(client.feature_status()).unwrap();
        assert_eq!(status, FeatureStatus::Unavailable);
    }
}
