use log::error;
use serde::{Deserialize, Serialize};

/// One generated recipe. `ingredients` is a comma-joined string and
/// `instructions` a newline-joined string, exactly as the provider emits them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub title: String,
    pub description: String,
    pub ingredients: String,
    pub instructions: String,
}

/// Parse a provider response (a JSON array of recipe objects). Any parse
/// failure yields an empty list rather than an error; malformed responses
/// must never take down the pipeline.
pub fn parse_recipes(json: &str) -> Vec<Recipe> {
    match serde_json::from_str::<Vec<Recipe>>(json) {
        Ok(recipes) => recipes,
        Err(e) => {
            error!("failed to parse recipes JSON: {e}");
            Vec::new()
        }
    }
}
