//! Gemini-backed paddock analysis and race prediction
//!
//! # Example
//!
//! ```no_run
//! use umabase::data::mock_race;
//! use umabase::gemini::{GeminiClient, GeminiConfig, RacePredictor};
//! use umabase::AnalysisBook;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let client = GeminiClient::new(GeminiConfig {
//!         api_key: std::env::var("API_KEY")?,
//!         ..Default::default()
//!     })?;
//!     let predictor = RacePredictor::new(client);
//!
//!     let predictions = predictor.predict(&mock_race(), &AnalysisBook::new()).await;
//!     println!("{} predictions", predictions.len());
//!     Ok(())
//! }
//! ```

mod analysis;
mod client;
mod prediction;

pub use analysis::{paddock_schema, PaddockAnalyzer};
pub use client::{
    Blob, Content, GeminiClient, GeminiConfig, GenerateContentRequest, GenerationConfig,
    InferenceError, Part,
};
pub use prediction::{prediction_schema, RacePredictor, NO_PADDOCK_SCORE};

/// A model that answers a `generateContent` request with response text
#[allow(async_fn_in_trait)]
pub trait GenerativeModel {
    async fn generate(&self, request: &GenerateContentRequest) -> Result<String, InferenceError>;
}

impl<M: GenerativeModel> GenerativeModel for &M {
    async fn generate(&self, request: &GenerateContentRequest) -> Result<String, InferenceError> {
        (**self).generate(request).await
    }
}

/// Parse model output, tolerating a Markdown code fence around the JSON
pub(crate) fn parse_json_reply<T: serde::de::DeserializeOwned>(
    text: &str,
) -> Result<T, InferenceError> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);

    serde_json::from_str(body.trim()).map_err(|e| InferenceError::MalformedResponse(e.to_string()))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    struct Reply {
        score: f64,
    }

    #[test]
    fn test_parse_json_reply_plain() {
        let r: Reply = parse_json_reply(r#" {"score": 6} "#).unwrap();
        assert_eq!(r.score, 6.0);
    }

    #[test]
    fn test_parse_json_reply_fenced() {
        let r: Reply = parse_json_reply("```json\n{\"score\": 8}\n```").unwrap();
        assert_eq!(r.score, 8.0);
    }

    #[test]
    fn test_parse_json_reply_invalid() {
        assert!(matches!(
            parse_json_reply::<Reply>("score: eight"),
            Err(InferenceError::MalformedResponse(_))
        ));
    }
}
