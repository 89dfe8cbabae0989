//! Paddock condition analysis from a single frame

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::{parse_json_reply, GenerateContentRequest, GenerativeModel, InferenceError, Part};
use crate::capture::FramePayload;
use crate::error::audit_analysis;
use crate::models::{Horse, PaddockAnalysisResult};

/// Structured reply: both fields are required
#[derive(Debug, Deserialize)]
struct PaddockVerdict {
    score: f64,
    feedback: String,
}

/// Response schema for paddock analysis
pub fn paddock_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "score": {
                "type": "NUMBER",
                "description": "1から10のコンディションスコア"
            },
            "feedback": {
                "type": "STRING",
                "description": "馬の状態についての簡潔な日本語コメント"
            }
        },
        "required": ["score", "feedback"]
    })
}

fn paddock_prompt(horse_name: &str) -> String {
    format!(
        "パドックでの馬「{}」の状態を診断してください。\
         筋肉の張り、毛艶、気合（集中力）、歩様のリズム、発汗（入れ込み）を評価し、\
         1から10のスコアと、専門的かつ簡潔な日本語の解説を返してください。",
        horse_name
    )
}

/// Sends one frame per horse to the model and parses the condition score
pub struct PaddockAnalyzer<M> {
    model: M,
}

impl<M: GenerativeModel> PaddockAnalyzer<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Build the request sent for `horse_name`
    pub fn build_request(frame: &FramePayload, horse_name: &str) -> GenerateContentRequest {
        GenerateContentRequest::json(
            vec![
                Part::inline(FramePayload::MIME_TYPE, &frame.base64),
                Part::text(paddock_prompt(horse_name)),
            ],
            paddock_schema(),
        )
    }

    /// Analyze one frame of `horse`.
    ///
    /// A reply missing `score` or `feedback` fails the whole call.
    pub async fn analyze(
        &self,
        frame: &FramePayload,
        horse: &Horse,
    ) -> Result<PaddockAnalysisResult, InferenceError> {
        info!(
            "Analyzing paddock frame for {} ({}x{})",
            horse.name, frame.width, frame.height
        );

        let request = Self::build_request(frame, &horse.name);
        let text = self.model.generate(&request).await?;
        let verdict: PaddockVerdict = parse_json_reply(&text)?;

        let result = PaddockAnalysisResult {
            horse_id: horse.id.clone(),
            score: verdict.score,
            feedback: verdict.feedback,
            analyzed_at: Utc::now(),
        };

        for problem in audit_analysis(&result) {
            warn!("Paddock analysis for {}: {}", horse.id, problem);
        }

        Ok(result)
    }
}
