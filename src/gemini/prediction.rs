//! Race-wide win probability prediction

use serde_json::json;
use tracing::{error, info, warn};

use super::{parse_json_reply, GenerateContentRequest, GenerativeModel, InferenceError, Part};
use crate::error::audit_predictions;
use crate::models::{AnalysisBook, PredictionResult, Race};

/// Shown in place of a paddock score for horses that were not analyzed
pub const NO_PADDOCK_SCORE: &str = "未実施";

/// Response schema for a prediction run
pub fn prediction_schema() -> serde_json::Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "horseId": { "type": "STRING" },
                "winProbability": { "type": "NUMBER" },
                "reasoning": {
                    "type": "STRING",
                    "description": "日本語での予想根拠"
                }
            },
            "required": ["horseId", "winProbability", "reasoning"]
        }
    })
}

/// Predicts every horse's win probability from race data and paddock scores
pub struct RacePredictor<M> {
    model: M,
}

impl<M: GenerativeModel> RacePredictor<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Race summary handed to the model, one line per horse
    pub fn build_context(race: &Race, analyses: &AnalysisBook) -> String {
        let mut lines = vec![
            "以下のレースデータとパドック診断結果から、各馬の勝率を算出してください。".to_string(),
            "出力は必ず日本語で行ってください。".to_string(),
            String::new(),
            format!(
                "レース: {} ({} {}m, 天候: {}, 馬場状態: {})",
                race.name, race.venue, race.distance, race.weather, race.track_condition
            ),
            String::new(),
            "出走馬データ:".to_string(),
        ];

        lines.extend(race.horses.iter().map(|h| {
            let positions: Vec<String> = h.last_positions.iter().map(|p| p.to_string()).collect();
            let paddock = analyses
                .get(&h.id)
                .map(|a| a.score.to_string())
                .unwrap_or_else(|| NO_PADDOCK_SCORE.to_string());
            format!(
                "- {} (ID:{}, 馬番:{}): オッズ {}, 直近着順: {}, パドックスコア: {}",
                h.name,
                h.id,
                h.number,
                h.odds,
                positions.join(","),
                paddock
            )
        }));

        lines.push(String::new());
        lines.push(
            "過去の実績とパドックでの気配の両方を考慮し、各馬の勝率（0から1の範囲）と\
             予想根拠を専門的な視点で解説してください。horseIdには上記のIDを使ってください。"
                .to_string(),
        );
        lines.join("\n")
    }

    pub fn build_request(race: &Race, analyses: &AnalysisBook) -> GenerateContentRequest {
        GenerateContentRequest::json(
            vec![Part::text(Self::build_context(race, analyses))],
            prediction_schema(),
        )
    }

    /// Run a prediction, reporting failures.
    ///
    /// The reply is returned in model order with no renormalisation; an
    /// element missing any field fails the whole run.
    pub async fn try_predict(
        &self,
        race: &Race,
        analyses: &AnalysisBook,
    ) -> Result<Vec<PredictionResult>, InferenceError> {
        info!(
            "Predicting {} ({} horses, {} paddock analyses)",
            race.name,
            race.horses.len(),
            analyses.len()
        );

        let request = Self::build_request(race, analyses);
        let text = self.model.generate(&request).await?;
        let predictions: Vec<PredictionResult> = parse_json_reply(&text)?;

        for problem in audit_predictions(race, &predictions) {
            warn!("Prediction for {}: {}", race.id, problem);
        }

        Ok(predictions)
    }

    /// Run a prediction; any failure yields no predictions
    pub async fn predict(&self, race: &Race, analyses: &AnalysisBook) -> Vec<PredictionResult> {
        match self.try_predict(race, analyses).await {
            Ok(predictions) => predictions,
            Err(e) => {
                error!("Prediction failed: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::mock_race;
    use crate::gemini::testing::ScriptedModel;
    use crate::models::PaddockAnalysisResult;
    use chrono::Utc;

    fn book_with(horse_id: &str, score: f64) -> AnalysisBook {
        let mut book = AnalysisBook::new();
        book.insert(
            horse_id.to_string(),
            PaddockAnalysisResult {
                horse_id: horse_id.to_string(),
                score,
                feedback: "良好".to_string(),
                analyzed_at: Utc::now(),
            },
        );
        book
    }

    #[test]
    fn test_context_lists_every_horse() {
        let race = mock_race();
        let context = RacePredictor::<ScriptedModel>::build_context(&race, &book_with("h2", 8.0));

        assert!(context.contains("ジャパンカップ (G1) (東京競馬場 2400m, 天候: 晴れ, 馬場状態: 良)"));
        assert!(context.contains("- リバティアイランド (ID:h2, 馬番:2): オッズ 3.2, 直近着順: 1,1,2, パドックスコア: 8"));
        assert!(context.contains("- イクイノックス (ID:h1, 馬番:1): オッズ 1.5, 直近着順: 1,1,1, パドックスコア: 未実施"));
        assert_eq!(context.matches(NO_PADDOCK_SCORE).count(), 4);
        assert!(context.starts_with("以下のレースデータ"));
        assert!(context.contains("\n\n出走馬データ:\n- イクイノックス"));
        assert!(context.ends_with("horseIdには上記のIDを使ってください。"));
    }

    #[tokio::test]
    async fn test_predict_returns_model_order() {
        let race = mock_race();
        let reply = r#"[
            {"horseId": "h3", "winProbability": 0.2, "reasoning": "差し"},
            {"horseId": "h1", "winProbability": 0.6, "reasoning": "本命"}
        ]"#;
        let predictor = RacePredictor::new(ScriptedModel::new().reply(reply));

        let preds = predictor.predict(&race, &AnalysisBook::new()).await;
        let ids: Vec<&str> = preds.iter().map(|p| p.horse_id.as_str()).collect();
        assert_eq!(ids, vec!["h3", "h1"]);
    }

    #[tokio::test]
    async fn test_missing_probability_fails_whole_run() {
        let race = mock_race();
        let reply = r#"[
            {"horseId": "h1", "winProbability": 0.6, "reasoning": "本命"},
            {"horseId": "h2", "reasoning": "対抗"}
        ]"#;
        let predictor = RacePredictor::new(ScriptedModel::new().reply(reply));

        assert!(matches!(
            predictor.try_predict(&race, &AnalysisBook::new()).await,
            Err(InferenceError::MalformedResponse(_))
        ));

        let predictor = RacePredictor::new(ScriptedModel::new().reply(reply));
        assert!(predictor.predict(&race, &AnalysisBook::new()).await.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_yields_empty() {
        let race = mock_race();
        let predictor = RacePredictor::new(ScriptedModel::new().fail(InferenceError::EmptyResponse));
        assert!(predictor.predict(&race, &AnalysisBook::new()).await.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_values_pass_through() {
        let race = mock_race();
        let reply = r#"[
            {"horseId": "h1", "winProbability": 1.5, "reasoning": "?"},
            {"horseId": "h99", "winProbability": 0.7, "reasoning": "?"}
        ]"#;
        let predictor = RacePredictor::new(ScriptedModel::new().reply(reply));

        let preds = predictor.try_predict(&race, &AnalysisBook::new()).await.unwrap();
        assert_eq!(preds.len(), 2);
        assert_eq!(preds[0].win_probability, 1.5);
        assert_eq!(preds[1].horse_id, "h99");
    }

    #[tokio::test]
    async fn test_request_carries_array_schema() {
        let race = mock_race();
        let predictor = RacePredictor::new(ScriptedModel::new().reply("[]"));
        predictor.predict(&race, &AnalysisBook::new()).await;

        let requests = predictor.model().requests.borrow();
        assert_eq!(requests[0]["generationConfig"]["responseSchema"]["type"], "ARRAY");
        assert!(requests[0]["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("出走馬データ:"));
    }
}
