use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Race entrant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Horse {
    pub id: String,
    pub name: String,
    pub number: u8,
    pub jockey: String,
    /// Carried weight in kg
    pub weight: f64,
    /// Recent finishing positions, most recent first
    pub last_positions: Vec<u8>,
    pub avg_time: String,
    /// Win odds (decimal)
    pub odds: f64,
}

/// Race card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Race {
    pub id: String,
    pub name: String,
    pub venue: String,
    /// Distance in metres
    pub distance: u32,
    pub weather: String,
    pub track_condition: String,
    pub horses: Vec<Horse>,
}

impl Race {
    /// Look up an entrant by id
    pub fn horse(&self, horse_id: &str) -> Option<&Horse> {
        self.horses.iter().find(|h| h.id == horse_id)
    }
}

/// Paddock condition analysis for one horse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaddockAnalysisResult {
    pub horse_id: String,
    /// Condition score, nominally 1-10
    pub score: f64,
    pub feedback: String,
    pub analyzed_at: DateTime<Utc>,
}

/// Win probability for one horse, as returned by a prediction run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub horse_id: String,
    /// Nominally 0-1
    pub win_probability: f64,
    pub reasoning: String,
}

/// Paddock analyses keyed by horse id; a later analysis overwrites an earlier one
pub type AnalysisBook = HashMap<String, PaddockAnalysisResult>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_result_wire_names() {
        let json = r#"{"horseId": "h1", "winProbability": 0.42, "reasoning": "安定"}"#;
        let pred: PredictionResult = serde_json::from_str(json).unwrap();
        assert_eq!(pred.horse_id, "h1");
        assert!((pred.win_probability - 0.42).abs() < 1e-9);

        let out = serde_json::to_value(&pred).unwrap();
        assert!(out.get("winProbability").is_some());
    }

    #[test]
    fn test_prediction_result_requires_probability() {
        let json = r#"{"horseId": "h1", "reasoning": "安定"}"#;
        assert!(serde_json::from_str::<PredictionResult>(json).is_err());
    }

    #[test]
    fn test_race_wire_names() {
        let value = serde_json::to_value(crate::data::mock_race()).unwrap();
        assert_eq!(value["trackCondition"], "良");
        assert_eq!(value["horses"][0]["lastPositions"], serde_json::json!([1, 1, 1]));
        assert_eq!(value["horses"][0]["avgTime"], "2:24.2");
        assert!(value.get("track_condition").is_none());
    }

    #[test]
    fn test_race_horse_lookup() {
        let race = crate::data::mock_race();
        assert_eq!(race.horse("h3").map(|h| h.number), Some(3));
        assert!(race.horse("h9").is_none());
    }
}
