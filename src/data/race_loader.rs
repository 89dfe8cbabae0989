//! Race card loading: the built-in race and JSON race files

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::models::{Horse, Race};

/// Race loading errors
#[derive(Debug, Error)]
pub enum RaceLoadError {
    #[error("Failed to read race file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse race file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Race {0} has no horses")]
    NoHorses(String),

    #[error("Duplicate horse id: {0}")]
    DuplicateHorse(String),
}

/// Built-in race used when no race file is given
pub fn mock_race() -> Race {
    Race {
        id: "r1".to_string(),
        name: "ジャパンカップ (G1)".to_string(),
        venue: "東京競馬場".to_string(),
        distance: 2400,
        weather: "晴れ".to_string(),
        track_condition: "良".to_string(),
        horses: vec![
            horse("h1", "イクイノックス", 1, "C.ルメール", 58.0, &[1, 1, 1], "2:24.2", 1.5),
            horse("h2", "リバティアイランド", 2, "川田 将雅", 54.0, &[1, 1, 2], "2:24.5", 3.2),
            horse("h3", "ドウデュース", 3, "武 豊", 58.0, &[4, 1, 7], "2:24.8", 8.5),
            horse("h4", "スターズオンアース", 4, "W.ビュイック", 56.0, &[3, 2, 3], "2:24.9", 12.0),
            horse("h5", "ダノンベルーガ", 5, "J.モレイラ", 58.0, &[4, 5, 2], "2:25.1", 18.0),
        ],
    }
}

#[allow(clippy::too_many_arguments)]
fn horse(
    id: &str,
    name: &str,
    number: u8,
    jockey: &str,
    weight: f64,
    last_positions: &[u8],
    avg_time: &str,
    odds: f64,
) -> Horse {
    Horse {
        id: id.to_string(),
        name: name.to_string(),
        number,
        jockey: jockey.to_string(),
        weight,
        last_positions: last_positions.to_vec(),
        avg_time: avg_time.to_string(),
        odds,
    }
}

/// Load a race card from a JSON file
pub fn load_race<P: AsRef<Path>>(path: P) -> Result<Race, RaceLoadError> {
    let content = fs::read_to_string(path.as_ref())?;
    parse_race(&content)
}

/// Parse and check a race card from JSON text
pub fn parse_race(json: &str) -> Result<Race, RaceLoadError> {
    let race: Race = serde_json::from_str(json)?;

    if race.horses.is_empty() {
        return Err(RaceLoadError::NoHorses(race.id));
    }

    let mut seen = HashSet::new();
    for h in &race.horses {
        if !seen.insert(h.id.as_str()) {
            return Err(RaceLoadError::DuplicateHorse(h.id.clone()));
        }
    }

    Ok(race)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_race() {
        let race = mock_race();
        assert_eq!(race.horses.len(), 5);
        assert_eq!(race.distance, 2400);

        let ids: Vec<&str> = race.horses.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["h1", "h2", "h3", "h4", "h5"]);
    }

    #[test]
    fn test_parse_race_roundtrips_mock() {
        let json = serde_json::to_string(&mock_race()).unwrap();
        let race = parse_race(&json).unwrap();
        assert_eq!(race, mock_race());
    }

    #[test]
    fn test_parse_race_from_json_string() {
        let json = r#"{
            "id": "r9",
            "name": "有馬記念 (G1)",
            "venue": "中山競馬場",
            "distance": 2500,
            "weather": "曇り",
            "trackCondition": "稍重",
            "horses": [
                {
                    "id": "a1",
                    "name": "テストホース",
                    "number": 1,
                    "jockey": "騎手",
                    "weight": 57.5,
                    "lastPositions": [2, 3],
                    "avgTime": "2:31.0",
                    "odds": 4.2
                }
            ]
        }"#;

        let race = parse_race(json).unwrap();
        assert_eq!(race.track_condition, "稍重");
        assert!((race.horses[0].weight - 57.5).abs() < 1e-9);
        assert_eq!(race.horses[0].last_positions, vec![2, 3]);
    }

    #[test]
    fn test_parse_race_rejects_snake_case_keys() {
        let json = r#"{
            "id": "r9", "name": "x", "venue": "y", "distance": 1600,
            "weather": "晴れ", "track_condition": "良", "horses": []
        }"#;
        assert!(matches!(parse_race(json), Err(RaceLoadError::Json(_))));
    }

    #[test]
    fn test_parse_race_rejects_empty_field() {
        let mut race = mock_race();
        race.horses.clear();
        let json = serde_json::to_string(&race).unwrap();
        assert!(matches!(parse_race(&json), Err(RaceLoadError::NoHorses(_))));
    }

    #[test]
    fn test_parse_race_rejects_duplicate_ids() {
        let mut race = mock_race();
        race.horses[1].id = "h1".to_string();
        let json = serde_json::to_string(&race).unwrap();
        assert!(matches!(
            parse_race(&json),
            Err(RaceLoadError::DuplicateHorse(id)) if id == "h1"
        ));
    }

    #[test]
    fn test_load_race_missing_file() {
        let result = load_race("/nonexistent/race.json");
        assert!(matches!(result, Err(RaceLoadError::Io(_))));
    }
}
