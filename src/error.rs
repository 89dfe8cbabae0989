//! Range checks for model-returned values
//!
//! Scores and probabilities coming back from the model are passed through
//! unchanged; these checks only feed warnings.

use thiserror::Error;

use crate::models::{PaddockAnalysisResult, PredictionResult, Race};

/// A value outside its nominal range
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Paddock score must be between 1 and 10, got {0}")]
    ScoreOutOfRange(f64),

    #[error("Probability must be between 0 and 1, got {0}")]
    ProbabilityOutOfRange(f64),

    #[error("Horse {0} is not entered in this race")]
    UnknownHorse(String),
}

pub fn validate_score(score: f64) -> Result<(), ValidationError> {
    if !(1.0..=10.0).contains(&score) {
        return Err(ValidationError::ScoreOutOfRange(score));
    }
    Ok(())
}

pub fn validate_probability(prob: f64) -> Result<(), ValidationError> {
    if !(0.0..=1.0).contains(&prob) {
        return Err(ValidationError::ProbabilityOutOfRange(prob));
    }
    Ok(())
}

pub fn validate_horse_id(race: &Race, horse_id: &str) -> Result<(), ValidationError> {
    if race.horse(horse_id).is_none() {
        return Err(ValidationError::UnknownHorse(horse_id.to_string()));
    }
    Ok(())
}

/// Collect every range problem in an analysis
pub fn audit_analysis(result: &PaddockAnalysisResult) -> Vec<ValidationError> {
    validate_score(result.score).err().into_iter().collect()
}

/// Collect every range or identity problem in a prediction run
pub fn audit_predictions(race: &Race, predictions: &[PredictionResult]) -> Vec<ValidationError> {
    let mut problems = Vec::new();
    for pred in predictions {
        if let Err(e) = validate_horse_id(race, &pred.horse_id) {
            problems.push(e);
        }
        if let Err(e) = validate_probability(pred.win_probability) {
            problems.push(e);
        }
    }
    problems
}
