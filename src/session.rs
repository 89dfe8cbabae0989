//! Per-race review session
//!
//! Holds everything the front end needs for one race: the selected horse,
//! the capture source, paddock analyses and the last prediction run.
//! Every operation takes `&mut self`, so a session never has more than one
//! analysis or prediction in flight.

use thiserror::Error;
use tracing::{info, warn};

use crate::capture::{CaptureError, CaptureMode, FramePayload, MediaCapture, SourceKind};
use crate::core::Ranking;
use crate::gemini::{GenerativeModel, InferenceError, PaddockAnalyzer, RacePredictor};
use crate::models::{AnalysisBook, Horse, PaddockAnalysisResult, PredictionResult, Race};

/// Session errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Select a horse before capturing")]
    NoHorseSelected,

    #[error("Horse {0} is not entered in this race")]
    UnknownHorse(String),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Paddock analysis failed: {0}")]
    Analysis(#[source] InferenceError),
}

/// Outcome of the most recent prediction run
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PredictionState {
    #[default]
    NotRun,
    Running,
    Failed(String),
    Succeeded(Vec<PredictionResult>),
}

impl PredictionState {
    pub fn predictions(&self) -> &[PredictionResult] {
        match self {
            PredictionState::Succeeded(preds) => preds,
            _ => &[],
        }
    }
}

/// One race under review
pub struct RaceSession<M> {
    race: Race,
    capture: MediaCapture,
    analyzer: PaddockAnalyzer<M>,
    predictor: RacePredictor<M>,
    selected: Option<String>,
    analyses: AnalysisBook,
    prediction: PredictionState,
}

impl<M: GenerativeModel + Clone> RaceSession<M> {
    pub fn new(race: Race, capture: MediaCapture, model: M) -> Self {
        Self::with_clients(
            race,
            capture,
            PaddockAnalyzer::new(model.clone()),
            RacePredictor::new(model),
        )
    }
}

impl<M: GenerativeModel> RaceSession<M> {
    pub fn with_clients(
        race: Race,
        capture: MediaCapture,
        analyzer: PaddockAnalyzer<M>,
        predictor: RacePredictor<M>,
    ) -> Self {
        Self {
            race,
            capture,
            analyzer,
            predictor,
            selected: None,
            analyses: AnalysisBook::new(),
            prediction: PredictionState::NotRun,
        }
    }

    pub fn race(&self) -> &Race {
        &self.race
    }

    pub fn analyses(&self) -> &AnalysisBook {
        &self.analyses
    }

    pub fn analysis_for(&self, horse_id: &str) -> Option<&PaddockAnalysisResult> {
        self.analyses.get(horse_id)
    }

    pub fn prediction_state(&self) -> &PredictionState {
        &self.prediction
    }

    /// Predictions from the last successful run; empty otherwise
    pub fn predictions(&self) -> &[PredictionResult] {
        self.prediction.predictions()
    }

    pub fn ranking(&self) -> Ranking<'_> {
        Ranking::new(&self.race, self.predictions())
    }

    pub fn capture(&self) -> &MediaCapture {
        &self.capture
    }

    pub fn selected_horse(&self) -> Option<&Horse> {
        self.selected.as_deref().and_then(|id| self.race.horse(id))
    }

    pub fn select_horse(&mut self, horse_id: &str) -> Result<&Horse, SessionError> {
        let horse = self
            .race
            .horse(horse_id)
            .ok_or_else(|| SessionError::UnknownHorse(horse_id.to_string()))?;
        self.selected = Some(horse.id.clone());
        Ok(horse)
    }

    pub fn start_capture(&mut self, mode: CaptureMode) -> Result<SourceKind, SessionError> {
        Ok(self.capture.start_capture(mode)?)
    }

    /// Release the camera or file currently in use
    pub fn stop_capture(&mut self) {
        self.capture.stop();
    }

    /// Capture a frame for the selected horse and analyze it.
    ///
    /// Precondition failures (no horse, no source, no frame) are reported
    /// before the model is contacted.
    pub async fn capture_and_analyze(&mut self) -> Result<&PaddockAnalysisResult, SessionError> {
        let horse_id = self.selected.clone().ok_or(SessionError::NoHorseSelected)?;
        let frame = self.capture.capture_frame()?;
        self.analyze_frame(&horse_id, &frame).await
    }

    /// Analyze an already captured frame; on success the result replaces any
    /// earlier analysis of the same horse.
    pub async fn analyze_frame(
        &mut self,
        horse_id: &str,
        frame: &FramePayload,
    ) -> Result<&PaddockAnalysisResult, SessionError> {
        let horse = self
            .race
            .horse(horse_id)
            .ok_or_else(|| SessionError::UnknownHorse(horse_id.to_string()))?;

        let result = self
            .analyzer
            .analyze(frame, horse)
            .await
            .map_err(SessionError::Analysis)?;

        info!(
            "Paddock score for {}: {} ({})",
            horse.name, result.score, result.analyzed_at
        );

        let id = horse.id.clone();
        self.analyses.insert(id.clone(), result);
        Ok(&self.analyses[&id])
    }

    /// Run a prediction over all collected analyses.
    ///
    /// Failures leave no predictions but are recorded as `Failed`, so they
    /// are distinguishable from a run that has not happened.
    pub async fn run_prediction(&mut self) -> &PredictionState {
        self.prediction = PredictionState::Running;

        self.prediction = match self.predictor.try_predict(&self.race, &self.analyses).await {
            Ok(preds) => PredictionState::Succeeded(preds),
            Err(e) => {
                warn!("Prediction run failed: {}", e);
                PredictionState::Failed(e.to_string())
            }
        };
        &self.prediction
    }
}
