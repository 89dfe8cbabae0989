//! Umabase AI - Paddock analysis and race prediction
//!
//! This library provides:
//! - Frame capture from a camera or a selected image/video file
//! - Paddock condition scoring (1-10) of a single frame via Gemini
//! - Race-wide win probability prediction from race data and paddock scores
//! - Ranking, marks (◎○▲△×) and suggested 馬連 / 3連複 tickets
//!
//! # Example
//!
//! ```no_run
//! use umabase::capture::{CaptureConfig, CaptureMode, MediaCapture, MediaFile};
//! use umabase::data::mock_race;
//! use umabase::gemini::{GeminiClient, GeminiConfig};
//! use umabase::RaceSession;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let client = GeminiClient::new(GeminiConfig {
//!         api_key: std::env::var("API_KEY")?,
//!         ..Default::default()
//!     })?;
//!     let mut session = RaceSession::new(
//!         mock_race(),
//!         MediaCapture::new(CaptureConfig::default()),
//!         &client,
//!     );
//!
//!     session.select_horse("h1")?;
//!     if let Some(file) = MediaFile::from_path("paddock.jpg") {
//!         session.start_capture(CaptureMode::File(file))?;
//!     }
//!     session.capture_and_analyze().await?;
//!     session.run_prediction().await;
//!
//!     let ranking = session.ranking();
//!     println!("{} {}", ranking.quinella().kind.label(), ranking.quinella());
//!     Ok(())
//! }
//! ```

pub mod capture;
pub mod config;
pub mod core;
pub mod data;
pub mod error;
pub mod gemini;
pub mod models;
pub mod session;

// Re-export commonly used types
pub use config::{AppConfig, ConfigError, ConfigOverrides};
pub use core::{RankedEntry, Ranking, Ticket, TicketKind};
pub use data::{load_race, mock_race};
pub use models::{AnalysisBook, Horse, PaddockAnalysisResult, PredictionResult, Race};
pub use session::{PredictionState, RaceSession, SessionError};
