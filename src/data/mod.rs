//! Race data store

pub mod race_loader;

pub use race_loader::{load_race, mock_race, parse_race, RaceLoadError};
