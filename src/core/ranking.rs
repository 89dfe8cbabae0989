//! Ranking and suggested tickets
//!
//! Predictions are ordered by win probability, highest first. The sort is
//! stable: horses with equal probability keep the order the model returned.
//!
//! Tickets are read straight off the ranking:
//!     馬連 (quinella) = ranks 1-2
//!     3連複 (trio)    = ranks 1-3

use std::fmt;

use crate::models::{Horse, PredictionResult, Race};

/// Marks for ranks 1-5 (◎ favourite, ○ second, ▲ third, △ and × outsiders)
pub const RANK_MARKS: [&str; 5] = ["◎", "○", "▲", "△", "×"];

/// Mark for a 0-based rank; none from the sixth place on
pub fn mark_for_rank(rank: usize) -> Option<&'static str> {
    RANK_MARKS.get(rank).copied()
}

/// Sort key treating NaN as the lowest probability; `-0.0` and `0.0` compare equal
fn sort_key(p: &PredictionResult) -> f64 {
    if p.win_probability.is_nan() {
        f64::NEG_INFINITY
    } else {
        p.win_probability + 0.0
    }
}

/// Stable descending sort by win probability
pub fn sort_by_win_probability(predictions: &[PredictionResult]) -> Vec<&PredictionResult> {
    let mut sorted: Vec<&PredictionResult> = predictions.iter().collect();
    sorted.sort_by(|a, b| sort_key(b).total_cmp(&sort_key(a)));
    sorted
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketKind {
    /// 馬連: top two in either order
    Quinella,
    /// 3連複: top three in any order
    Trio,
}

impl TicketKind {
    pub fn label(&self) -> &'static str {
        match self {
            TicketKind::Quinella => "馬連",
            TicketKind::Trio => "3連複",
        }
    }
}

/// Suggested combination; slots are `None` when fewer horses are ranked
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ticket<'a, const N: usize> {
    pub kind: TicketKind,
    pub horses: [Option<&'a Horse>; N],
}

impl<const N: usize> Ticket<'_, N> {
    pub fn is_complete(&self) -> bool {
        self.horses.iter().all(Option::is_some)
    }

    pub fn numbers(&self) -> [Option<u8>; N] {
        self.horses.map(|h| h.map(|h| h.number))
    }
}

impl<const N: usize> fmt::Display for Ticket<'_, N> {
    /// Horse numbers joined by `-`, with `?` for missing slots
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .numbers()
            .iter()
            .map(|n| n.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string()))
            .collect();
        write!(f, "{}", parts.join("-"))
    }
}

/// One row of the ranking view
#[derive(Debug, Clone, Copy)]
pub struct RankedEntry<'a> {
    /// 0-based
    pub rank: usize,
    pub prediction: &'a PredictionResult,
    /// `None` when the model returned an id outside the race
    pub horse: Option<&'a Horse>,
    pub mark: Option<&'static str>,
    /// win probability × win odds
    pub expected_value: Option<f64>,
}

impl RankedEntry<'_> {
    /// Win bet with positive expectation at current odds
    pub fn is_value_bet(&self) -> bool {
        self.expected_value.is_some_and(|ev| ev > 1.0)
    }
}

/// Predictions ordered for display
#[derive(Debug, Clone)]
pub struct Ranking<'a> {
    race: &'a Race,
    sorted: Vec<&'a PredictionResult>,
}

impl<'a> Ranking<'a> {
    pub fn new(race: &'a Race, predictions: &'a [PredictionResult]) -> Self {
        Self {
            race,
            sorted: sort_by_win_probability(predictions),
        }
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn sorted(&self) -> &[&'a PredictionResult] {
        &self.sorted
    }

    /// Horse at a 0-based rank
    pub fn rank_at(&self, rank: usize) -> Option<&'a Horse> {
        let pred = self.sorted.get(rank)?;
        self.race.horse(&pred.horse_id)
    }

    pub fn quinella(&self) -> Ticket<'a, 2> {
        Ticket {
            kind: TicketKind::Quinella,
            horses: [self.rank_at(0), self.rank_at(1)],
        }
    }

    pub fn trio(&self) -> Ticket<'a, 3> {
        Ticket {
            kind: TicketKind::Trio,
            horses: [self.rank_at(0), self.rank_at(1), self.rank_at(2)],
        }
    }

    pub fn entries(&self) -> Vec<RankedEntry<'a>> {
        self.sorted
            .iter()
            .enumerate()
            .map(|(rank, &prediction)| {
                let horse = self.race.horse(&prediction.horse_id);
                RankedEntry {
                    rank,
                    prediction,
                    horse,
                    mark: mark_for_rank(rank),
                    expected_value: horse.map(|h| prediction.win_probability * h.odds),
                }
            })
            .collect()
    }
}
