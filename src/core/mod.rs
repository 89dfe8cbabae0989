//! Core business logic modules

pub mod ranking;

// Re-export commonly used types
pub use ranking::{
    mark_for_rank, sort_by_win_probability, RankedEntry, Ranking, Ticket, TicketKind, RANK_MARKS,
};
