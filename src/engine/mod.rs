//! Core engine: roster building, contest submission and ranking.

pub mod roster;
pub mod submission;
pub mod leaderboard;
