//! Domain core for the HabitQuest reward engine.
//!
//! Holds everything that has no I/O of its own: the reward curve, the daily
//! XP cap, the client-side session state machine, the row-store contract and
//! the settlement procedure that is the single writer of reward state.

pub mod clock;
pub mod daily_cap;
pub mod error;
pub mod models;
pub mod reward;
pub mod session;
pub mod settlement;
pub mod store;
pub mod types;
