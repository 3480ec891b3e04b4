//! Client side of the reward engine.
//!
//! - [`api`] -- HTTP client for the settlement endpoint.
//! - [`runner`] -- drives one [`Session`](habitquest_core::session::Session)
//!   on a one-second tick, persists it, and settles it exactly once.

pub mod api;
pub mod runner;
