//! Repository layer: one zero-sized repo per table.
//!
//! Every method is generic over [`sqlx::PgExecutor`], so callers pass either
//! `&PgPool` or `&mut *tx` from an open transaction.

pub mod completed_event_repo;
pub mod event_repo;
pub mod profile_repo;
pub mod task_repo;

pub use completed_event_repo::CompletedEventRepo;
pub use event_repo::EventRepo;
pub use profile_repo::ProfileRepo;
pub use task_repo::TaskRepo;
