//! Database layer for Gatekeep
//!
//! Provides the durable review queue: submissions, status transitions,
//! retry counters, and the aggregate views the scheduler reports on.

pub mod db;
pub mod error;
pub mod models;
pub mod repos;

pub use db::{Database, DatabaseConfig};
pub use error::{Error, Result};
pub use models::{NewQueueItem, QueueItem, QueueStats, QueueStatus, SubmittedTests};
pub use repos::ReviewQueue;
