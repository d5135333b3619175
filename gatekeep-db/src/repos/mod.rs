//! Repository modules for database operations

pub mod queue;

pub use queue::ReviewQueue;
