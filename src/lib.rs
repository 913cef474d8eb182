//! Study-assistant core: SM-2 review scheduling and a persistent embedding
//! index, both backed by SQLite.
//!
//! The two engines are independent:
//!
//! | Engine | Owns | Answers |
//! |--------|------|---------|
//! | [`srs::Scheduler`] | ease, interval, repetitions, due date per item | what is due, what is new, counts |
//! | [`index::VectorIndex`] | embedding matrix, internal → external id mapping | nearest neighbours, soft delete, compaction |
//!
//! [`app::Mentor`] composes them with a record store connection and an
//! [`embedding::EmbeddingProvider`].
//!
//! # Modules
//!
//! - [`app`]: the `Mentor` context that wires everything together
//! - [`config`]: configuration loading from TOML files and environment variables
//! - [`db`]: SQLite initialization, schema, migrations and health checks
//! - [`embedding`]: text-to-vector providers (Gemini, hashing, disabled)
//! - [`error`]: error type and classification
//! - [`index`]: flat vector index, mapping table and index file format
//! - [`srs`]: SM-2 algorithm, item store and scheduler

pub mod app;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod index;
pub mod srs;

pub use error::{ErrorKind, MentorError, Result};
