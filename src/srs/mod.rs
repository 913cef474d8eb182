//! Spaced-repetition scheduling (SM-2).
//!
//! - [`algorithm`]: the pure update rule
//! - [`scheduler`]: review recording and due/new selection over the record store
//! - [`store`]: `review_items` row access
//! - [`types`]: items, grades and counts

pub mod algorithm;
pub mod scheduler;
pub mod store;
pub mod types;

pub use algorithm::compute_next_review;
pub use scheduler::Scheduler;
pub use types::{EmbeddingState, NewItem, Quality, ReviewItem, ReviewStats, Sm2State};
