//! # Controller
//!
//! - `reconciler` - the generic reconciliation engine
//! - `indexer` - reverse-dependency lookups for data and instance changes
//! - `kinds` - static facts about the declared kinds
//! - `backoff` - Fibonacci retry delays

pub mod backoff;
pub mod indexer;
pub mod kinds;
pub mod reconciler;
