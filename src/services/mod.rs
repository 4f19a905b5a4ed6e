//! # Services Module
//!
//! Runtime plumbing around the pure contract logic.
//!
//! ## Components
//!
//! - **Batch**: parallel settlement verification on the tokio blocking pool

pub mod batch;

pub use batch::{load_requests, verify_settlements, SettlementRequest};
