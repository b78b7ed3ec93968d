//! shelf - Book / Stage / Task progress tracking
//!
//! This library provides the core functionality for the shelf CLI tool:
//! a three-level hierarchy whose progress rolls up from tasks to books, with
//! gapless manual ordering at every level.
//!
//! # Core Concepts
//!
//! - **Ordered collections**: sibling lists with positions exactly `1..=N`
//! - **Progress roll-up**: task completion drives stage and book progress
//! - **Reorder**: array-style moves that rewrite every sibling position
//! - **Coordinator**: plans each action as one all-or-nothing write batch
//!
//! # Module Organization
//!
//! - `model`: Book, Stage, Task records and patches
//! - `ids`: Record id generation and prefix resolution
//! - `ordered`: Gapless sibling lists
//! - `progress`: Roll-up rules and completion estimates
//! - `reorder`: Drag-and-drop moves
//! - `store`: Storage boundary, write batches and the in-memory store
//! - `storage`: JSON file store
//! - `lock`: File locking and atomic operations for concurrency safety
//! - `coordinator`: Cross-level propagation and top-level actions
//! - `notify`: Success / error notifications
//! - `stats`: Library statistics
//! - `config`: Configuration loading from `.shelf.toml`
//! - `error`: Error types and result aliases
//! - `output`: Human and JSON output
//! - `cli`: Command-line interface using clap

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod ids;
pub mod lock;
pub mod model;
pub mod notify;
pub mod ordered;
pub mod output;
pub mod progress;
pub mod reorder;
pub mod stats;
pub mod storage;
pub mod store;

pub use error::{Error, Result};
