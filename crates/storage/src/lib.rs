//! Storage abstraction and implementations for StudyTrack.
//!
//! This crate provides a trait-based storage interface with a JSON-file
//! reference implementation and an in-memory backend with snapshot
//! commit/rollback for tests and embedded use.

#![warn(missing_docs)]

pub mod json_storage;
pub mod memory;
pub mod trait_;

pub use json_storage::JsonStorage;
pub use memory::MemoryStorage;
pub use trait_::{Result, Storage, StorageError};
