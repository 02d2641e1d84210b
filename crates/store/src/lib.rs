//! State store implementations for Stepwise.
//!
//! Both backends implement `stepwise_core::StateStore`:
//! - [`InMemoryStateStore`] for tests and throwaway runs
//! - [`FileStateStore`] for durable, human-inspectable JSON snapshots

pub mod file_backend;
pub mod in_memory;

pub use file_backend::FileStateStore;
pub use in_memory::InMemoryStateStore;
