//! tessera-storage: store implementations for the tessera decision core.
//!
//! Currently a single backend: [`MemoryRelationStore`], the in-memory
//! reference implementation of `tessera_domain::RelationStore`. It backs
//! the end-to-end tests and the check benchmark, and serves as the
//! semantics baseline any persistent backend must match.

pub mod memory;

pub use memory::MemoryRelationStore;
