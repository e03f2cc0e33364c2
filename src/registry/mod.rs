//! # Metadata Registry
//!
//! Registry client trait and an in-memory registry.

pub mod client;
pub mod in_memory;

pub use client::{ListParams, RegistryClient, RegistryError, RegistryResult};
pub use in_memory::InMemoryRegistry;
