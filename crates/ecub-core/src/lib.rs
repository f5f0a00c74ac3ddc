//! ecub-core - Core models and collaborator contracts for the ECU bridge
//!
//! This crate provides the shared vocabulary of the bridge service: the
//! unified fault taxonomy, battery and vehicle state models, and the
//! `KvStore` trait that abstracts the key-value + pub/sub collaborator.

pub mod error;
pub mod ipc;
pub mod models;

pub use error::IpcError;
pub use ipc::{KvStore, MemoryKvStore};
pub use models::*;
