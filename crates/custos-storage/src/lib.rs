//! Custos Storage - durable backends for the ledger and the key store.
//!
//! # Raw Key-Value ([`KvStore`])
//!
//! Byte-level `get`/`set`/`delete` scoped by namespace, with two atomic
//! primitives the upper layers depend on:
//!
//! - [`KvStore::set_if_absent`]: write-once records (audit entries are
//!   immutable once appended)
//! - [`KvStore::set_batch`]: several keys committed together (key rotation
//!   deactivates one key and activates another in one commit)
//!
//! Implementations:
//! - [`MemoryKvStore`] (always available): tests and ephemeral deployments
//! - `SurrealKvStore` (behind the **`kv`** feature): embedded, ACID,
//!   LSM-tree persistence
//!
//! # Blocking access ([`BlockingKvStore`])
//!
//! The ledger and key manager expose synchronous APIs. [`BlockingKvStore`]
//! pre-binds a namespace and bridges the async trait into sync calls.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod blocking;
pub mod error;
pub mod kv;

pub use blocking::{BlockingKvStore, block_on};
pub use error::{StorageError, StorageResult};
pub use kv::{KvStore, MemoryKvStore};

#[cfg(feature = "kv")]
pub use kv::SurrealKvStore;
