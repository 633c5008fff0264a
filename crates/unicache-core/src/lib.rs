//! Core building blocks shared by every unicache crate.
//!
//! - [`key`]: versioned key codec (`{namespace}:v{version}:{subkey}`)
//! - [`event`]: invalidation events broadcast between instances
//! - [`store`]: the shared store protocol (counter, key/value, lock, bus)
//! - [`memory`]: in-process implementation of the store protocol

pub mod error;
pub mod event;
pub mod key;
pub mod memory;
pub mod store;

pub use error::{KeyError, StoreError};
pub use event::{ChangeKind, INVALIDATION_CHANNEL, InvalidationEvent, origin_id};
pub use key::{KEY_SEPARATOR, SUBKEY_JOINER, VersionedKey};
pub use memory::{MemoryBus, MemoryStore};
pub use store::{
    CounterStore, InvalidationBus, InvalidationHandler, KeyValueStore, LockStore, MAX_TTL,
    Subscription,
};
