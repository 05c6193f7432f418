//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external collaborators. The sync engine
//! depends only on these traits, not on concrete implementations.

mod identity;
mod local_store;
mod remote_store;
mod state_store;

pub use identity::IdentityProvider;
pub use local_store::LocalStore;
pub use remote_store::RemoteStore;
pub use state_store::{keys as state_keys, StateStore};
