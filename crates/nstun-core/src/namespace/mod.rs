//! Linux network namespace handling.
//!
//! Provides namespace references for `setns(2)`, namespace identities for
//! comparing them, and discovery of container namespaces under `/proc`.

pub mod discovery;
pub mod network;

pub use discovery::{DiscoveredNamespace, discover};
pub use network::{NamespaceRef, current_id};
