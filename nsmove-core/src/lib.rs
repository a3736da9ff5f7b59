//! nsmove Core - Foundation types, events, and errors
//!
//! This crate provides the core abstractions shared by the namespace
//! switching layer and the relocation chain element.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod events;
pub mod types;

pub use error::{Error, Result};
pub use events::{Direction, EventSink, RelocationEvent, TracingSink};
pub use types::{Connection, ConnectionId, InterfaceName, KernelMechanism, NetNsRef};
