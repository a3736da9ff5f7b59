//! Request/Close chain and the interface relocation element
//!
//! - [`NetworkService`] - one element of a chain
//! - [`ChainBuilder`] / [`Chain`] - explicit composition, first to last
//! - [`RequestContext`] - role, cancellation and metadata for one call
//! - [`RelocationElement`] - moves the connection's interface into its namespace

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod chain;
pub mod context;
pub mod relocation;
pub mod service;

pub use chain::{Chain, ChainBuilder};
pub use context::{CancelHandle, RequestContext, Role};
pub use relocation::{RelocationElement, RelocationState};
pub use service::{NetworkService, Terminal};
