//! Network namespace switching and interface relocation
//!
//! This crate provides the pieces that touch per-thread namespace state:
//! - [`NetNsProvider`] - capability trait over the kernel
//! - [`LinuxNetNs`] / [`MockNetNs`] - kernel and in-memory providers
//! - [`NamespaceSwitcher`] - switch/no-op/restore against a fixed home
//! - [`move_interface`] / [`InterfaceRelocator`] - move one interface with guaranteed restore
//! - [`NetNsWorker`] - the single OS thread all of the above runs on

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod config;
pub mod inspect;
pub mod linux;
pub mod mock;
pub mod netlink;
pub mod provider;
pub mod relocator;
pub mod switcher;
pub mod worker;

pub use config::RelocationConfig;
pub use inspect::{list_named, NamedNetNs, ProcessNetNs};
pub use linux::LinuxNetNs;
pub use mock::{MockCall, MockNetNs, MockOp};
pub use provider::{InterfaceRef, NetNsHandle, NetNsId, NetNsProvider};
pub use relocator::{move_interface, InterfaceRelocator};
pub use switcher::NamespaceSwitcher;
pub use worker::NetNsWorker;
