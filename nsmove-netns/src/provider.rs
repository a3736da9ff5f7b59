//! Network namespace capability trait
//!
//! Everything the switcher and relocator need from the operating system goes
//! through [`NetNsProvider`]. [`LinuxNetNs`](crate::LinuxNetNs) talks to the
//! kernel, [`MockNetNs`](crate::MockNetNs) keeps an in-memory model for tests.

use std::fmt;
use std::fs::Metadata;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::fs::MetadataExt;

use nsmove_core::{InterfaceName, NetNsRef, Result};

/// Identity of a network namespace: the device and inode of its nsfs file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetNsId {
    /// Device of the nsfs inode
    pub dev: u64,
    /// Inode number
    pub ino: u64,
}

impl NetNsId {
    /// Create from raw device and inode numbers
    #[must_use]
    pub const fn new(dev: u64, ino: u64) -> Self {
        Self { dev, ino }
    }

    /// Read the identity from file metadata
    #[must_use]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self::new(metadata.dev(), metadata.ino())
    }
}

impl fmt::Display for NetNsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "net:[{}]", self.ino)
    }
}

/// Owned reference to one network namespace
///
/// Not `Clone`: every handle is released exactly once, through
/// [`NetNsProvider::release`]. Equality compares namespace identity only.
#[derive(Debug)]
pub struct NetNsHandle {
    id: NetNsId,
    fd: Option<OwnedFd>,
}

impl NetNsHandle {
    /// Handle backed by an open nsfs descriptor
    #[must_use]
    pub const fn from_fd(id: NetNsId, fd: OwnedFd) -> Self {
        Self { id, fd: Some(fd) }
    }

    /// Handle with no kernel object behind it
    #[must_use]
    pub const fn detached(id: NetNsId) -> Self {
        Self { id, fd: None }
    }

    /// Namespace identity
    #[must_use]
    pub const fn id(&self) -> NetNsId {
        self.id
    }

    /// Borrow the descriptor, if there is one
    #[must_use]
    pub fn fd(&self) -> Option<BorrowedFd<'_>> {
        self.fd.as_ref().map(AsFd::as_fd)
    }

    /// Give up the descriptor
    pub(crate) fn into_fd(self) -> Option<OwnedFd> {
        self.fd
    }
}

impl PartialEq for NetNsHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for NetNsHandle {}

impl fmt::Display for NetNsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.id.fmt(f)
    }
}

/// A kernel interface resolved in the namespace that was current at lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRef {
    /// Interface name
    pub name: InterfaceName,
    /// Interface index inside its namespace
    pub index: u32,
}

/// Operating-system capabilities for switching namespaces and moving interfaces
///
/// Methods that read or change "the current namespace" act on the calling OS
/// thread. Call them only from the [`NetNsWorker`](crate::NetNsWorker) thread.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; the provider is shared between the
/// async side (which never touches thread state) and the worker thread.
pub trait NetNsProvider: Send + Sync {
    /// Handle to the calling thread's current network namespace
    ///
    /// # Errors
    /// Returns error if the namespace file cannot be opened
    fn current(&self) -> Result<NetNsHandle>;

    /// Open the namespace a reference points at
    ///
    /// # Errors
    /// Returns [`Error::Acquisition`](nsmove_core::Error::Acquisition) if the
    /// reference does not name a network namespace
    fn open(&self, reference: &NetNsRef) -> Result<NetNsHandle>;

    /// Whether two handles refer to the same namespace
    fn same(&self, a: &NetNsHandle, b: &NetNsHandle) -> bool {
        a == b
    }

    /// Move the calling thread into a namespace
    ///
    /// # Errors
    /// Returns error if the kernel refuses the switch
    fn set_current(&self, handle: &NetNsHandle) -> Result<()>;

    /// Find an interface in the calling thread's current namespace
    ///
    /// # Errors
    /// Returns [`Error::Lookup`](nsmove_core::Error::Lookup) if it does not exist
    fn find_interface(&self, name: &InterfaceName) -> Result<InterfaceRef>;

    /// Reassign an interface to another namespace
    ///
    /// # Errors
    /// Returns [`Error::Relocation`](nsmove_core::Error::Relocation) if the
    /// kernel refuses the move
    fn move_interface(&self, interface: &InterfaceRef, target: &NetNsHandle) -> Result<()>;

    /// Release a handle
    ///
    /// # Errors
    /// Returns error if closing the underlying descriptor fails
    fn release(&self, handle: NetNsHandle) -> Result<()>;
}
