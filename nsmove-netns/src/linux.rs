//! Kernel-backed [`NetNsProvider`]

use nix::errno::Errno;
use nix::sched::{setns, CloneFlags};
use nix::sys::statfs::fstatfs;
use std::fs::File;
use std::os::fd::OwnedFd;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, trace};

use nsmove_core::{Error, InterfaceName, NetNsRef, Result};

use crate::netlink::RouteSocket;
use crate::provider::{InterfaceRef, NetNsHandle, NetNsId, NetNsProvider};

/// Namespace file of the calling thread (not the whole process)
pub const THREAD_NETNS_PATH: &str = "/proc/thread-self/ns/net";

/// `statfs` magic of the nsfs filesystem
const NSFS_MAGIC: i64 = 0x6e73_6673;

/// Provider backed by `setns(2)`, nsfs files and rtnetlink
#[derive(Debug, Default)]
pub struct LinuxNetNs {
    seq: AtomicU32,
}

impl LinuxNetNs {
    /// Create a new kernel-backed provider
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a namespace file and check that it really is one
    fn open_nsfs(path: &Path) -> Result<NetNsHandle> {
        let file = File::open(path).map_err(|e| {
            Error::acquisition(format!(
                "failed to open network namespace {}: {e}",
                path.display()
            ))
        })?;

        let statfs = fstatfs(&file).map_err(|e| {
            Error::acquisition(format!("failed to stat {}: {e}", path.display()))
        })?;
        #[allow(clippy::unnecessary_cast, clippy::cast_lossless)]
        let fs_type = statfs.filesystem_type().0 as i64;
        if fs_type != NSFS_MAGIC {
            return Err(Error::acquisition(format!(
                "{} is not a namespace file",
                path.display()
            )));
        }

        let metadata = file.metadata().map_err(|e| {
            Error::acquisition(format!("failed to stat {}: {e}", path.display()))
        })?;
        let id = NetNsId::from_metadata(&metadata);

        trace!(path = %path.display(), netns = %id, "Opened network namespace");

        Ok(NetNsHandle::from_fd(id, OwnedFd::from(file)))
    }
}

impl NetNsProvider for LinuxNetNs {
    fn current(&self) -> Result<NetNsHandle> {
        Self::open_nsfs(Path::new(THREAD_NETNS_PATH))
    }

    fn open(&self, reference: &NetNsRef) -> Result<NetNsHandle> {
        Self::open_nsfs(reference.path())
    }

    fn set_current(&self, handle: &NetNsHandle) -> Result<()> {
        let fd = handle
            .fd()
            .ok_or_else(|| Error::switch(format!("handle {handle} has no descriptor")))?;

        setns(fd, CloneFlags::CLONE_NEWNET)
            .map_err(|e| Error::switch(format!("setns({handle}) failed: {e}")))?;

        debug!(netns = %handle, "Switched network namespace");
        Ok(())
    }

    fn find_interface(&self, name: &InterfaceName) -> Result<InterfaceRef> {
        match nix::net::if_::if_nametoindex(name.as_str()) {
            Ok(index) => Ok(InterfaceRef {
                name: name.clone(),
                index,
            }),
            Err(e) => Err(Error::Lookup {
                interface: name.to_string(),
                message: if e == Errno::ENODEV {
                    "no such device in the current network namespace".to_string()
                } else {
                    e.to_string()
                },
            }),
        }
    }

    fn move_interface(&self, interface: &InterfaceRef, target: &NetNsHandle) -> Result<()> {
        let relocation_error = |message: String| Error::Relocation {
            interface: interface.name.to_string(),
            message,
        };

        let fd = target
            .fd()
            .ok_or_else(|| relocation_error(format!("handle {target} has no descriptor")))?;

        let socket = RouteSocket::open()
            .map_err(|e| relocation_error(format!("failed to open rtnetlink socket: {e}")))?;

        let seq = self.seq.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        socket
            .set_link_netns(seq, interface.index, fd)
            .map_err(|e| relocation_error(format!("RTM_SETLINK to {target} failed: {e}")))?;

        debug!(
            interface = %interface.name,
            index = interface.index,
            netns = %target,
            "Reassigned interface namespace"
        );
        Ok(())
    }

    fn release(&self, handle: NetNsHandle) -> Result<()> {
        trace!(netns = %handle, "Releasing network namespace handle");
        drop(handle.into_fd());
        Ok(())
    }
}
