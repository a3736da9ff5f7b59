//! Read-only inspection of network namespaces

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use nsmove_core::{Error, Result};

use crate::provider::NetNsId;

/// Network namespace of one process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessNetNs {
    /// Process ID
    pub pid: u32,
    /// Link text of `/proc/<pid>/ns/net`, e.g. `net:[4026531840]`
    pub link: String,
    /// Namespace identity
    pub id: NetNsId,
}

impl ProcessNetNs {
    /// Read the network namespace of a process
    ///
    /// # Errors
    /// Returns error if `/proc/<pid>/ns/net` cannot be read
    pub fn for_pid(pid: u32) -> Result<Self> {
        let path = PathBuf::from(format!("/proc/{pid}/ns/net"));

        let read_error = |e: std::io::Error| {
            Error::acquisition(format!("Failed to read {}: {e}", path.display()))
        };

        let link = fs::read_link(&path)
            .map(|p| p.to_string_lossy().into_owned())
            .map_err(read_error)?;
        let metadata = fs::metadata(&path).map_err(read_error)?;

        Ok(Self {
            pid,
            link,
            id: NetNsId::from_metadata(&metadata),
        })
    }

    /// Network namespace of the calling process
    ///
    /// # Errors
    /// Returns error if `/proc/self/ns/net` cannot be read
    pub fn current() -> Result<Self> {
        Self::for_pid(std::process::id())
    }
}

impl std::fmt::Display for ProcessNetNs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PID {}: {}", self.pid, self.link)
    }
}

/// A named namespace, as created by `ip netns add`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedNetNs {
    /// File name under the netns directory
    pub name: String,
    /// Full path
    pub path: PathBuf,
    /// Identity, if the file could be stat'ed
    pub id: Option<NetNsId>,
}

/// List the named namespaces in a directory, sorted by name
///
/// A missing directory means there are no named namespaces.
///
/// # Errors
/// Returns error if the directory exists but cannot be read
pub fn list_named(dir: &Path) -> Result<Vec<NamedNetNs>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(dir = %dir.display(), "No named namespace directory");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut named = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let id = fs::metadata(&path)
            .ok()
            .map(|metadata| NetNsId::from_metadata(&metadata));

        named.push(NamedNetNs {
            name: entry.file_name().to_string_lossy().into_owned(),
            path,
            id,
        });
    }

    named.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(named)
}
