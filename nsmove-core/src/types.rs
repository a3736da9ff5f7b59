//! Core type definitions with strong typing and validation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{Error, Result};

/// Connection identifier with validation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(try_from = "String", into = "String")]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Maximum length for connection IDs
    pub const MAX_LENGTH: usize = 128;

    /// Create a new `ConnectionId` with validation
    ///
    /// # Errors
    /// Returns error if ID is empty, too long or contains whitespace
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    fn validate(id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::InvalidConfig {
                message: "Connection ID cannot be empty".to_string(),
            });
        }

        if id.len() > Self::MAX_LENGTH {
            return Err(Error::InvalidConfig {
                message: format!("Connection ID too long (max {} chars)", Self::MAX_LENGTH),
            });
        }

        if id.chars().any(char::is_whitespace) {
            return Err(Error::InvalidConfig {
                message: "Connection ID cannot contain whitespace".to_string(),
            });
        }

        Ok(())
    }

    /// Get the connection ID as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConnectionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ConnectionId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<ConnectionId> for String {
    fn from(id: ConnectionId) -> Self {
        id.0
    }
}

/// Kernel interface name, validated against the kernel's `IFNAMSIZ` limit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(try_from = "String", into = "String")]
pub struct InterfaceName(String);

impl InterfaceName {
    /// Longest name the kernel accepts (`IFNAMSIZ` minus the trailing NUL)
    pub const MAX_LENGTH: usize = 15;

    /// Create a new `InterfaceName`
    ///
    /// # Errors
    /// Returns [`Error::Acquisition`] if the name could never name a kernel interface
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();

        if name.is_empty() {
            return Err(Error::acquisition("interface name is empty"));
        }
        if name.len() > Self::MAX_LENGTH {
            return Err(Error::acquisition(format!(
                "interface name {name:?} exceeds {} bytes",
                Self::MAX_LENGTH
            )));
        }
        if name == "." || name == ".." || name.contains('/') || name.contains(':') {
            return Err(Error::acquisition(format!(
                "interface name {name:?} is not allowed"
            )));
        }
        if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(Error::acquisition(format!(
                "interface name {name:?} contains whitespace"
            )));
        }

        Ok(Self(name))
    }

    /// Get the name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InterfaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for InterfaceName {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<InterfaceName> for String {
    fn from(name: InterfaceName) -> Self {
        name.0
    }
}

/// Reference to an existing network namespace, resolved to a filesystem path
///
/// Accepted forms:
/// - absolute path: `/var/run/netns/client1`, `/proc/42/ns/net`
/// - `file://` URL: `file:///proc/42/ns/net`
/// - bare name: `client1`, resolved under the configured netns directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetNsRef(PathBuf);

impl NetNsRef {
    /// URL scheme accepted in front of a path
    pub const FILE_SCHEME: &'static str = "file://";

    /// Parse a namespace reference
    ///
    /// # Errors
    /// Returns [`Error::Acquisition`] for empty values, unknown URL schemes and
    /// relative paths
    pub fn parse(raw: &str, netns_dir: &Path) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::acquisition("network namespace reference is empty"));
        }

        let path = if let Some(rest) = raw.strip_prefix(Self::FILE_SCHEME) {
            if !rest.starts_with('/') {
                return Err(Error::acquisition(format!(
                    "file URL {raw:?} must carry an absolute path"
                )));
            }
            rest
        } else if let Some((scheme, _)) = raw.split_once("://") {
            return Err(Error::acquisition(format!(
                "unsupported network namespace URL scheme {scheme:?} in {raw:?}"
            )));
        } else {
            raw
        };

        if path.starts_with('/') {
            return Ok(Self(PathBuf::from(path)));
        }

        if !path.is_empty() && !path.contains('/') && path != "." && path != ".." {
            return Ok(Self(netns_dir.join(path)));
        }

        Err(Error::acquisition(format!(
            "network namespace reference {raw:?} must be an absolute path or a name"
        )))
    }

    /// Build a reference from an already absolute path
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Filesystem path of the namespace file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for NetNsRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Kernel mechanism parameters carried by a connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelMechanism {
    /// Raw parameter map
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl KernelMechanism {
    /// Parameter holding the target namespace reference
    pub const NETNS_URL: &'static str = "netnsURL";
    /// Parameter holding the interface name
    pub const INTERFACE_NAME: &'static str = "name";

    /// Create an empty mechanism
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target namespace reference
    #[must_use]
    pub fn with_netns_url(mut self, url: impl Into<String>) -> Self {
        self.parameters.insert(Self::NETNS_URL.to_string(), url.into());
        self
    }

    /// Set the interface name
    #[must_use]
    pub fn with_interface_name(mut self, name: impl Into<String>) -> Self {
        self.parameters
            .insert(Self::INTERFACE_NAME.to_string(), name.into());
        self
    }

    /// Raw target namespace reference, if present and non-empty
    #[must_use]
    pub fn netns_url(&self) -> Option<&str> {
        self.non_empty(Self::NETNS_URL)
    }

    /// Raw interface name, if present and non-empty
    #[must_use]
    pub fn interface_name(&self) -> Option<&str> {
        self.non_empty(Self::INTERFACE_NAME)
    }

    fn non_empty(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

/// A logical network connection as seen by the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Connection ID
    pub id: ConnectionId,

    /// Kernel mechanism parameters
    #[serde(default)]
    pub mechanism: KernelMechanism,
}

impl Connection {
    /// Create a connection with empty mechanism parameters
    #[must_use]
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            mechanism: KernelMechanism::new(),
        }
    }

    /// Replace the mechanism parameters
    #[must_use]
    pub fn with_mechanism(mut self, mechanism: KernelMechanism) -> Self {
        self.mechanism = mechanism;
        self
    }

    /// Validated interface name from the mechanism parameters
    ///
    /// # Errors
    /// Returns [`Error::Acquisition`] if the parameter is missing or invalid
    pub fn interface_name(&self) -> Result<InterfaceName> {
        let raw = self.mechanism.interface_name().ok_or_else(|| {
            Error::acquisition(format!(
                "connection {} has no {:?} mechanism parameter",
                self.id,
                KernelMechanism::INTERFACE_NAME
            ))
        })?;
        InterfaceName::new(raw)
    }

    /// Target namespace reference from the mechanism parameters
    ///
    /// # Errors
    /// Returns [`Error::Acquisition`] if the parameter is missing or unparsable
    pub fn netns_ref(&self, netns_dir: &Path) -> Result<NetNsRef> {
        let raw = self.mechanism.netns_url().ok_or_else(|| {
            Error::acquisition(format!(
                "connection {} has no {:?} mechanism parameter",
                self.id,
                KernelMechanism::NETNS_URL
            ))
        })?;
        NetNsRef::parse(raw, netns_dir)
    }
}
