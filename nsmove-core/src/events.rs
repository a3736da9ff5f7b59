//! Relocation events with structured tracing

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::ConnectionId;

/// Direction of an interface move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Home namespace to the connection's namespace
    ToTarget,
    /// Connection's namespace back to home
    ToHome,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToTarget => f.write_str("to-target"),
            Self::ToHome => f.write_str("to-home"),
        }
    }
}

/// Events emitted while relocating interfaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelocationEvent {
    /// Interface moved
    Moved {
        /// Connection ID
        id: ConnectionId,
        /// Interface name
        interface: String,
        /// Move direction
        direction: Direction,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// Interface moved back after the next element failed
    Compensated {
        /// Connection ID
        id: ConnectionId,
        /// Interface name
        interface: String,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// Moving the interface back after a downstream failure did not succeed
    CompensationFailed {
        /// Connection ID
        id: ConnectionId,
        /// Interface name
        interface: String,
        /// Why the move back failed
        message: String,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// The netns worker was torn down after a failed restore
    WorkerPoisoned {
        /// Error message
        message: String,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },
}

impl RelocationEvent {
    /// Get the connection ID, if the event concerns one connection
    #[must_use]
    pub const fn connection_id(&self) -> Option<&ConnectionId> {
        match self {
            Self::Moved { id, .. }
            | Self::Compensated { id, .. }
            | Self::CompensationFailed { id, .. } => Some(id),
            Self::WorkerPoisoned { .. } => None,
        }
    }

    /// Get the timestamp from any event
    #[must_use]
    pub const fn timestamp(&self) -> SystemTime {
        match self {
            Self::Moved { timestamp, .. }
            | Self::Compensated { timestamp, .. }
            | Self::CompensationFailed { timestamp, .. }
            | Self::WorkerPoisoned { timestamp, .. } => *timestamp,
        }
    }

    /// Check if this is a critical event
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::CompensationFailed { .. } | Self::WorkerPoisoned { .. }
        )
    }

    /// Emit structured tracing event
    pub fn emit_trace(&self) {
        match self {
            Self::Moved {
                id,
                interface,
                direction,
                ..
            } => {
                tracing::info!(
                    connection = %id,
                    interface = %interface,
                    direction = %direction,
                    event = "moved",
                    "Moved network interface"
                );
            }
            Self::Compensated { id, interface, .. } => {
                tracing::info!(
                    connection = %id,
                    interface = %interface,
                    event = "compensated",
                    "Moved network interface back to home namespace"
                );
            }
            Self::CompensationFailed {
                id,
                interface,
                message,
                ..
            } => {
                tracing::warn!(
                    connection = %id,
                    interface = %interface,
                    message = %message,
                    event = "compensation_failed",
                    "Failed to move network interface back to home namespace"
                );
            }
            Self::WorkerPoisoned { message, .. } => {
                tracing::error!(
                    message = %message,
                    event = "worker_poisoned",
                    "Namespace worker torn down"
                );
            }
        }
    }
}

impl fmt::Display for RelocationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Moved {
                id,
                interface,
                direction,
                ..
            } => write!(f, "Connection {id}: moved {interface} {direction}"),
            Self::Compensated { id, interface, .. } => {
                write!(f, "Connection {id}: moved {interface} back to home")
            }
            Self::CompensationFailed {
                id,
                interface,
                message,
                ..
            } => write!(
                f,
                "Connection {id}: failed to move {interface} back to home: {message}"
            ),
            Self::WorkerPoisoned { message, .. } => {
                write!(f, "Namespace worker torn down: {message}")
            }
        }
    }
}

/// Receives relocation events
///
/// The relocation element reports compensation outcomes here instead of
/// returning them.
pub trait EventSink: Send + Sync {
    /// Record one event
    fn record(&self, event: RelocationEvent);
}

/// Sink that only emits tracing events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: RelocationEvent) {
        event.emit_trace();
    }
}

/// Current time, for building events
#[must_use]
pub fn now() -> SystemTime {
    SystemTime::now()
}

// Custom SystemTime serialization
mod systemtime_serde {
    use super::UNIX_EPOCH;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::SystemTime;

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let since_epoch = time
            .duration_since(UNIX_EPOCH)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_u64(since_epoch.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + std::time::Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_connection_id() {
        let id = ConnectionId::new("conn-1").unwrap();
        let event = RelocationEvent::Moved {
            id: id.clone(),
            interface: "veth0".to_string(),
            direction: Direction::ToTarget,
            timestamp: now(),
        };

        assert_eq!(event.connection_id(), Some(&id));
        assert!(!event.is_critical());
    }

    #[test]
    fn test_event_critical() {
        let event = RelocationEvent::CompensationFailed {
            id: ConnectionId::new("conn-1").unwrap(),
            interface: "veth0".to_string(),
            message: "EBUSY".to_string(),
            timestamp: now(),
        };
        assert!(event.is_critical());

        let event = RelocationEvent::WorkerPoisoned {
            message: "setns failed".to_string(),
            timestamp: now(),
        };
        assert!(event.is_critical());
        assert!(event.connection_id().is_none());
    }

    #[test]
    fn test_event_serde() {
        let event = RelocationEvent::Compensated {
            id: ConnectionId::new("conn-1").unwrap(),
            interface: "veth0".to_string(),
            timestamp: now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"compensated""#));

        let deserialized: RelocationEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.connection_id(), deserialized.connection_id());
    }
}
