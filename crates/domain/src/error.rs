//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`BridgeError`]
//! via `#[from]`. Write handlers never leak these to the hub: they collapse
//! into [`HubStatusError`] after logging.

use std::time::Duration;

/// Base error for everything that can go wrong between the hub and a device.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Input rejected before anything was sent.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// The device answered, but not with a usable response.
    #[error("device protocol error")]
    Protocol(#[from] ProtocolError),

    /// The device could not be reached.
    #[error("device transport error")]
    Transport(#[from] TransportError),

    /// A queued command did not complete in time.
    #[error("device command timed out after {0:?}")]
    Timeout(Duration),

    /// Persisting the accessory context failed.
    #[error("context storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Publishing a characteristic update to the hub failed.
    #[error("hub error")]
    Hub(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Domain invariant violations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Device identifiers must not be blank.
    #[error("device id must not be empty")]
    EmptyDeviceId,

    /// Device names must not be blank.
    #[error("device name must not be empty")]
    EmptyName,

    /// The characteristic is not controllable on this model.
    #[error("{characteristic} is not supported by model {model}")]
    Unsupported {
        /// Characteristic name.
        characteristic: &'static str,
        /// Device model.
        model: String,
    },
}

/// A response that cannot be accepted as a successful device acknowledgement.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The response carried no header, or a header without a method.
    #[error("response is missing a well-formed header")]
    MissingHeader,

    /// The device answered with the `ERROR` method.
    #[error("device reported an error (code {code:?}): {detail}")]
    Device {
        /// Vendor error code, when present.
        code: Option<i64>,
        /// Vendor error detail, or the raw payload when no detail was given.
        detail: String,
    },

    /// The payload did not match the expected shape.
    #[error("malformed response payload")]
    MalformedPayload(#[source] serde_json::Error),

    /// A namespace string that this bridge does not know.
    #[error("unknown namespace {0}")]
    UnknownNamespace(String),
}

/// Connectivity failures reported by a transport adapter.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The host refused or never answered the connection.
    #[error("device unreachable")]
    Unreachable(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The request was sent but no response arrived in time.
    #[error("device request timed out")]
    TimedOut,

    /// The device has no known network address.
    #[error("device has no network address")]
    MissingAddress,

    /// The response could not be decoded.
    #[error("failed to decode device response")]
    Decode(#[source] serde_json::Error),

    /// Any other transport failure.
    #[error("transport failure")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    /// Whether this error means the device is (at least temporarily) offline.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::Unreachable(_) | Self::TimedOut | Self::MissingAddress
        )
    }
}

impl BridgeError {
    /// Whether this error means the device is (at least temporarily) offline.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_connectivity(),
            Self::Timeout(_) => true,
            _ => false,
        }
    }
}

/// HAP status code for "service communication failure".
pub const SERVICE_COMMUNICATION_FAILURE: i32 = -70402;

/// The only error a write handler surfaces to the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HubStatusError {
    /// The device did not confirm the write.
    #[error("service communication failure")]
    CommunicationFailure,
}

impl HubStatusError {
    /// Numeric status code understood by the hub.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::CommunicationFailure => SERVICE_COMMUNICATION_FAILURE,
        }
    }
}

impl From<BridgeError> for HubStatusError {
    fn from(_: BridgeError) -> Self {
        Self::CommunicationFailure
    }
}
