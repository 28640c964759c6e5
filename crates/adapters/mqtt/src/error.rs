//! MQTT adapter error types.

use meross_bridge_domain::error::TransportError;

/// Errors specific to the MQTT relay transport.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The event loop stopped before the reply arrived.
    #[error("MQTT client not connected")]
    NotConnected,

    /// The rumqttc client returned an error.
    #[error("MQTT client error")]
    Client(#[source] rumqttc::ClientError),

    /// No reply with the request's message id arrived in time.
    #[error("no reply from device")]
    ResponseTimeout,

    /// Failed to encode an outbound request.
    #[error("failed to encode MQTT request")]
    Encode(#[source] serde_json::Error),

    /// Failed to parse an incoming MQTT payload as JSON.
    #[error("failed to parse MQTT payload")]
    PayloadParse(#[source] serde_json::Error),
}

impl From<MqttError> for TransportError {
    fn from(err: MqttError) -> Self {
        match err {
            MqttError::ResponseTimeout => Self::TimedOut,
            MqttError::NotConnected | MqttError::Client(_) => Self::Unreachable(Box::new(err)),
            MqttError::PayloadParse(inner) => Self::Decode(inner),
            MqttError::Encode(_) => Self::Other(Box::new(err)),
        }
    }
}
