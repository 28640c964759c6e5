//! Vendor protocol envelopes and namespaces.
//!
//! Every exchange is a JSON object `{header, payload}`. Requests are signed
//! with `md5(messageId + key + timestamp)`. Devices acknowledge with
//! `GETACK`/`SETACK` and report failures with the `ERROR` method.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::id::MessageId;

/// Protocol command category. The string forms must match the device exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "&'static str", try_from = "String")]
pub enum Namespace {
    ToggleX,
    Light,
    Spray,
    SystemAll,
    SystemOnline,
}

impl Namespace {
    /// Wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ToggleX => "Appliance.Control.ToggleX",
            Self::Light => "Appliance.Control.Light",
            Self::Spray => "Appliance.Control.Spray",
            Self::SystemAll => "Appliance.System.All",
            Self::SystemOnline => "Appliance.System.Online",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Namespace> for &'static str {
    fn from(namespace: Namespace) -> Self {
        namespace.as_str()
    }
}

impl FromStr for Namespace {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::ToggleX,
            Self::Light,
            Self::Spray,
            Self::SystemAll,
            Self::SystemOnline,
        ]
        .into_iter()
        .find(|ns| ns.as_str() == s)
        .ok_or_else(|| ProtocolError::UnknownNamespace(s.to_string()))
    }
}

impl TryFrom<String> for Namespace {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Request/response method carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Set,
    GetAck,
    SetAck,
    Push,
    Error,
}

/// Method string devices use to signal a failed request.
pub const ERROR_METHOD: &str = "ERROR";

/// A control command ready to be sent: namespace, body, target channel.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandPayload {
    pub namespace: Namespace,
    pub payload: Value,
    pub channel: u8,
}

/// Header of an outbound, signed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestHeader {
    pub from: String,
    pub message_id: String,
    pub method: Method,
    pub namespace: Namespace,
    pub payload_version: u8,
    pub sign: String,
    pub timestamp: i64,
}

/// A complete signed request `{header, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub header: RequestHeader,
    pub payload: Value,
}

impl RequestEnvelope {
    /// Build and sign a request.
    ///
    /// `from` is the topic or address replies should be sent to; `key` is the
    /// shared device key (may be empty for devices paired without one).
    #[must_use]
    pub fn signed(
        method: Method,
        namespace: Namespace,
        payload: Value,
        from: impl Into<String>,
        key: &str,
        timestamp: i64,
    ) -> Self {
        let message_id = MessageId::new().to_string();
        let sign = sign(&message_id, key, timestamp);
        Self {
            header: RequestHeader {
                from: from.into(),
                message_id,
                method,
                namespace,
                payload_version: 1,
                sign,
                timestamp,
            },
            payload,
        }
    }

    /// Shorthand for a `GET` status query with an empty payload.
    #[must_use]
    pub fn query(namespace: Namespace, from: impl Into<String>, key: &str, timestamp: i64) -> Self {
        Self::signed(
            Method::Get,
            namespace,
            Value::Object(serde_json::Map::new()),
            from,
            key,
            timestamp,
        )
    }

    /// Shorthand for a `SET` control command.
    #[must_use]
    pub fn command(
        command: CommandPayload,
        from: impl Into<String>,
        key: &str,
        timestamp: i64,
    ) -> Self {
        Self::signed(
            Method::Set,
            command.namespace,
            command.payload,
            from,
            key,
            timestamp,
        )
    }
}

/// Request signature: lowercase hex `md5(messageId + key + timestamp)`.
#[must_use]
pub fn sign(message_id: &str, key: &str, timestamp: i64) -> String {
    format!("{:x}", md5::compute(format!("{message_id}{key}{timestamp}")))
}

/// Header of a device response. Every field is optional so that malformed
/// responses still deserialize and can be rejected by [`ResponseEnvelope::into_payload`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseHeader {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
}

/// A device response `{header, payload}` as returned by a transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub header: Option<ResponseHeader>,
    #[serde(default)]
    pub payload: Option<Value>,
}

impl ResponseEnvelope {
    /// Build a well-formed acknowledgement.
    #[must_use]
    pub fn ack(method: Method, namespace: Namespace, payload: Value) -> Self {
        Self {
            header: Some(ResponseHeader {
                method: Some(method_str(method).to_string()),
                namespace: Some(namespace.as_str().to_string()),
                ..ResponseHeader::default()
            }),
            payload: Some(payload),
        }
    }

    /// Build an `ERROR` response carrying a vendor error.
    #[must_use]
    pub fn error(namespace: Namespace, code: i64, detail: &str) -> Self {
        Self {
            header: Some(ResponseHeader {
                method: Some(ERROR_METHOD.to_string()),
                namespace: Some(namespace.as_str().to_string()),
                ..ResponseHeader::default()
            }),
            payload: Some(serde_json::json!({ "error": { "code": code, "detail": detail } })),
        }
    }

    /// Message id echoed back by the device, if any.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.header.as_ref()?.message_id.as_deref()
    }

    /// Validate the response and return its payload.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::MissingHeader`] when the header or its method is absent.
    /// - [`ProtocolError::Device`] when the method is the `ERROR` marker; the
    ///   embedded `error.code`/`error.detail` are carried along.
    pub fn into_payload(self) -> Result<Value, ProtocolError> {
        let method = self
            .header
            .and_then(|header| header.method)
            .ok_or(ProtocolError::MissingHeader)?;
        let payload = self.payload.unwrap_or(Value::Null);
        if method == ERROR_METHOD {
            return Err(device_error(&payload));
        }
        Ok(payload)
    }
}

fn method_str(method: Method) -> &'static str {
    match method {
        Method::Get => "GET",
        Method::Set => "SET",
        Method::GetAck => "GETACK",
        Method::SetAck => "SETACK",
        Method::Push => "PUSH",
        Method::Error => ERROR_METHOD,
    }
}

fn device_error(payload: &Value) -> ProtocolError {
    let error = payload.get("error").unwrap_or(payload);
    ProtocolError::Device {
        code: error.get("code").and_then(Value::as_i64),
        detail: error
            .get("detail")
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), str::to_string),
    }
}

/// An asynchronous state push received from a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    #[serde(default)]
    pub header: ResponseHeader,
    #[serde(default)]
    pub payload: Value,
}

impl PushMessage {
    /// Build a push carrying the given digest-shaped payload.
    #[must_use]
    pub fn new(namespace: Namespace, payload: Value) -> Self {
        Self {
            header: ResponseHeader {
                method: Some(method_str(Method::Push).to_string()),
                namespace: Some(namespace.as_str().to_string()),
                ..ResponseHeader::default()
            },
            payload,
        }
    }
}
