//! Transport port: how requests reach a device and responses come back.
//!
//! Implementations own the wire format (signed envelopes over HTTP or MQTT,
//! or an in-memory simulation). The core only sees namespaces, payloads and
//! [`ResponseEnvelope`]s; validating a response is the core's job.

use std::future::Future;

use meross_bridge_domain::device::DeviceInfo;
use meross_bridge_domain::error::TransportError;
use meross_bridge_domain::protocol::{CommandPayload, Namespace, ResponseEnvelope};

/// Sends control commands and status queries to a device.
pub trait DeviceTransport: Send + Sync {
    /// Send a `SET` control command.
    fn send_update(
        &self,
        device: &DeviceInfo,
        command: CommandPayload,
    ) -> impl Future<Output = Result<ResponseEnvelope, TransportError>> + Send;

    /// Send a `GET` status query on `namespace`.
    fn request_update(
        &self,
        device: &DeviceInfo,
        namespace: Namespace,
    ) -> impl Future<Output = Result<ResponseEnvelope, TransportError>> + Send;
}

impl<T: DeviceTransport> DeviceTransport for std::sync::Arc<T> {
    fn send_update(
        &self,
        device: &DeviceInfo,
        command: CommandPayload,
    ) -> impl Future<Output = Result<ResponseEnvelope, TransportError>> + Send {
        (**self).send_update(device, command)
    }

    fn request_update(
        &self,
        device: &DeviceInfo,
        namespace: Namespace,
    ) -> impl Future<Output = Result<ResponseEnvelope, TransportError>> + Send {
        (**self).request_update(device, namespace)
    }
}
