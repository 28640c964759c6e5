//! Per-device transport selection.

use std::future::Future;

use meross_bridge_adapter_http::LocalHttpTransport;
use meross_bridge_adapter_mqtt::MqttTransport;
use meross_bridge_adapter_virtual::SimulatedTransport;
use meross_bridge_app::ports::DeviceTransport;
use meross_bridge_domain::device::DeviceInfo;
use meross_bridge_domain::error::TransportError;
use meross_bridge_domain::protocol::{CommandPayload, Namespace, ResponseEnvelope};

/// The transport chosen for one device by its `connection` setting.
#[derive(Debug, Clone)]
pub enum AnyTransport {
    Local(LocalHttpTransport),
    Cloud(MqttTransport),
    Simulated(SimulatedTransport),
}

impl DeviceTransport for AnyTransport {
    fn send_update(
        &self,
        device: &DeviceInfo,
        command: CommandPayload,
    ) -> impl Future<Output = Result<ResponseEnvelope, TransportError>> + Send {
        async move {
            match self {
                Self::Local(transport) => transport.send_update(device, command).await,
                Self::Cloud(transport) => transport.send_update(device, command).await,
                Self::Simulated(transport) => transport.send_update(device, command).await,
            }
        }
    }

    fn request_update(
        &self,
        device: &DeviceInfo,
        namespace: Namespace,
    ) -> impl Future<Output = Result<ResponseEnvelope, TransportError>> + Send {
        async move {
            match self {
                Self::Local(transport) => transport.request_update(device, namespace).await,
                Self::Cloud(transport) => transport.request_update(device, namespace).await,
                Self::Simulated(transport) => transport.request_update(device, namespace).await,
            }
        }
    }
}
