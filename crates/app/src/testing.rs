//! Fakes for the ports, shared by the controller tests.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use meross_bridge_domain::characteristic::{Characteristic, CharacteristicValue};
use meross_bridge_domain::device::DeviceInfo;
use meross_bridge_domain::error::{BridgeError, TransportError};
use meross_bridge_domain::protocol::{
    CommandPayload, Method, Namespace, ResponseEnvelope, ResponseHeader,
};

use crate::adaptive_lighting::AdaptiveLightingState;
use crate::config::DeviceSettings;
use crate::controller::DeviceController;
use crate::ports::{ContextStore, DeviceTransport, HubCharacteristics};

/// How the fake device answers.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Ack(Value),
    DeviceError,
    MissingHeader,
    Unreachable,
    Hang,
}

impl Reply {
    async fn into_response(
        self,
        method: Method,
        namespace: Namespace,
    ) -> Result<ResponseEnvelope, TransportError> {
        match self {
            Self::Ack(payload) => Ok(ResponseEnvelope::ack(method, namespace, payload)),
            Self::DeviceError => Ok(ResponseEnvelope::error(namespace, 5000, "rejected")),
            Self::MissingHeader => Ok(ResponseEnvelope {
                header: Some(ResponseHeader::default()),
                payload: Some(json!({})),
            }),
            Self::Unreachable => Err(TransportError::Unreachable("connection refused".into())),
            Self::Hang => std::future::pending().await,
        }
    }
}

pub(crate) struct FakeTransport {
    sent: Mutex<Vec<CommandPayload>>,
    queries: Mutex<Vec<Namespace>>,
    command_reply: Mutex<Reply>,
    status_reply: Mutex<Reply>,
    latency: Mutex<Duration>,
    status_latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            command_reply: Mutex::new(Reply::Ack(json!({}))),
            status_reply: Mutex::new(Reply::Unreachable),
            latency: Mutex::new(Duration::ZERO),
            status_latency: Mutex::new(Duration::ZERO),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl FakeTransport {
    pub(crate) fn reply_to_commands(&self, reply: Reply) {
        *self.command_reply.lock().unwrap() = reply;
    }

    pub(crate) fn reply_to_status(&self, reply: Reply) {
        *self.status_reply.lock().unwrap() = reply;
    }

    pub(crate) fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Delay status answers; the reply is read when the delay ends.
    pub(crate) fn set_status_latency(&self, latency: Duration) {
        *self.status_latency.lock().unwrap() = latency;
    }

    pub(crate) fn sent(&self) -> Vec<CommandPayload> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn queries(&self) -> Vec<Namespace> {
        self.queries.lock().unwrap().clone()
    }

    pub(crate) fn max_concurrent(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl DeviceTransport for FakeTransport {
    fn send_update(
        &self,
        _device: &DeviceInfo,
        command: CommandPayload,
    ) -> impl Future<Output = Result<ResponseEnvelope, TransportError>> + Send {
        let namespace = command.namespace;
        self.sent.lock().unwrap().push(command);
        let reply = self.command_reply.lock().unwrap().clone();
        let latency = *self.latency.lock().unwrap();
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        async move {
            tokio::time::sleep(latency).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            reply.into_response(Method::SetAck, namespace).await
        }
    }

    fn request_update(
        &self,
        _device: &DeviceInfo,
        namespace: Namespace,
    ) -> impl Future<Output = Result<ResponseEnvelope, TransportError>> + Send {
        self.queries.lock().unwrap().push(namespace);
        let latency = *self.status_latency.lock().unwrap();
        async move {
            tokio::time::sleep(latency).await;
            let reply = self.status_reply.lock().unwrap().clone();
            reply.into_response(Method::GetAck, namespace).await
        }
    }
}

/// Values accepted by [`FakeHub::set`].
pub(crate) trait HubInput {
    fn into_value(self) -> CharacteristicValue;
}

impl HubInput for bool {
    fn into_value(self) -> CharacteristicValue {
        CharacteristicValue::Bool(self)
    }
}

impl HubInput for i32 {
    fn into_value(self) -> CharacteristicValue {
        CharacteristicValue::Int(i64::from(self))
    }
}

#[derive(Default)]
pub(crate) struct FakeHub {
    values: Mutex<HashMap<Characteristic, CharacteristicValue>>,
    pushes: Mutex<Vec<(Characteristic, CharacteristicValue)>>,
}

impl FakeHub {
    /// Simulate a value set by the user on the hub side.
    pub(crate) fn set(&self, characteristic: Characteristic, value: impl HubInput) {
        self.values
            .lock()
            .unwrap()
            .insert(characteristic, value.into_value());
    }

    pub(crate) fn current(&self, characteristic: Characteristic) -> Option<CharacteristicValue> {
        self.values.lock().unwrap().get(&characteristic).copied()
    }

    pub(crate) fn pushes(&self) -> Vec<(Characteristic, CharacteristicValue)> {
        self.pushes.lock().unwrap().clone()
    }
}

impl HubCharacteristics for FakeHub {
    fn value(&self, characteristic: Characteristic) -> Option<CharacteristicValue> {
        self.current(characteristic)
    }

    fn push(
        &self,
        characteristic: Characteristic,
        value: CharacteristicValue,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send {
        self.values.lock().unwrap().insert(characteristic, value);
        self.pushes.lock().unwrap().push((characteristic, value));
        async { Ok(()) }
    }
}

#[derive(Default)]
pub(crate) struct FakeContext {
    persisted: Mutex<Vec<DeviceInfo>>,
}

impl FakeContext {
    pub(crate) fn persisted(&self) -> Vec<DeviceInfo> {
        self.persisted.lock().unwrap().clone()
    }
}

impl ContextStore for FakeContext {
    fn persist(&self, device: &DeviceInfo) -> impl Future<Output = Result<(), BridgeError>> + Send {
        self.persisted.lock().unwrap().push(device.clone());
        async { Ok(()) }
    }
}

pub(crate) type TestController = DeviceController<
    Arc<FakeTransport>,
    Arc<FakeHub>,
    Arc<FakeContext>,
    Arc<AdaptiveLightingState>,
>;

/// One controller wired to fakes.
pub(crate) struct Harness {
    pub(crate) device: DeviceInfo,
    pub(crate) transport: Arc<FakeTransport>,
    pub(crate) hub: Arc<FakeHub>,
    pub(crate) context: Arc<FakeContext>,
    pub(crate) adaptive_lighting: Arc<AdaptiveLightingState>,
}

impl Harness {
    pub(crate) fn new(model: &str) -> Self {
        Self::with_channel(model, 0)
    }

    pub(crate) fn with_channel(model: &str, channel: u8) -> Self {
        let device = DeviceInfo::builder()
            .id("1912aabbccdd0011")
            .name("Test Appliance")
            .model(model)
            .channel(channel)
            .build()
            .unwrap();
        Self {
            device,
            transport: Arc::default(),
            hub: Arc::default(),
            context: Arc::default(),
            adaptive_lighting: Arc::default(),
        }
    }

    /// Build the controller, seeding its cache from the current hub values.
    pub(crate) fn controller(&self) -> Arc<TestController> {
        Arc::new(DeviceController::new(
            self.device.clone(),
            DeviceSettings::default(),
            Arc::clone(&self.transport),
            Arc::clone(&self.hub),
            Arc::clone(&self.context),
            Some(Arc::clone(&self.adaptive_lighting)),
        ))
    }
}
