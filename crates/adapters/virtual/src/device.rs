//! One simulated appliance: in-memory state that answers envelopes the way
//! real hardware does.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use meross_bridge_domain::command::{
    CAPACITY_LUMINANCE, CAPACITY_RGB, CAPACITY_TEMPERATURE, SprayMode,
};
use meross_bridge_domain::device::{DeviceKind, ModelCapabilities};
use meross_bridge_domain::digest::{LightState, SprayState, StatusDigest, ToggleState};
use meross_bridge_domain::error::TransportError;
use meross_bridge_domain::id::DeviceId;
use meross_bridge_domain::protocol::{
    CommandPayload, Method, Namespace, PushMessage, ResponseEnvelope,
};

use crate::SimulationError;

/// Vendor error code for a namespace the device does not implement.
const UNSUPPORTED_NAMESPACE: i64 = 5000;
/// Vendor error code for a payload the device cannot read.
const MALFORMED_PAYLOAD: i64 = 5001;

const ONLINE: u8 = 1;
const OFFLINE: u8 = 2;

/// Injected misbehaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Answer every request with an `ERROR` envelope carrying `code`.
    Reject { code: i64 },
    /// Refuse every connection.
    Unreachable,
    /// Accept requests and never answer.
    Hang,
}

#[derive(Debug, Clone)]
struct DeviceState {
    power: BTreeMap<u8, bool>,
    light: LightState,
    spray: BTreeMap<u8, u8>,
    online: bool,
    ip_address: String,
    mac_address: String,
    hardware_version: String,
    firmware_version: String,
}

impl DeviceState {
    fn apply_light(&mut self, update: LightState) {
        let light = &mut self.light;
        if let Some(rgb) = update.rgb {
            light.rgb = Some(rgb);
        }
        if let Some(temperature) = update.temperature {
            light.temperature = Some(temperature);
        }
        if let Some(luminance) = update.luminance {
            light.luminance = Some(luminance);
        }
        let mode = update.capacity.unwrap_or(0) & (CAPACITY_RGB | CAPACITY_TEMPERATURE);
        if mode != 0 {
            light.capacity = Some(mode | CAPACITY_LUMINANCE);
        }
    }
}

/// A simulated device.
#[derive(Debug)]
pub struct SimulatedDevice {
    id: DeviceId,
    capabilities: ModelCapabilities,
    state: Mutex<DeviceState>,
    fault: Mutex<Option<Fault>>,
    latency: Mutex<Duration>,
    received: Mutex<Vec<CommandPayload>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimulatedDevice {
    /// A powered-off device of `model`, online, lit white at full luminance.
    #[must_use]
    pub fn new(id: DeviceId, model: &str) -> Self {
        let state = DeviceState {
            power: BTreeMap::from([(0, false)]),
            light: LightState {
                channel: 0,
                capacity: Some(CAPACITY_TEMPERATURE | CAPACITY_LUMINANCE),
                rgb: Some(0x00FF_FFFF),
                temperature: Some(50),
                luminance: Some(100),
            },
            spray: BTreeMap::from([(0, u8::from(SprayMode::Off))]),
            online: true,
            ip_address: "127.0.0.1".to_string(),
            mac_address: "48:e1:e9:00:00:00".to_string(),
            hardware_version: "2.0.0".to_string(),
            firmware_version: "2.1.2".to_string(),
        };
        Self {
            id,
            capabilities: ModelCapabilities::for_model(model),
            state: Mutex::new(state),
            fault: Mutex::new(None),
            latency: Mutex::new(Duration::ZERO),
            received: Mutex::new(Vec::new()),
        }
    }

    /// Report `ip_address` as the device's LAN address.
    #[must_use]
    pub fn with_address(self, ip_address: impl Into<String>) -> Self {
        lock(&self.state).ip_address = ip_address.into();
        self
    }

    #[must_use]
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn set_fault(&self, fault: Option<Fault>) {
        *lock(&self.fault) = fault;
    }

    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    pub fn set_online(&self, online: bool) {
        lock(&self.state).online = online;
    }

    #[must_use]
    pub fn power(&self, channel: u8) -> bool {
        lock(&self.state).power.get(&channel).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn light(&self) -> LightState {
        lock(&self.state).light
    }

    #[must_use]
    pub fn spray_mode(&self, channel: u8) -> u8 {
        lock(&self.state).spray.get(&channel).copied().unwrap_or(0)
    }

    /// Every control command accepted so far, oldest first.
    #[must_use]
    pub fn received(&self) -> Vec<CommandPayload> {
        lock(&self.received).clone()
    }

    /// Someone flipped the physical switch.
    pub fn external_toggle(&self, channel: u8, on: bool) -> PushMessage {
        lock(&self.state).power.insert(channel, on);
        PushMessage::new(
            Namespace::ToggleX,
            json!({ "togglex": [{ "channel": channel, "onoff": u8::from(on) }] }),
        )
    }

    /// The light was changed from another controller.
    pub fn external_light(&self, update: LightState) -> PushMessage {
        let light = {
            let mut state = lock(&self.state);
            state.apply_light(update);
            state.light
        };
        PushMessage::new(Namespace::Light, json!({ "light": light }))
    }

    /// The spray mode was changed on the device itself.
    pub fn external_spray(&self, channel: u8, mode: SprayMode) -> PushMessage {
        lock(&self.state).spray.insert(channel, u8::from(mode));
        PushMessage::new(
            Namespace::Spray,
            json!({ "spray": [{ "channel": channel, "mode": u8::from(mode) }] }),
        )
    }

    /// Run one exchange: apply latency, then the injected fault, then `answer`.
    pub(crate) fn exchange(
        &self,
        namespace: Namespace,
        answer: impl FnOnce(&Self) -> ResponseEnvelope + Send,
    ) -> impl Future<Output = Result<ResponseEnvelope, TransportError>> + Send {
        let latency = *lock(&self.latency);
        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let fault = *lock(&self.fault);
            match fault {
                Some(Fault::Unreachable) => {
                    Err(SimulationError::Unreachable(self.id.to_string()).into())
                }
                Some(Fault::Hang) => std::future::pending().await,
                Some(Fault::Reject { code }) => Ok(ResponseEnvelope::error(
                    namespace,
                    code,
                    "simulated failure",
                )),
                None => Ok(answer(self)),
            }
        }
    }

    /// Answer a `SET` control command.
    pub(crate) fn handle_set(&self, command: &CommandPayload) -> ResponseEnvelope {
        let namespace = command.namespace;
        let applied = {
            let mut state = lock(&self.state);
            match namespace {
                Namespace::ToggleX => match field::<ToggleState>(&command.payload, "togglex") {
                    Some(toggle) => {
                        state.power.insert(toggle.channel, toggle.onoff != 0);
                        true
                    }
                    None => false,
                },
                Namespace::Light => match field::<LightState>(&command.payload, "light") {
                    Some(light) => {
                        state.apply_light(light);
                        true
                    }
                    None => false,
                },
                Namespace::Spray => match field::<SprayState>(&command.payload, "spray") {
                    Some(spray) => {
                        state.spray.insert(spray.channel, spray.mode);
                        true
                    }
                    None => false,
                },
                Namespace::SystemAll | Namespace::SystemOnline => {
                    return ResponseEnvelope::error(
                        namespace,
                        UNSUPPORTED_NAMESPACE,
                        "namespace is read-only",
                    );
                }
            }
        };
        if !applied {
            return ResponseEnvelope::error(namespace, MALFORMED_PAYLOAD, "malformed payload");
        }
        lock(&self.received).push(command.clone());
        tracing::debug!(device = %self.id, %namespace, "simulated device applied command");
        ResponseEnvelope::ack(Method::SetAck, namespace, json!({}))
    }

    /// Answer a `GET` status query.
    pub(crate) fn handle_get(&self, namespace: Namespace) -> ResponseEnvelope {
        let state = lock(&self.state).clone();
        let status = if state.online { ONLINE } else { OFFLINE };
        let online = json!({ "status": status });
        match namespace {
            Namespace::SystemOnline => {
                ResponseEnvelope::ack(Method::GetAck, namespace, json!({ "online": online }))
            }
            Namespace::SystemAll => {
                let digest = self.digest(&state);
                ResponseEnvelope::ack(
                    Method::GetAck,
                    namespace,
                    json!({
                        "all": {
                            "system": {
                                "hardware": {
                                    "macAddress": state.mac_address,
                                    "version": state.hardware_version,
                                },
                                "firmware": {
                                    "version": state.firmware_version,
                                    "innerIp": state.ip_address,
                                },
                                "online": online,
                            },
                            "digest": serde_json::to_value(digest).unwrap_or_default(),
                        }
                    }),
                )
            }
            other => ResponseEnvelope::error(other, UNSUPPORTED_NAMESPACE, "not a status query"),
        }
    }

    fn digest(&self, state: &DeviceState) -> StatusDigest {
        let togglex = state
            .power
            .iter()
            .map(|(&channel, &on)| ToggleState {
                channel,
                onoff: u8::from(on),
            })
            .collect();
        match self.capabilities.kind {
            DeviceKind::Humidifier => StatusDigest {
                togglex,
                light: None,
                spray: state
                    .spray
                    .iter()
                    .map(|(&channel, &mode)| SprayState { channel, mode })
                    .collect(),
            },
            DeviceKind::Light => StatusDigest {
                togglex,
                light: self.capabilities.brightness.then_some(state.light),
                spray: Vec::new(),
            },
        }
    }
}

/// Deserialize `payload[key]`, or `None` when absent or malformed.
fn field<T: DeserializeOwned>(payload: &Value, key: &str) -> Option<T> {
    payload
        .get(key)
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
}
