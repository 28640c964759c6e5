//! # meross-bridge-adapter-mqtt
//!
//! Cloud-relay transport. Requests are published to
//! `/appliance/{device}/subscribe`; devices answer on this client's reply
//! topic and publish unsolicited state on `/appliance/{device}/publish`.
//!
//! [`MqttTransport`] implements the
//! [`DeviceTransport`] port. The paired [`MqttEventLoop`] must be driven
//! with [`MqttEventLoop::run`] for replies and pushes to arrive.
//!
//! ## Dependency rule
//! Same as other adapters: depends on `meross-bridge-app` and `meross-bridge-domain`.

mod config;
mod error;

pub use config::MqttConfig;
pub use error::MqttError;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use tokio::sync::{mpsc, oneshot};

use meross_bridge_app::ports::DeviceTransport;
use meross_bridge_domain::device::DeviceInfo;
use meross_bridge_domain::error::TransportError;
use meross_bridge_domain::id::DeviceId;
use meross_bridge_domain::protocol::{
    CommandPayload, Namespace, PushMessage, RequestEnvelope, ResponseEnvelope,
};
use meross_bridge_domain::time::unix_seconds;

const PUSH_TOPIC_FILTER: &str = "/appliance/+/publish";
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// A state push received from a device over the relay.
#[derive(Debug, Clone, PartialEq)]
pub struct DevicePush {
    pub device_id: DeviceId,
    pub message: PushMessage,
}

type PendingReplies = HashMap<String, oneshot::Sender<ResponseEnvelope>>;

struct Shared {
    client: AsyncClient,
    key: String,
    reply_topic: String,
    response_timeout: Duration,
    pending: Mutex<PendingReplies>,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, PendingReplies> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// [`DeviceTransport`] relaying requests through an MQTT broker.
#[derive(Clone)]
pub struct MqttTransport {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for MqttTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTransport")
            .field("reply_topic", &self.shared.reply_topic)
            .finish_non_exhaustive()
    }
}

/// Drives the MQTT connection: routes replies and forwards pushes.
pub struct MqttEventLoop {
    eventloop: EventLoop,
    shared: Arc<Shared>,
}

/// Where an incoming publish should go.
#[derive(Debug, PartialEq)]
enum Routed {
    Reply(ResponseEnvelope),
    Push(DevicePush),
    Ignored,
}

impl MqttTransport {
    /// Create the client and its event loop. No network activity happens
    /// until the event loop is run.
    #[must_use]
    pub fn new(config: &MqttConfig) -> (Self, MqttEventLoop) {
        let mut options = MqttOptions::new(
            config.client_id(),
            config.broker_host.clone(),
            config.broker_port,
        );
        options.set_keep_alive(config.keep_alive());
        let (username, password) = config.credentials();
        options.set_credentials(username, password);

        let (client, eventloop) = AsyncClient::new(options, 16);
        let shared = Arc::new(Shared {
            client,
            key: config.key.clone(),
            reply_topic: config.reply_topic(),
            response_timeout: config.response_timeout(),
            pending: Mutex::new(HashMap::new()),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MqttEventLoop { eventloop, shared },
        )
    }

    async fn request(
        &self,
        device: &DeviceInfo,
        request: RequestEnvelope,
    ) -> Result<ResponseEnvelope, MqttError> {
        let message_id = request.header.message_id.clone();
        let body = serde_json::to_vec(&request).map_err(MqttError::Encode)?;

        let (tx, rx) = oneshot::channel();
        self.shared.pending().insert(message_id.clone(), tx);
        let _guard = PendingReply {
            shared: &self.shared,
            message_id: &message_id,
        };

        tracing::trace!(
            device = %device.id,
            namespace = %request.header.namespace,
            message_id = %message_id,
            "publishing request"
        );
        self.shared
            .client
            .publish(device_topic(&device.id), QoS::AtMostOnce, false, body)
            .await
            .map_err(MqttError::Client)?;

        match tokio::time::timeout(self.shared.response_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(MqttError::NotConnected),
            Err(_) => Err(MqttError::ResponseTimeout),
        }
    }

    fn envelope_for(&self, build: impl FnOnce(&str, &str) -> RequestEnvelope) -> RequestEnvelope {
        build(&self.shared.reply_topic, &self.shared.key)
    }

    #[cfg(test)]
    fn pending_ids(&self) -> Vec<String> {
        self.shared.pending().keys().cloned().collect()
    }
}

/// Removes a pending reply slot when the request finishes or is dropped.
struct PendingReply<'a> {
    shared: &'a Shared,
    message_id: &'a str,
}

impl Drop for PendingReply<'_> {
    fn drop(&mut self) {
        self.shared.pending().remove(self.message_id);
    }
}

impl DeviceTransport for MqttTransport {
    fn send_update(
        &self,
        device: &DeviceInfo,
        command: CommandPayload,
    ) -> impl Future<Output = Result<ResponseEnvelope, TransportError>> + Send {
        let request = self.envelope_for(|from, key| {
            RequestEnvelope::command(command, from, key, unix_seconds())
        });
        async move { Ok(self.request(device, request).await?) }
    }

    fn request_update(
        &self,
        device: &DeviceInfo,
        namespace: Namespace,
    ) -> impl Future<Output = Result<ResponseEnvelope, TransportError>> + Send {
        let request = self.envelope_for(|from, key| {
            RequestEnvelope::query(namespace, from, key, unix_seconds())
        });
        async move { Ok(self.request(device, request).await?) }
    }
}

impl MqttEventLoop {
    /// Poll the connection forever, forwarding device pushes to `pushes`.
    ///
    /// Connection errors are logged and retried after a short delay; the
    /// loop ends once the push receiver is dropped.
    pub async fn run(mut self, pushes: mpsc::Sender<DevicePush>) {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    tracing::info!(reply_topic = %self.shared.reply_topic, "MQTT connected");
                    self.subscribe();
                }
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    match route(&self.shared.reply_topic, &publish.topic, &publish.payload) {
                        Ok(Routed::Reply(response)) => self.deliver(response),
                        Ok(Routed::Push(push)) => {
                            if pushes.send(push).await.is_err() {
                                tracing::debug!("push receiver dropped, stopping MQTT loop");
                                return;
                            }
                        }
                        Ok(Routed::Ignored) => {
                            tracing::debug!(topic = %publish.topic, "ignoring MQTT message");
                        }
                        Err(err) => {
                            tracing::warn!(topic = %publish.topic, error = %err, "dropping MQTT message");
                        }
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::error!(error = %err, "MQTT connection error");
                    self.fail_pending();
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    fn subscribe(&self) {
        for topic in [self.shared.reply_topic.as_str(), PUSH_TOPIC_FILTER] {
            if let Err(err) = self.shared.client.try_subscribe(topic, QoS::AtMostOnce) {
                tracing::error!(topic, error = %err, "failed to subscribe");
            }
        }
    }

    fn deliver(&self, response: ResponseEnvelope) {
        let sender = response
            .message_id()
            .and_then(|id| self.shared.pending().remove(id));
        match sender {
            Some(sender) => {
                // The requester may have timed out already.
                let _ = sender.send(response);
            }
            None => tracing::debug!(
                message_id = response.message_id().unwrap_or_default(),
                "reply without pending request"
            ),
        }
    }

    /// Drop every waiting request so callers fail fast instead of timing out.
    fn fail_pending(&self) {
        self.shared.pending().clear();
    }
}

fn device_topic(id: &DeviceId) -> String {
    format!("/appliance/{id}/subscribe")
}

/// Device id embedded in a `/appliance/{id}/publish` topic.
fn push_topic_device(topic: &str) -> Option<&str> {
    topic
        .strip_prefix("/appliance/")?
        .strip_suffix("/publish")
        .filter(|id| !id.is_empty() && !id.contains('/'))
}

fn route(reply_topic: &str, topic: &str, payload: &[u8]) -> Result<Routed, MqttError> {
    if topic == reply_topic {
        let response = serde_json::from_slice(payload).map_err(MqttError::PayloadParse)?;
        return Ok(Routed::Reply(response));
    }
    let Some(device) = push_topic_device(topic) else {
        return Ok(Routed::Ignored);
    };
    let Ok(device_id) = DeviceId::new(device) else {
        return Ok(Routed::Ignored);
    };
    let message: PushMessage = serde_json::from_slice(payload).map_err(MqttError::PayloadParse)?;
    if message.header.method.as_deref() != Some("PUSH") {
        return Ok(Routed::Ignored);
    }
    Ok(Routed::Push(DevicePush { device_id, message }))
}
