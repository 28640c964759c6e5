//! # meross-bridged: meross bridge daemon
//!
//! Composition root that wires all adapters together and runs the bridge.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars) and initialise logging
//! - Restore persisted accessory contexts
//! - Pick a transport per device (local HTTP, MQTT relay, simulated)
//! - Construct one `DeviceController` per device with its hub-side store
//! - Start poll schedulers, the MQTT event loop and push routing
//! - Log hub events
//! - Shut down on Ctrl-C
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;
mod context_store;
mod transport;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use meross_bridge_adapter_http::LocalHttpTransport;
use meross_bridge_adapter_mqtt::{DevicePush, MqttTransport};
use meross_bridge_adapter_virtual::{SimulatedDevice, SimulatedTransport};
use meross_bridge_app::adaptive_lighting::AdaptiveLightingState;
use meross_bridge_app::characteristic_store::CharacteristicStore;
use meross_bridge_app::controller::DeviceController;
use meross_bridge_app::event_bus::InProcessEventBus;
use meross_bridge_app::poller::spawn_poller;
use meross_bridge_domain::event::HubEvent;
use meross_bridge_domain::id::DeviceId;

use crate::config::{Config, Connection, DeviceConfig};
use crate::context_store::JsonContextStore;
use crate::transport::AnyTransport;

type Controller = DeviceController<
    AnyTransport,
    CharacteristicStore<InProcessEventBus>,
    Arc<JsonContextStore>,
    AdaptiveLightingState,
>;

/// Transports shared by every device that uses them.
struct Transports {
    local: LocalHttpTransport,
    cloud: Option<MqttTransport>,
    simulated: SimulatedTransport,
}

impl Transports {
    fn for_device(&self, device: &DeviceConfig) -> Result<AnyTransport, Box<dyn std::error::Error>> {
        Ok(match device.connection {
            Connection::Local => AnyTransport::Local(self.local.clone()),
            Connection::Cloud => AnyTransport::Cloud(
                self.cloud
                    .clone()
                    .ok_or("cloud device configured without an MQTT broker")?,
            ),
            Connection::Simulated => {
                let simulated = SimulatedDevice::new(DeviceId::new(device.id.as_str())?, &device.model);
                let simulated = match &device.address {
                    Some(address) => simulated.with_address(address.as_str()),
                    None => simulated,
                };
                self.simulated.register(simulated);
                AnyTransport::Simulated(self.simulated.clone())
            }
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    let bus = InProcessEventBus::new(256);
    let context = Arc::new(JsonContextStore::new(config.state.dir.clone()));
    let (cloud, mqtt_loop) = match &config.mqtt {
        Some(mqtt) => {
            let (transport, event_loop) = MqttTransport::new(mqtt);
            (Some(transport), Some(event_loop))
        }
        None => (None, None),
    };
    let transports = Transports {
        local: LocalHttpTransport::new(&config.http)?,
        cloud,
        simulated: SimulatedTransport::new(),
    };

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();
    tasks.push(tokio::spawn(log_events(bus.subscribe())));

    let mut controllers: HashMap<DeviceId, Arc<Controller>> = HashMap::new();
    for device_config in &config.devices {
        let mut device = device_config.device_info()?;
        match context.load(&device.id).await {
            Ok(Some(stored)) => context_store::restore(&mut device, stored),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(device = %device.id, error = %err, "ignoring unreadable context");
            }
        }

        let transport = transports.for_device(device_config)?;
        let hub = CharacteristicStore::new(device.id.clone(), bus.clone());
        let adaptive_lighting = device_config
            .adaptive_lighting
            .then(|| AdaptiveLightingState::new(false));
        let settings = config.controller.settings_for(device_config);

        tracing::info!(
            device = %device.id,
            name = %device.name,
            model = %device.model,
            connection = ?device_config.connection,
            "starting device"
        );
        let controller = Arc::new(DeviceController::new(
            device,
            settings,
            transport,
            hub,
            Arc::clone(&context),
            adaptive_lighting,
        ));
        tasks.push(spawn_poller(Arc::clone(&controller)));
        controllers.insert(controller.id().clone(), controller);
    }

    if let Some(event_loop) = mqtt_loop {
        let (pushes_tx, pushes_rx) = mpsc::channel(64);
        tasks.push(tokio::spawn(event_loop.run(pushes_tx)));
        tasks.push(tokio::spawn(route_pushes(pushes_rx, controllers.clone())));
    }

    tracing::info!(
        devices = controllers.len(),
        state_dir = %context.dir().display(),
        "meross-bridged running"
    );
    tokio::signal::ctrl_c().await?;

    tracing::info!("shutting down");
    for task in tasks {
        task.abort();
    }
    Ok(())
}

/// Hand each device push to the controller that owns the device.
async fn route_pushes(
    mut pushes: mpsc::Receiver<DevicePush>,
    controllers: HashMap<DeviceId, Arc<Controller>>,
) {
    while let Some(push) = pushes.recv().await {
        let Some(controller) = controllers.get(&push.device_id) else {
            tracing::debug!(device = %push.device_id, "push from unconfigured device");
            continue;
        };
        if let Err(err) = controller.receive_update(push.message).await {
            tracing::warn!(device = %push.device_id, error = %err, "failed to apply push");
        }
    }
}

async fn log_events(mut events: broadcast::Receiver<HubEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => tracing::debug!(
                device = %event.device_id,
                characteristic = event.characteristic.label(),
                value = ?event.value,
                "hub updated"
            ),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event logger lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
