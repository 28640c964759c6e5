//! Device update pipeline.
//!
//! A [`DeviceController`] owns the cached state of one accessory and turns
//! hub write intents into device commands:
//!
//! ```text
//! intent ─► no-op? ─► debounce ─► queue ─► validate ─► commit cache
//!                                              └─────► revert hub after 2 s
//! ```
//!
//! Polls and pushes are merged into the same cache by the reconcile half of
//! the controller (see [`crate::reconcile`]).

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;

use meross_bridge_domain::characteristic::{Characteristic, CharacteristicValue};
use meross_bridge_domain::command::{Command, SprayMode};
use meross_bridge_domain::convert;
use meross_bridge_domain::device::{DeviceInfo, ModelCapabilities};
use meross_bridge_domain::error::{BridgeError, HubStatusError};
use meross_bridge_domain::id::DeviceId;
use meross_bridge_domain::protocol::CommandPayload;

use crate::cache::{CachedState, clamp_mired};
use crate::command_queue::{CommandQueue, QueueError};
use crate::config::DeviceSettings;
use crate::debounce::{DEFAULT_DEBOUNCE, Debouncer};
use crate::ports::{AdaptiveLighting, ContextStore, DeviceTransport, HubCharacteristics};

/// Delay before a failed write is rolled back on the hub.
pub const REVERT_DELAY: Duration = Duration::from_secs(2);

/// Controls one accessory: write handlers, poll and push reconciliation.
pub struct DeviceController<T, H, C, A> {
    pub(crate) id: DeviceId,
    pub(crate) device: Mutex<DeviceInfo>,
    pub(crate) capabilities: ModelCapabilities,
    pub(crate) settings: DeviceSettings,
    pub(crate) transport: T,
    pub(crate) hub: H,
    pub(crate) context: C,
    pub(crate) adaptive_lighting: Option<A>,
    pub(crate) cache: Arc<Mutex<CachedState>>,
    pub(crate) connectivity_failures: AtomicU32,
    pub(crate) polled_once: AtomicBool,
    queue: CommandQueue,
    /// Bumped when a write enters and when it leaves the queue.
    write_generation: AtomicU64,
    debouncer: Debouncer<Characteristic>,
}

impl<T, H, C, A> DeviceController<T, H, C, A>
where
    T: DeviceTransport,
    H: HubCharacteristics + Clone + 'static,
    C: ContextStore,
    A: AdaptiveLighting,
{
    /// Create a controller, seeding its cache from the hub.
    pub fn new(
        device: DeviceInfo,
        settings: DeviceSettings,
        transport: T,
        hub: H,
        context: C,
        adaptive_lighting: Option<A>,
    ) -> Self {
        let cache = CachedState::seed(&hub);
        Self {
            id: device.id.clone(),
            capabilities: device.capabilities(),
            device: Mutex::new(device),
            settings,
            transport,
            hub,
            context,
            adaptive_lighting,
            cache: Arc::new(Mutex::new(cache)),
            connectivity_failures: AtomicU32::new(0),
            polled_once: AtomicBool::new(false),
            queue: CommandQueue::new(settings.queue),
            debouncer: Debouncer::new(),
            write_generation: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    #[must_use]
    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    /// Snapshot of the accessory context.
    #[must_use]
    pub fn device(&self) -> DeviceInfo {
        self.device
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot of the cached characteristic state.
    #[must_use]
    pub fn cached(&self) -> CachedState {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a write is queued or in flight.
    #[must_use]
    pub fn is_update_in_progress(&self) -> bool {
        !self.queue.is_idle()
    }

    pub(crate) fn write_generation(&self) -> u64 {
        self.write_generation.load(Ordering::SeqCst)
    }

    /// Whether a write was dispatched since `generation` was read, or is
    /// still running.
    pub(crate) fn wrote_since(&self, generation: u64) -> bool {
        self.write_generation() != generation || self.is_update_in_progress()
    }

    /// Switch the light on or off.
    ///
    /// # Errors
    ///
    /// [`HubStatusError::CommunicationFailure`] when the device did not confirm.
    pub async fn set_on(&self, on: bool) -> Result<(), HubStatusError> {
        if !self.accepts(Characteristic::On) || self.cached().power == on {
            return Ok(());
        }
        if !self.debounce(Characteristic::On).await {
            return Ok(());
        }

        self.send(&[Characteristic::On], Command::Toggle { on })
            .await?;
        self.update_cache(|cache| cache.power = on);
        self.log_confirmed(Characteristic::On, if on { "on" } else { "off" });
        Ok(())
    }

    /// Set the brightness, in percent.
    ///
    /// # Errors
    ///
    /// [`HubStatusError::CommunicationFailure`] when the device did not confirm.
    pub async fn set_brightness(&self, brightness: u8) -> Result<(), HubStatusError> {
        let brightness = brightness.min(100);
        if !self.accepts(Characteristic::Brightness) || self.cached().brightness == brightness {
            return Ok(());
        }
        if !self.debounce(Characteristic::Brightness).await {
            return Ok(());
        }

        let command = Command::Luminance {
            luminance: convert::brightness_to_luminance(brightness),
            color_capable: self.capabilities.color,
        };
        self.send(&[Characteristic::Brightness], command).await?;
        self.update_cache(|cache| cache.brightness = brightness);
        self.log_confirmed(Characteristic::Brightness, format!("{brightness}%"));
        Ok(())
    }

    /// Set the hue, in degrees. Saturation is read live from the hub.
    ///
    /// # Errors
    ///
    /// [`HubStatusError::CommunicationFailure`] when the device did not confirm.
    pub async fn set_hue(&self, hue: u16) -> Result<(), HubStatusError> {
        let hue = hue % 360;
        if !self.accepts(Characteristic::Hue) {
            return Ok(());
        }
        let cached = self.cached();
        if cached.hue == hue && cached.saturation == self.live_saturation(cached.saturation) {
            return Ok(());
        }
        if !self.debounce(Characteristic::Hue).await {
            return Ok(());
        }

        let saturation = self.live_saturation(self.cached().saturation);
        let (red, green, blue) = convert::hs_to_rgb(hue, saturation);
        let rgb = convert::pack_rgb(red, green, blue);
        self.send(
            &[Characteristic::Hue, Characteristic::Saturation],
            Command::Rgb { rgb },
        )
        .await?;
        self.update_cache(|cache| {
            cache.hue = hue;
            cache.saturation = saturation;
            cache.rgb = Some(rgb);
        });
        self.disable_adaptive_lighting().await;
        self.log_confirmed(Characteristic::Hue, format!("{hue}° at {saturation}%"));
        Ok(())
    }

    /// Set the white color temperature, in mired. Ignored while the light is off.
    ///
    /// # Errors
    ///
    /// [`HubStatusError::CommunicationFailure`] when the device did not confirm.
    pub async fn set_color_temperature(&self, mired: u16) -> Result<(), HubStatusError> {
        let mired = clamp_mired(i64::from(mired));
        if !self.accepts(Characteristic::ColorTemperature) {
            return Ok(());
        }
        let cached = self.cached();
        if cached.mired == mired {
            return Ok(());
        }
        if !cached.power {
            tracing::debug!(device = %self.id, mired, "ignoring color temperature while off");
            return Ok(());
        }
        if !self.debounce(Characteristic::ColorTemperature).await {
            return Ok(());
        }

        let temperature = convert::mired_to_device_temp(mired);
        self.send(
            &[Characteristic::ColorTemperature],
            Command::Temperature { temperature },
        )
        .await?;
        self.update_cache(|cache| cache.mired = mired);
        self.log_confirmed(
            Characteristic::ColorTemperature,
            format!("{mired} mired"),
        );
        Ok(())
    }

    /// Start or stop the humidifier. Starting restores the last running mode.
    ///
    /// # Errors
    ///
    /// [`HubStatusError::CommunicationFailure`] when the device did not confirm.
    pub async fn set_active(&self, active: bool) -> Result<(), HubStatusError> {
        if !self.accepts(Characteristic::Active)
            || self.cached().spray_mode.is_active() == active
        {
            return Ok(());
        }
        if !self.debounce(Characteristic::Active).await {
            return Ok(());
        }

        let mode = if active {
            self.cached().last_active_mode
        } else {
            SprayMode::Off
        };
        self.send(
            &[Characteristic::Active, Characteristic::RotationSpeed],
            Command::Spray { mode },
        )
        .await?;
        self.update_cache(|cache| cache.set_spray_mode(mode));
        self.push_to_hub(Characteristic::RotationSpeed, convert::spray_mode_to_speed(mode).into())
            .await;
        self.log_confirmed(Characteristic::Active, spray_label(mode));
        Ok(())
    }

    /// Set the humidifier speed, in percent. The hub value snaps to the
    /// speed the device can actually represent.
    ///
    /// # Errors
    ///
    /// [`HubStatusError::CommunicationFailure`] when the device did not confirm.
    pub async fn set_rotation_speed(&self, speed: u8) -> Result<(), HubStatusError> {
        let mode = convert::speed_to_spray_mode(speed.min(100));
        if !self.accepts(Characteristic::RotationSpeed) || self.cached().spray_mode == mode {
            return Ok(());
        }
        if !self.debounce(Characteristic::RotationSpeed).await {
            return Ok(());
        }

        self.send(
            &[Characteristic::RotationSpeed, Characteristic::Active],
            Command::Spray { mode },
        )
        .await?;
        self.update_cache(|cache| cache.set_spray_mode(mode));
        let speed = convert::spray_mode_to_speed(mode);
        self.push_to_hub(Characteristic::RotationSpeed, speed.into())
            .await;
        self.push_to_hub(Characteristic::Active, u8::from(mode.is_active()).into())
            .await;
        self.log_confirmed(Characteristic::RotationSpeed, format!("{speed}%"));
        Ok(())
    }

    fn accepts(&self, characteristic: Characteristic) -> bool {
        let supported = self.capabilities.supports(characteristic);
        if !supported {
            tracing::debug!(
                device = %self.id,
                %characteristic,
                "ignoring write to unsupported characteristic"
            );
        }
        supported
    }

    async fn debounce(&self, characteristic: Characteristic) -> bool {
        self.debouncer
            .debounce(characteristic, DEFAULT_DEBOUNCE)
            .await
    }

    fn live_saturation(&self, fallback: u8) -> u8 {
        self.hub
            .value(Characteristic::Saturation)
            .map_or(fallback, CharacteristicValue::as_percent)
    }

    pub(crate) fn update_cache(&self, update: impl FnOnce(&mut CachedState)) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut *cache);
    }

    /// Dispatch `command`; on failure schedule a hub revert of `affected`.
    async fn send(
        &self,
        affected: &[Characteristic],
        command: Command,
    ) -> Result<(), HubStatusError> {
        match self.dispatch(command).await {
            Ok(_) => Ok(()),
            Err(err) => {
                match &err {
                    BridgeError::Timeout(after) => tracing::warn!(
                        device = %self.id,
                        namespace = %command.namespace(),
                        ?after,
                        "device command timed out"
                    ),
                    other => tracing::error!(
                        device = %self.id,
                        namespace = %command.namespace(),
                        error = ?other,
                        "device command failed"
                    ),
                }
                self.schedule_revert(affected);
                Err(err.into())
            }
        }
    }

    /// Submit `command` through the queue and validate the response.
    async fn dispatch(&self, command: Command) -> Result<Value, BridgeError> {
        self.write_generation.fetch_add(1, Ordering::SeqCst);
        let device = self.device();
        let payload = command.into_payload(device.channel);
        tracing::debug!(
            device = %self.id,
            namespace = %payload.namespace,
            payload = %payload.payload,
            "sending command"
        );
        let outcome = self
            .queue
            .submit(send_and_validate(&self.transport, &device, payload))
            .await;
        self.write_generation.fetch_add(1, Ordering::SeqCst);

        outcome.map_err(|err| match err {
            QueueError::Timeout(after) => BridgeError::Timeout(after),
            QueueError::Task(err) => err,
        })
    }

    /// After [`REVERT_DELAY`], push the cached value of each characteristic
    /// back to the hub.
    fn schedule_revert(&self, affected: &[Characteristic]) {
        let hub = self.hub.clone();
        let cache = Arc::clone(&self.cache);
        let affected = affected.to_vec();
        let id = self.id.clone();

        tokio::spawn(async move {
            tokio::time::sleep(REVERT_DELAY).await;
            for characteristic in affected {
                let value = cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .hub_value(characteristic);
                if let Err(err) = hub.push(characteristic, value).await {
                    tracing::warn!(
                        device = %id,
                        %characteristic,
                        error = %err,
                        "failed to revert hub value"
                    );
                }
            }
        });
    }

    pub(crate) async fn push_to_hub(&self, characteristic: Characteristic, value: CharacteristicValue) {
        if let Err(err) = self.hub.push(characteristic, value).await {
            tracing::warn!(
                device = %self.id,
                %characteristic,
                error = %err,
                "failed to push value to hub"
            );
        }
    }

    pub(crate) async fn disable_adaptive_lighting(&self) {
        let Some(adaptive_lighting) = &self.adaptive_lighting else {
            return;
        };
        if !adaptive_lighting.is_active() {
            return;
        }
        if let Err(err) = adaptive_lighting.disable().await {
            tracing::warn!(device = %self.id, error = %err, "failed to disable adaptive lighting");
        }
    }

    fn log_confirmed(&self, characteristic: Characteristic, value: impl std::fmt::Display) {
        if self.settings.log_updates {
            tracing::info!(device = %self.id, %characteristic, %value, "updated");
        } else {
            tracing::debug!(device = %self.id, %characteristic, %value, "updated");
        }
    }
}

async fn send_and_validate<T: DeviceTransport>(
    transport: &T,
    device: &DeviceInfo,
    command: CommandPayload,
) -> Result<Value, BridgeError> {
    let response = transport.send_update(device, command).await?;
    Ok(response.into_payload()?)
}

fn spray_label(mode: SprayMode) -> &'static str {
    match mode {
        SprayMode::Off => "off",
        SprayMode::Continuous => "continuous",
        SprayMode::Intermittent => "intermittent",
    }
}
