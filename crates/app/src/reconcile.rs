//! Poll and push reconciliation.
//!
//! Status reports and pushes are merged into the cache field by field. A
//! field is pushed to the hub only when the device reports a value that
//! differs from the cache, so applying the same digest twice is a no-op.

use std::sync::PoisonError;
use std::sync::atomic::Ordering;

use meross_bridge_domain::characteristic::{Characteristic, CharacteristicValue};
use meross_bridge_domain::command::{CAPACITY_RGB, CAPACITY_TEMPERATURE, SprayMode};
use meross_bridge_domain::convert;
use meross_bridge_domain::digest::{LightState, StatusDigest, StatusReport};
use meross_bridge_domain::error::BridgeError;
use meross_bridge_domain::protocol::PushMessage;

use crate::cache::CachedState;
use crate::controller::DeviceController;
use crate::ports::{AdaptiveLighting, ContextStore, DeviceTransport, HubCharacteristics};

/// Device temperature jump above which a change is treated as manual input.
pub const TEMPERATURE_JUMP_THRESHOLD: u8 = 10;

/// What a call to [`DeviceController::request_update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A write was in progress; nothing was requested.
    Skipped,
    /// A write ran while the status query was in flight; the answer was
    /// dropped as stale.
    Superseded,
    /// The device answered; `changed` hub values were pushed.
    Reconciled { changed: usize },
    /// The device could not be queried.
    Failed,
}

/// Result of merging one digest into the cache.
#[derive(Debug, Default)]
struct Merge {
    updates: Vec<(Characteristic, CharacteristicValue)>,
    manual_color: bool,
}

impl<T, H, C, A> DeviceController<T, H, C, A>
where
    T: DeviceTransport,
    H: HubCharacteristics + Clone + 'static,
    C: ContextStore,
    A: AdaptiveLighting,
{
    /// Poll the device and reconcile its status.
    ///
    /// Skipped while a write is queued or in flight. Connectivity failures
    /// eventually mark the device offline; they are never surfaced as errors.
    pub async fn request_update(&self) -> PollOutcome {
        if self.is_update_in_progress() {
            tracing::debug!(device = %self.id, "update in progress, skipping poll");
            return PollOutcome::Skipped;
        }

        let generation = self.write_generation();
        let device = self.device();
        let namespace = self.capabilities.status_namespace();
        let result = async {
            let response = self.transport.request_update(&device, namespace).await?;
            let payload = response.into_payload()?;
            Ok::<_, BridgeError>(StatusReport::parse(namespace, payload)?)
        }
        .await;

        match result {
            Ok(report) => match self.absorb_report(report, generation).await {
                Some(changed) => PollOutcome::Reconciled { changed },
                None => {
                    tracing::debug!(device = %self.id, "write overlapped poll, dropping digest");
                    PollOutcome::Superseded
                }
            },
            Err(err) => {
                self.absorb_failure(&err).await;
                PollOutcome::Failed
            }
        }
    }

    /// Merge a device-originated push into the cache.
    ///
    /// Identity, address and online state are left alone; only polls
    /// update those.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Protocol`] when the push payload is malformed.
    pub async fn receive_update(&self, push: PushMessage) -> Result<usize, BridgeError> {
        tracing::debug!(
            device = %self.id,
            namespace = push.header.namespace.as_deref().unwrap_or_default(),
            "received push"
        );
        let digest = StatusDigest::from_push(push.payload)?;
        Ok(self.apply_digest(&digest).await)
    }

    /// Merge `digest` into the cache and push changed fields to the hub.
    ///
    /// Returns the number of hub values pushed.
    pub async fn apply_digest(&self, digest: &StatusDigest) -> usize {
        self.apply_digest_since(digest, None).await.unwrap_or_default()
    }

    /// Like [`Self::apply_digest`], but when `generation` is set the digest
    /// is dropped (`None`) if a write ran since that generation was read.
    async fn apply_digest_since(
        &self,
        digest: &StatusDigest,
        generation: Option<u64>,
    ) -> Option<usize> {
        let merge = {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if generation.is_some_and(|generation| self.wrote_since(generation)) {
                return None;
            }
            self.merge(&mut cache, digest)
        };

        for (characteristic, value) in &merge.updates {
            self.push_to_hub(*characteristic, *value).await;
        }
        if merge.manual_color {
            self.disable_adaptive_lighting().await;
        }
        Some(merge.updates.len())
    }

    fn merge(&self, cache: &mut CachedState, digest: &StatusDigest) -> Merge {
        let channel = self.channel();
        let mut merge = Merge::default();

        if self.capabilities.supports(Characteristic::On) {
            if let Some(power) = digest.power(channel) {
                if power != cache.power {
                    cache.power = power;
                    merge.updates.push((Characteristic::On, power.into()));
                }
            }
        }

        if let Some(light) = digest.light(channel) {
            self.merge_light(cache, light, &mut merge);
        }

        if self.capabilities.supports(Characteristic::RotationSpeed) {
            if let Some(raw) = digest.spray_mode(channel) {
                match SprayMode::try_from(raw) {
                    Ok(mode) if mode != cache.spray_mode => {
                        let was_active = cache.spray_mode.is_active();
                        cache.set_spray_mode(mode);
                        merge.updates.push((
                            Characteristic::RotationSpeed,
                            convert::spray_mode_to_speed(mode).into(),
                        ));
                        if was_active != mode.is_active() {
                            merge.updates.push((
                                Characteristic::Active,
                                u8::from(mode.is_active()).into(),
                            ));
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::debug!(device = %self.id, error = %err, "ignoring spray state");
                    }
                }
            }
        }

        merge
    }

    fn merge_light(&self, cache: &mut CachedState, light: &LightState, merge: &mut Merge) {
        if self.capabilities.supports(Characteristic::Brightness) {
            if let Some(luminance) = light.luminance {
                let brightness = convert::luminance_to_brightness(luminance);
                if brightness != cache.brightness {
                    cache.brightness = brightness;
                    merge
                        .updates
                        .push((Characteristic::Brightness, brightness.into()));
                }
            }
        }

        let color_mode = light
            .capacity
            .is_none_or(|capacity| capacity & CAPACITY_RGB != 0);
        if self.capabilities.supports(Characteristic::Hue) && color_mode {
            if let Some(rgb) = light.rgb {
                // Devices echo their rgb on every poll; only a new value
                // counts as manual color input.
                if cache.rgb != Some(rgb) {
                    cache.rgb = Some(rgb);
                    let (red, green, blue) = convert::unpack_rgb(rgb);
                    let (hue, saturation) = convert::rgb_to_hs(red, green, blue);
                    if hue != cache.hue {
                        cache.hue = hue;
                        merge.updates.push((Characteristic::Hue, hue.into()));
                    }
                    if saturation != cache.saturation {
                        cache.saturation = saturation;
                        merge
                            .updates
                            .push((Characteristic::Saturation, saturation.into()));
                    }
                    merge.manual_color = true;
                }
            }
        }

        let temperature_mode = light
            .capacity
            .is_none_or(|capacity| capacity & CAPACITY_TEMPERATURE != 0);
        if self.capabilities.supports(Characteristic::ColorTemperature) && temperature_mode {
            if let Some(temperature) = light.temperature {
                // Compared on the device scale: the cache may hold a mired
                // value between two device steps.
                let previous = convert::mired_to_device_temp(cache.mired);
                if temperature != previous {
                    if temperature.abs_diff(previous) > TEMPERATURE_JUMP_THRESHOLD {
                        merge.manual_color = true;
                    }
                    let mired = convert::device_temp_to_mired(temperature);
                    cache.mired = mired;
                    merge
                        .updates
                        .push((Characteristic::ColorTemperature, mired.into()));
                }
            }
        }
    }

    fn channel(&self) -> u8 {
        self.device
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .channel
    }

    async fn absorb_report(&self, report: StatusReport, generation: u64) -> Option<usize> {
        self.connectivity_failures.store(0, Ordering::SeqCst);
        let first_poll = !self.polled_once.swap(true, Ordering::SeqCst);

        let context_changed = {
            let mut device = self.device.lock().unwrap_or_else(PoisonError::into_inner);
            let mut changed = first_poll;

            if let Some(identity) = report.identity {
                changed |= device.capture_identity(identity);
            }
            if let Some(ip_address) = report.ip_address {
                if device.ip_address.as_deref() != Some(ip_address.as_str()) {
                    tracing::info!(
                        device = %self.id,
                        previous = ?device.ip_address,
                        current = %ip_address,
                        "device address changed"
                    );
                    device.ip_address = Some(ip_address);
                    changed = true;
                }
            }
            let online = report.online.unwrap_or(true);
            if device.online != online {
                tracing::info!(device = %self.id, online, "device online state changed");
                device.online = online;
                changed = true;
            }
            changed
        };

        let pushed = self.apply_digest_since(&report.digest, Some(generation)).await;
        if context_changed {
            self.persist_context().await;
        }
        pushed
    }

    async fn absorb_failure(&self, err: &BridgeError) {
        if !err.is_connectivity() {
            tracing::warn!(device = %self.id, error = ?err, "status request failed");
            return;
        }

        let failures = self.connectivity_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if self.settings.debug {
            tracing::warn!(device = %self.id, failures, error = %err, "device not reachable");
        } else {
            tracing::debug!(device = %self.id, failures, error = %err, "device not reachable");
        }
        if failures < self.settings.offline_after_failures.max(1) {
            return;
        }

        let went_offline = {
            let mut device = self.device.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut device.online, false)
        };
        if went_offline {
            tracing::info!(device = %self.id, "device marked offline");
            self.persist_context().await;
        }
    }

    async fn persist_context(&self) {
        let device = self.device();
        if let Err(err) = self.context.persist(&device).await {
            tracing::warn!(device = %self.id, error = ?err, "failed to persist accessory context");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::{Value, json};

    use meross_bridge_domain::protocol::Namespace;

    use super::*;
    use crate::testing::{Harness, Reply};

    fn status(onoff: u8, luminance: u8, rgb: u32, temperature: u8, capacity: u8) -> Value {
        json!({
            "all": {
                "system": {
                    "hardware": {"macAddress": "48:e1:e9:00:00:01", "version": "4.0.0"},
                    "firmware": {"version": "4.1.8", "innerIp": "192.168.1.40"},
                    "online": {"status": 1}
                },
                "digest": {
                    "togglex": [{"channel": 0, "onoff": onoff}],
                    "light": {
                        "channel": 0,
                        "capacity": capacity,
                        "rgb": rgb,
                        "temperature": temperature,
                        "luminance": luminance
                    }
                }
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn should_push_only_changed_fields() {
        let harness = Harness::new("MSL120");
        harness.hub.set(Characteristic::Brightness, 80);
        let controller = harness.controller();
        harness
            .transport
            .reply_to_status(Reply::Ack(status(1, 80, 0, 100, 6)));

        let outcome = controller.request_update().await;

        assert_eq!(outcome, PollOutcome::Reconciled { changed: 1 });
        assert_eq!(
            harness.hub.pushes(),
            vec![(Characteristic::On, CharacteristicValue::Bool(true))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_be_idempotent_for_unchanged_digest() {
        let harness = Harness::new("MSL120");
        let controller = harness.controller();
        harness
            .transport
            .reply_to_status(Reply::Ack(status(1, 30, 0xFF_0000, 50, 5)));

        let first = controller.request_update().await;
        let pushes = harness.hub.pushes().len();
        let second = controller.request_update().await;

        assert!(matches!(first, PollOutcome::Reconciled { changed } if changed > 0));
        assert_eq!(second, PollOutcome::Reconciled { changed: 0 });
        assert_eq!(harness.hub.pushes().len(), pushes);
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_power_and_brightness_independent() {
        let harness = Harness::new("MSL100");
        harness.hub.set(Characteristic::On, true);
        harness.hub.set(Characteristic::Brightness, 100);
        let controller = harness.controller();
        harness
            .transport
            .reply_to_status(Reply::Ack(status(1, 40, 0, 0, 4)));

        controller.request_update().await;

        let cached = controller.cached();
        assert!(cached.power);
        assert_eq!(cached.brightness, 40);
        assert_eq!(
            harness.hub.pushes(),
            vec![(Characteristic::Brightness, CharacteristicValue::Int(40))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_query_online_status_for_unknown_model() {
        let harness = Harness::new("MSS110");
        let controller = harness.controller();
        harness
            .transport
            .reply_to_status(Reply::Ack(json!({"online": {"status": 1}})));

        controller.request_update().await;

        assert_eq!(harness.transport.queries(), vec![Namespace::SystemOnline]);
        assert!(controller.device().online);
    }

    #[tokio::test(start_paused = true)]
    async fn should_skip_poll_while_update_in_progress() {
        let harness = Harness::new("MSL100");
        let controller = harness.controller();
        harness.transport.reply_to_commands(Reply::Hang);

        let write = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.set_on(true).await })
        };
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(controller.is_update_in_progress());
        assert_eq!(controller.request_update().await, PollOutcome::Skipped);
        assert!(harness.transport.queries().is_empty());

        assert!(write.await.unwrap().is_err());
        assert!(!controller.is_update_in_progress());
    }

    #[tokio::test(start_paused = true)]
    async fn should_drop_status_that_overlaps_a_confirmed_write() {
        let harness = Harness::new("MSL100");
        harness.hub.set(Characteristic::On, true);
        harness.hub.set(Characteristic::Brightness, 40);
        let controller = harness.controller();
        harness.transport.set_status_latency(Duration::from_secs(1));
        harness
            .transport
            .reply_to_status(Reply::Ack(status(1, 40, 0, 0, 4)));

        let poll = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.request_update().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        controller.set_brightness(55).await.unwrap();
        assert_eq!(controller.cached().brightness, 55);

        assert_eq!(poll.await.unwrap(), PollOutcome::Superseded);
        assert_eq!(controller.cached().brightness, 55);
        assert!(
            !harness
                .hub
                .pushes()
                .contains(&(Characteristic::Brightness, CharacteristicValue::Int(40)))
        );
        assert!(controller.device().online);
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_push_temperature_between_device_steps() {
        let harness = Harness::new("MSL120");
        harness.hub.set(Characteristic::On, true);
        harness.hub.set(Characteristic::Brightness, 100);
        harness.hub.set(Characteristic::ColorTemperature, 300);
        let controller = harness.controller();

        controller.set_color_temperature(321).await.unwrap();
        assert_eq!(
            harness.transport.sent()[0].payload,
            json!({"light": {"temperature": 50, "capacity": 2}})
        );

        harness
            .transport
            .reply_to_status(Reply::Ack(status(1, 100, 0, 50, 6)));
        assert_eq!(
            controller.request_update().await,
            PollOutcome::Reconciled { changed: 0 }
        );
        assert_eq!(controller.cached().mired, 321);
        assert!(harness.hub.pushes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn should_disable_adaptive_lighting_on_reported_rgb() {
        let harness = Harness::new("MSL120");
        harness.adaptive_lighting.enable();
        let controller = harness.controller();
        harness
            .transport
            .reply_to_status(Reply::Ack(status(1, 100, 0x00_FF00, 50, 5)));

        controller.request_update().await;

        assert!(!harness.adaptive_lighting.is_active());
        assert_eq!(controller.cached().hue, 120);
        assert_eq!(controller.cached().saturation, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn should_ignore_stale_rgb_in_temperature_mode() {
        let harness = Harness::new("MSL120");
        harness.adaptive_lighting.enable();
        let controller = harness.controller();
        harness
            .transport
            .reply_to_status(Reply::Ack(status(1, 100, 0x00_FF00, 100, 6)));

        controller.request_update().await;

        assert!(harness.adaptive_lighting.is_active());
        assert_eq!(controller.cached().rgb, None);
    }

    #[tokio::test(start_paused = true)]
    async fn should_disable_adaptive_lighting_on_large_temperature_jump() {
        let harness = Harness::new("MSL120");
        harness.hub.set(Characteristic::ColorTemperature, 320);
        harness.adaptive_lighting.enable();
        let controller = harness.controller();
        harness
            .transport
            .reply_to_status(Reply::Ack(status(1, 100, 0, 80, 6)));

        controller.request_update().await;

        assert!(!harness.adaptive_lighting.is_active());
        assert_eq!(
            controller.cached().mired,
            convert::device_temp_to_mired(80)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_adaptive_lighting_on_small_temperature_drift() {
        let harness = Harness::new("MSL120");
        harness.hub.set(Characteristic::ColorTemperature, 320);
        harness.adaptive_lighting.enable();
        let controller = harness.controller();
        harness
            .transport
            .reply_to_status(Reply::Ack(status(1, 100, 0, 55, 6)));

        controller.request_update().await;

        assert!(harness.adaptive_lighting.is_active());
        assert_eq!(
            harness.hub.current(Characteristic::ColorTemperature),
            Some(CharacteristicValue::Int(i64::from(convert::device_temp_to_mired(55))))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_capture_identity_and_persist_on_first_poll_only() {
        let harness = Harness::new("MSL120");
        let controller = harness.controller();
        harness
            .transport
            .reply_to_status(Reply::Ack(status(0, 100, 0, 1, 6)));

        controller.request_update().await;
        controller.request_update().await;

        let persisted = harness.context.persisted();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].mac_address.as_deref(), Some("48:e1:e9:00:00:01"));
        assert_eq!(persisted[0].firmware_version.as_deref(), Some("4.1.8"));
        assert_eq!(persisted[0].ip_address.as_deref(), Some("192.168.1.40"));
        assert!(persisted[0].online);
    }

    #[tokio::test(start_paused = true)]
    async fn should_persist_when_address_drifts() {
        let harness = Harness::new("MSL120");
        let controller = harness.controller();
        let mut payload = status(0, 100, 0, 1, 6);
        harness
            .transport
            .reply_to_status(Reply::Ack(payload.clone()));
        controller.request_update().await;

        payload["all"]["system"]["firmware"]["innerIp"] = json!("192.168.1.77");
        harness.transport.reply_to_status(Reply::Ack(payload));
        controller.request_update().await;

        let persisted = harness.context.persisted();
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted[1].ip_address.as_deref(), Some("192.168.1.77"));
        assert_eq!(persisted[1].mac_address, persisted[0].mac_address);
    }

    #[tokio::test(start_paused = true)]
    async fn should_go_offline_after_repeated_connectivity_failures() {
        let harness = Harness::new("MSL120");
        let controller = harness.controller();
        harness
            .transport
            .reply_to_status(Reply::Ack(status(0, 100, 0, 1, 6)));
        controller.request_update().await;
        assert!(controller.device().online);

        harness.transport.reply_to_status(Reply::Unreachable);
        assert_eq!(controller.request_update().await, PollOutcome::Failed);
        assert!(controller.device().online);
        assert_eq!(controller.request_update().await, PollOutcome::Failed);
        assert!(!controller.device().online);
        controller.request_update().await;

        let persisted = harness.context.persisted();
        assert_eq!(persisted.len(), 2);
        assert!(!persisted[1].online);
    }

    #[tokio::test(start_paused = true)]
    async fn should_recover_online_on_next_successful_poll() {
        let harness = Harness::new("MSL120");
        let controller = harness.controller();
        harness.transport.reply_to_status(Reply::Unreachable);
        controller.request_update().await;
        controller.request_update().await;

        harness
            .transport
            .reply_to_status(Reply::Ack(status(0, 100, 0, 1, 6)));
        controller.request_update().await;

        assert!(controller.device().online);
        assert!(harness.context.persisted().last().unwrap().online);
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_mark_offline_on_protocol_error() {
        let harness = Harness::new("MSL120");
        let controller = harness.controller();
        harness
            .transport
            .reply_to_status(Reply::Ack(status(0, 100, 0, 1, 6)));
        controller.request_update().await;

        harness.transport.reply_to_status(Reply::DeviceError);
        controller.request_update().await;
        controller.request_update().await;

        assert!(controller.device().online);
    }

    #[tokio::test(start_paused = true)]
    async fn should_merge_push_through_same_policy() {
        let harness = Harness::new("MSL100");
        let controller = harness.controller();

        let push = PushMessage::new(
            Namespace::ToggleX,
            json!({"togglex": [{"channel": 0, "onoff": 1}]}),
        );
        assert_eq!(controller.receive_update(push.clone()).await.unwrap(), 1);
        assert_eq!(controller.receive_update(push).await.unwrap(), 0);

        assert!(controller.cached().power);
        assert!(harness.context.persisted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn should_reject_malformed_push() {
        let harness = Harness::new("MSL100");
        let controller = harness.controller();

        let push = PushMessage::new(Namespace::ToggleX, json!({"togglex": "nope"}));

        assert!(matches!(
            controller.receive_update(push).await,
            Err(BridgeError::Protocol(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn should_push_speed_and_active_for_spray_change() {
        let harness = Harness::new("MSXH0");
        let controller = harness.controller();

        let push = PushMessage::new(
            Namespace::Spray,
            json!({"spray": [{"channel": 0, "mode": 1}]}),
        );
        controller.receive_update(push).await.unwrap();

        assert_eq!(
            harness.hub.pushes(),
            vec![
                (Characteristic::RotationSpeed, CharacteristicValue::Int(100)),
                (Characteristic::Active, CharacteristicValue::Int(1)),
            ]
        );
    }
}
