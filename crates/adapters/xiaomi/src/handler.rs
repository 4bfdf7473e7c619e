//! Translates gateway reports into registry updates and bus events.

use std::sync::Arc;

use homebus_app::ports::{DeviceStore, EventPublisher};
use homebus_app::services::device_registry::DeviceRegistry;
use homebus_domain::bus::{BusMessage, labels};
use homebus_domain::device::{Device, DeviceKey};
use homebus_domain::protocol::{DeviceState, DeviceType, SourceProtocol, ValueType};
use homebus_domain::topic::{Topic, names};

use crate::error::XiaomiError;
use crate::model::{Datagram, Model, Payload};

const VOLTAGE_MAX_MILLIVOLTS: i64 = 3100;
const VOLTAGE_MIN_MILLIVOLTS: i64 = 2700;
const BATTERY_LEVEL_LOW: i64 = 20;

const FULL_ON: &str = "255";
const FULL_OFF: &str = "0";

/// Battery percentage for a cell voltage.
///
/// Readings outside the 2700..=3100 mV range are clamped, so they report
/// 0 or 100 percent instead of an error.
#[must_use]
pub fn battery_percent(millivolts: i64) -> i64 {
    let clamped = millivolts.clamp(VOLTAGE_MIN_MILLIVOLTS, VOLTAGE_MAX_MILLIVOLTS);
    (clamped - VOLTAGE_MIN_MILLIVOLTS) * 100 / (VOLTAGE_MAX_MILLIVOLTS - VOLTAGE_MIN_MILLIVOLTS)
}

/// Format a reading with at least one fractional digit, so whole values
/// read `22.0` rather than `22`.
fn decimal(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// Handles datagrams of every gateway on the network.
pub struct ReportHandler<S, P> {
    registry: Arc<DeviceRegistry<S>>,
    publisher: P,
}

impl<S, P> ReportHandler<S, P>
where
    S: DeviceStore + Send + Sync,
    P: EventPublisher,
{
    pub fn new(registry: Arc<DeviceRegistry<S>>, publisher: P) -> Self {
        Self {
            registry,
            publisher,
        }
    }

    /// Process one raw datagram.
    ///
    /// # Errors
    ///
    /// Returns a [`XiaomiError`] when the datagram is malformed or the
    /// registry or bus rejects an update. Updates applied before the
    /// failure are kept.
    pub async fn handle_datagram(&self, bytes: &[u8]) -> Result<(), XiaomiError> {
        let datagram = Datagram::parse(bytes)?;
        if !datagram.is_state() {
            tracing::trace!(cmd = %datagram.cmd, sid = %datagram.sid, "ignoring gateway message");
            return Ok(());
        }
        self.handle_report(&datagram).await
    }

    /// Process a `report` or `heartbeat` message.
    ///
    /// # Errors
    ///
    /// See [`handle_datagram`](Self::handle_datagram).
    #[tracing::instrument(skip(self, datagram), fields(sid = %datagram.sid, model = %datagram.model))]
    pub async fn handle_report(&self, datagram: &Datagram) -> Result<(), XiaomiError> {
        let model = Model::from_name(&datagram.model);
        let device = self.ensure_device(&datagram.sid).await?;
        let device = self.classify(device, model).await?;
        let payload = datagram.payload()?;

        let mut report = Report {
            handler: self,
            device,
            metadata: serde_json::json!({ "model": datagram.model }),
        };
        match model {
            Model::TempHumiSensor => {
                report.hundredths(&payload, "temperature", names::DEVICE_TEMPERATURE).await?;
                report.hundredths(&payload, "humidity", names::DEVICE_HUMIDITY).await?;
            }
            Model::DoorSensor => {
                if let Some(status) = payload.text("status") {
                    let opened = (status == "open").to_string();
                    let topic = Topic::new("event.device.doorsensor")?.child(status)?;
                    report.record_if_changed("opened", &opened, ValueType::Bool, topic).await?;
                }
            }
            Model::Button => {
                if let Some(status) = payload.text("status") {
                    report
                        .record_if_changed("status", status, ValueType::String, Topic::new(names::DEVICE_BUTTON)?)
                        .await?;
                }
            }
            Model::FloodSensor => {
                if let Some(status) = payload.text("status") {
                    let leak = (status == "leak").to_string();
                    report
                        .record_if_changed("leak", &leak, ValueType::Bool, Topic::new(names::DEVICE_LEAK)?)
                        .await?;
                }
            }
            Model::Switch1Button | Model::WirelessSwitch1Button => {
                report.switch_channel(&payload, "channel_0", "level").await?;
            }
            Model::Switch2Buttons | Model::WirelessSwitch2Buttons => {
                report.switch_channel(&payload, "channel_0", "level_subchannel_1").await?;
                report.switch_channel(&payload, "channel_1", "level_subchannel_2").await?;
            }
            Model::MotionSensor | Model::AqaraMotionSensor => {
                if let Some(lux) = payload.int("lux") {
                    report
                        .record_if_changed("illuminance", &lux.to_string(), ValueType::Int, Topic::new("event.device.illuminance")?)
                        .await?;
                }
                if payload.text("status") == Some("motion") {
                    // every detection is an edge, even when the stored value is already true
                    report
                        .record("motion", "true", ValueType::Trigger, Topic::new(names::DEVICE_MOTION)?)
                        .await?;
                }
                if let Some(seconds) = payload.int("no_motion") {
                    report
                        .record_if_changed("no_motion", &seconds.to_string(), ValueType::Int, Topic::new("event.device.motion.absent")?)
                        .await?;
                }
            }
            Model::Gateway | Model::Unknown => {}
        }

        if let Some(millivolts) = payload.int("voltage") {
            report.voltage(millivolts).await?;
        }
        Ok(())
    }

    async fn ensure_device(&self, sid: &str) -> Result<Device, XiaomiError> {
        if let Some(device) = self.registry.get_device(SourceProtocol::Xiaomi, sid) {
            return Ok(device);
        }
        let key = DeviceKey::new(SourceProtocol::Xiaomi, sid);
        let device = self
            .registry
            .add_or_update_device(
                Device::builder()
                    .key(key.clone())
                    .manufacturer("Xiaomi")
                    .state(DeviceState::Active)
                    .build()?,
            )
            .await?;
        self.publisher.publish(
            Topic::new(names::DEVICE_ADDED)?,
            BusMessage::protocol(&key, labels::DEVICE_ADDED),
        )?;
        tracing::info!(device = %key, "xiaomi device added");
        Ok(device)
    }

    async fn classify(&self, device: Device, model: Model) -> Result<Device, XiaomiError> {
        if device.device_type != DeviceType::Unknown {
            return Ok(device);
        }
        let Some((device_type, product_name)) = model.classify() else {
            return Ok(device);
        };
        let key = device.key();
        let update = Device {
            device_type,
            product_name: Some(product_name.to_string()),
            ..device
        };
        let device = self.registry.add_or_update_device(update).await?;
        self.publisher.publish(
            Topic::new(names::DEVICE_UPDATED)?,
            BusMessage::protocol(&key, labels::DEVICE_UPDATED),
        )?;
        tracing::info!(device = %key, ?device_type, product_name, "xiaomi device classified");
        Ok(device)
    }
}

/// Per-report state: the device as last written and the change metadata.
struct Report<'a, S, P> {
    handler: &'a ReportHandler<S, P>,
    device: Device,
    metadata: serde_json::Value,
}

impl<S, P> Report<'_, S, P>
where
    S: DeviceStore + Send + Sync,
    P: EventPublisher,
{
    async fn record(
        &mut self,
        value_name: &str,
        raw: &str,
        value_type: ValueType,
        topic: Topic,
    ) -> Result<(), XiaomiError> {
        let key = self.device.key();
        let value = self
            .handler
            .registry
            .add_change_with_metadata(&key, value_name, raw, value_type, Some(self.metadata.clone()))
            .await?;
        self.device.values.insert(value_name.to_string(), value);
        self.handler
            .publisher
            .publish(topic, BusMessage::change(&key, value_name, raw, value_type))?;
        tracing::info!(device = %key, value = value_name, raw, "value reported");
        Ok(())
    }

    async fn record_if_changed(
        &mut self,
        value_name: &str,
        raw: &str,
        value_type: ValueType,
        topic: Topic,
    ) -> Result<(), XiaomiError> {
        let current = self.device.value(value_name).and_then(|v| v.current_value());
        if current == Some(raw) {
            return Ok(());
        }
        self.record(value_name, raw, value_type, topic).await
    }

    /// Values sent in hundredths, such as `2250` for 22.5 °C.
    async fn hundredths(&mut self, payload: &Payload, field: &str, topic: &str) -> Result<(), XiaomiError> {
        let Some(raw) = payload.int(field) else {
            return Ok(());
        };
        #[allow(clippy::cast_precision_loss)]
        let value = decimal(raw as f64 / 100.0);
        self.record_if_changed(field, &value, ValueType::Double, Topic::new(topic)?)
            .await
    }

    async fn switch_channel(&mut self, payload: &Payload, field: &str, value_name: &str) -> Result<(), XiaomiError> {
        let Some(state) = payload.text(field) else {
            return Ok(());
        };
        let level = if state == "on" { FULL_ON } else { FULL_OFF };
        let topic = Topic::new("event.device")?.child(state)?;
        self.record_if_changed(value_name, level, ValueType::Byte, topic)
            .await
    }

    async fn voltage(&mut self, millivolts: i64) -> Result<(), XiaomiError> {
        let key = self.device.key();
        let percent = battery_percent(millivolts);
        if percent <= BATTERY_LEVEL_LOW {
            self.handler.publisher.publish(
                Topic::new(names::DEVICE_BATTERY)?,
                BusMessage::protocol(&key, labels::BATTERY_LOW),
            )?;
            tracing::warn!(device = %key, percent, "battery low");
        }

        #[allow(clippy::cast_precision_loss)]
        let volts = decimal(millivolts as f64 / 1000.0);
        self.record_if_changed("voltage", &volts, ValueType::Double, Topic::new(names::DEVICE_VOLTAGE)?)
            .await
    }
}
