//! Turns device commands published on the bus into gateway `write` datagrams.
//!
//! Only commands for [`SourceProtocol::Xiaomi`] devices are handled. `TurnOn`
//! and `TurnOff` switch `channel_0`, or `channel_<n-1>` when the command data
//! carries `{"subchannel": n}` (two-button switches).

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;

use homebus_app::event_bus::InProcessEventBus;
use homebus_app::ports::Delivery;
use homebus_domain::bus::{BusMessage, DeviceCommandEvent, commands};
use homebus_domain::error::HubError;
use homebus_domain::protocol::SourceProtocol;
use homebus_domain::topic::names;

use crate::error::XiaomiError;
use crate::model::WriteRequest;

/// Writes device commands to the gateway.
pub struct CommandWriter {
    socket: Arc<UdpSocket>,
    gateway: Option<SocketAddr>,
}

impl CommandWriter {
    /// `socket` is usually the listener's socket, shared so that replies
    /// come back to the bound port.
    #[must_use]
    pub fn new(socket: Arc<UdpSocket>, gateway: Option<SocketAddr>) -> Self {
        Self { socket, gateway }
    }

    /// Send the gateway write for `command`.
    ///
    /// Returns whether a datagram was sent. Commands for other protocols,
    /// unsupported labels, and a missing gateway address are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`XiaomiError::Command`] for an invalid subchannel and
    /// [`XiaomiError::Io`] when the datagram cannot be sent.
    #[tracing::instrument(skip_all, fields(sid = %command.channel, label = %command.label))]
    pub async fn handle_command(&self, command: &DeviceCommandEvent) -> Result<bool, XiaomiError> {
        if command.protocol != SourceProtocol::Xiaomi {
            return Ok(false);
        }
        let on = match command.label.as_str() {
            commands::TURN_ON => true,
            commands::TURN_OFF => false,
            _ => {
                tracing::info!("unsupported xiaomi command");
                return Ok(false);
            }
        };
        let channel = relay_channel(command)?;
        let Some(gateway) = self.gateway else {
            tracing::error!("no xiaomi gateway configured, command dropped");
            return Ok(false);
        };

        let request = WriteRequest::switch(command.channel.clone(), &channel, on);
        self.socket.send_to(&request.to_bytes()?, gateway).await?;
        tracing::info!(%gateway, %channel, on, "xiaomi command written");
        Ok(true)
    }

    /// Handle every `command.device` and `command.device.<protocol>` message of `bus`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::BusClosed`] when the bus is shutting down.
    pub fn subscribe(self: &Arc<Self>, bus: &InProcessEventBus) -> Result<(), HubError> {
        for pattern in [names::COMMAND_DEVICE, names::ALL_DEVICE_COMMANDS] {
            let writer = Arc::clone(self);
            bus.subscribe(pattern, move |delivery: Delivery| {
                let writer = Arc::clone(&writer);
                async move {
                    if let BusMessage::Command(command) = &delivery.message
                        && let Err(err) = writer.handle_command(command).await
                    {
                        tracing::warn!(topic = %delivery.topic, error = %err, "xiaomi command rejected");
                    }
                    Ok::<(), HubError>(())
                }
            })?;
        }
        Ok(())
    }
}

fn relay_channel(command: &DeviceCommandEvent) -> Result<String, XiaomiError> {
    let Some(subchannel) = command.data.get("subchannel") else {
        return Ok("channel_0".to_string());
    };
    match subchannel.as_u64() {
        Some(n) if n >= 1 => Ok(format!("channel_{}", n - 1)),
        _ => Err(XiaomiError::Command {
            sid: command.channel.clone(),
            reason: "subchannel must be 1 or greater",
        }),
    }
}
