//! Xiaomi gateway integration configuration.

use std::net::{Ipv4Addr, SocketAddr};

use serde::Deserialize;

/// Configuration for the Xiaomi gateway listener.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct XiaomiConfig {
    /// Start the listener at all.
    pub enabled: bool,
    /// Local address the UDP socket binds to.
    pub bind: String,
    /// Multicast group gateways report to. `None` listens for unicast only.
    pub multicast_group: Option<Ipv4Addr>,
    /// Unicast address device commands are written to. Without it, commands
    /// are logged and dropped.
    pub gateway: Option<SocketAddr>,
}

impl Default for XiaomiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: "0.0.0.0:9898".to_string(),
            multicast_group: Some(Ipv4Addr::new(224, 0, 0, 50)),
            gateway: None,
        }
    }
}
