//! UDP listener feeding gateway datagrams to a [`ReportHandler`].

use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use homebus_app::ports::{DeviceStore, EventPublisher};

use crate::config::XiaomiConfig;
use crate::error::XiaomiError;
use crate::handler::ReportHandler;

// gateway datagrams stay well below one ethernet frame
const MAX_DATAGRAM: usize = 2048;

/// Bind the gateway socket and join the multicast group if configured.
///
/// # Errors
///
/// Returns [`XiaomiError::Io`] when the socket cannot be bound or the group
/// cannot be joined.
pub async fn bind(config: &XiaomiConfig) -> Result<UdpSocket, XiaomiError> {
    let socket = UdpSocket::bind(&config.bind).await?;
    if let Some(group) = config.multicast_group {
        socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?;
    }
    tracing::info!(address = %socket.local_addr()?, "xiaomi listener bound");
    Ok(socket)
}

/// Receive datagrams until the task is aborted.
///
/// Handler failures are logged per datagram; only the task's abort stops it.
/// The socket is shared with the [`CommandWriter`](crate::command::CommandWriter).
pub fn spawn<S, P>(socket: Arc<UdpSocket>, handler: Arc<ReportHandler<S, P>>) -> JoinHandle<()>
where
    S: DeviceStore + Send + Sync + 'static,
    P: EventPublisher + 'static,
{
    tokio::spawn(async move {
        let mut buffer = vec![0_u8; MAX_DATAGRAM];
        loop {
            let (len, peer) = match socket.recv_from(&mut buffer).await {
                Ok(received) => received,
                Err(err) => {
                    tracing::error!(error = %err, "xiaomi socket receive failed");
                    continue;
                }
            };
            if let Err(err) = handler.handle_datagram(&buffer[..len]).await {
                tracing::warn!(%peer, error = %err, "xiaomi datagram rejected");
            }
        }
    })
}
