// THEORY:
// The `transport` module owns the outbound UDP socket. It binds once at
// startup, resolves the destination once, and then fires one datagram per
// message with no acknowledgement, retry or queueing.
//
// A bind failure is reported as `TransportBind`, which the binary treats as
// fatal. A failed individual send is reported as `Transport`, which the tick
// loop logs and moves past.

use crate::config::TransportConfig;
use crate::core_modules::motion_signal::MotionSignal;
use crate::error::{MotionError, MotionResult};
use crate::osc::OscMessage;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// Connectionless OSC sender bound to a local port.
#[derive(Debug)]
pub struct OscSender {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl OscSender {
    /// Binds `0.0.0.0:local_port` and resolves `dest_host:dest_port` to its
    /// first IPv4 address.
    pub async fn bind(local_port: u16, dest_host: &str, dest_port: u16) -> MotionResult<Self> {
        let local = format!("0.0.0.0:{}", local_port);
        let socket = UdpSocket::bind(&local)
            .await
            .map_err(|source| MotionError::TransportBind {
                address: local.clone(),
                source,
            })?;

        let remote = format!("{}:{}", dest_host, dest_port);
        let destination = tokio::net::lookup_host(&remote)
            .await
            .map_err(|source| MotionError::TransportBind {
                address: remote.clone(),
                source,
            })?
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| MotionError::TransportBind {
                address: remote.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "destination resolved to no IPv4 addresses",
                ),
            })?;

        info!(local = %local, destination = %destination, "OSC sender bound");
        Ok(Self {
            socket,
            destination,
        })
    }

    pub async fn from_config(config: &TransportConfig) -> MotionResult<Self> {
        Self::bind(config.local_port, &config.dest_host, config.dest_port).await
    }

    pub fn local_addr(&self) -> MotionResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    pub async fn send(&self, message: &OscMessage) -> MotionResult<()> {
        let packet = message.encode();
        let sent = self
            .socket
            .send_to(&packet, self.destination)
            .await
            .map_err(|e| {
                MotionError::transport(format!(
                    "send of {} to {} failed: {}",
                    message.address(),
                    self.destination,
                    e
                ))
            })?;
        if sent != packet.len() {
            return Err(MotionError::transport(format!(
                "short send of {}: {} of {} bytes",
                message.address(),
                sent,
                packet.len()
            )));
        }
        debug!(address = message.address(), bytes = sent, "sent OSC message");
        Ok(())
    }

    /// Sends the three-float dominant-cell message.
    pub async fn send_signal(&self, address: &str, signal: &MotionSignal) -> MotionResult<()> {
        self.send(&signal.to_osc(address)?).await
    }

    /// Sends a single-float message such as elapsed frames or seconds.
    pub async fn send_float(&self, address: &str, value: f32) -> MotionResult<()> {
        self.send(&OscMessage::single_float(address, value)?).await
    }
}
