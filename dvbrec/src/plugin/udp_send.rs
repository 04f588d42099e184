//! Sends the stream as UDP datagrams, unicast or multicast.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use dns_lookup::lookup_host;
use log::{debug, info};

use super::OutputPlugin;
use crate::error::PluginError;

/// Largest datagram payload sent.
pub const MAX_DATAGRAM_SIZE: usize = 1400;

pub struct UdpSend {
    name: String,
    socket: UdpSocket,
    target: SocketAddr,
    buffer: Vec<u8>,
    sent: u64,
}

/// Split `host:port` or `host/port`. IPv6 literals need brackets with `:`.
fn split_address(address: &str) -> Result<(&str, u16), PluginError> {
    let invalid = || PluginError::InvalidAddress(address.to_string());
    let (host, port) = address
        .rsplit_once('/')
        .or_else(|| address.rsplit_once(':'))
        .ok_or_else(invalid)?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    Ok((host, port))
}

fn resolve(host: &str) -> Result<IpAddr, PluginError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    let addrs = lookup_host(host).map_err(|e| {
        debug!("[UdpSend] lookup of {} failed: {}", host, e);
        PluginError::Resolve(host.to_string())
    })?;
    addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| PluginError::Resolve(host.to_string()))
}

impl UdpSend {
    /// Resolve `address` and open a socket sending to it.
    ///
    /// For a multicast group the socket joins the group and enables loopback
    /// so local receivers see the stream too.
    pub fn connect(address: &str) -> Result<Self, PluginError> {
        let (host, port) = split_address(address)?;
        let ip = resolve(host)?;
        let target = SocketAddr::new(ip, port);
        let name = format!("udpsend:{}", target);
        let io_err = |e| PluginError::io(name.clone(), e);

        let socket = match ip {
            IpAddr::V4(group) => {
                let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(io_err)?;
                if group.is_multicast() {
                    socket
                        .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
                        .map_err(io_err)?;
                    socket.set_multicast_loop_v4(true).map_err(io_err)?;
                }
                socket
            }
            IpAddr::V6(group) => {
                let socket = UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0)).map_err(io_err)?;
                if group.is_multicast() {
                    socket.join_multicast_v6(&group, 0).map_err(io_err)?;
                    socket.set_multicast_loop_v6(true).map_err(io_err)?;
                }
                socket
            }
        };

        info!(
            "[UdpSend] Sending to {}{}",
            target,
            if ip.is_multicast() { " (multicast)" } else { "" }
        );
        Ok(Self {
            name,
            socket,
            target,
            buffer: Vec::new(),
            sent: 0,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Bytes sent so far.
    pub fn bytes_sent(&self) -> u64 {
        self.sent
    }
}

impl OutputPlugin for UdpSend {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_data(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Send everything buffered. On a send error the rest of the buffer is
    /// discarded; a live stream cannot catch up on it.
    fn process_data(&mut self) -> Result<(), PluginError> {
        let data = std::mem::take(&mut self.buffer);
        for datagram in data.chunks(MAX_DATAGRAM_SIZE) {
            self.socket
                .send_to(datagram, self.target)
                .map_err(|e| PluginError::io(self.name.clone(), e))?;
            self.sent += datagram.len() as u64;
        }
        Ok(())
    }
}
