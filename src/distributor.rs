//! UDP multicast transport for pattern broadcasts
//!
//! One [`Distributor`] wraps one socket bound to one address/port pair.
//! The authoring side opens a publisher and sends full pattern snapshots;
//! each client opens a subscriber, which joins the multicast group on
//! construction and leaves it on [`Distributor::close`] or drop.
//!
//! Delivery is best-effort: no acknowledgement, no retry, no ordering. Every
//! datagram is a complete snapshot, so the latest one applied wins.
//!
//! Non-multicast addresses are accepted too (no membership is taken), which
//! lets two processes on one host, or a test, talk over plain unicast.
//!
//! Multicast subscribers share their port: several clients on one host can
//! listen to the same group at once.

use crate::error::{Error, Result};
use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// Default multicast group and port
pub const DEFAULT_GROUP: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(224, 2, 2, 3), 9999);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Publisher,
    Subscriber,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::Publisher => "publisher",
            Role::Subscriber => "subscriber",
        }
    }
}

/// Socket plus (optional) multicast membership for one logical bus
#[derive(Debug)]
pub struct Distributor {
    socket: UdpSocket,
    role: Role,
    target: SocketAddrV4,
    membership: Option<(Ipv4Addr, Ipv4Addr)>,
}

impl Distributor {
    /// Open a sending socket for `target`
    ///
    /// Multicast datagrams are kept on the local segment (TTL 1) and looped
    /// back so clients on the authoring host see them too.
    pub async fn publisher(target: SocketAddrV4) -> Result<Self> {
        let local = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| Error::Bind {
                role: Role::Publisher.as_str(),
                addr: local,
                source,
            })?;

        if target.ip().is_multicast() {
            socket.set_multicast_ttl_v4(1)?;
            socket.set_multicast_loop_v4(true)?;
        }

        info!("Publishing patterns to {}", target);
        Ok(Self {
            socket,
            role: Role::Publisher,
            target,
            membership: None,
        })
    }

    /// Open a receiving socket for `addr`, joining the group on `interface`
    /// when `addr` is multicast
    pub async fn subscriber(addr: SocketAddrV4, interface: Ipv4Addr) -> Result<Self> {
        let (bind, membership) = if addr.ip().is_multicast() {
            (
                SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, addr.port()),
                Some((*addr.ip(), interface)),
            )
        } else {
            (addr, None)
        };

        let bound = if membership.is_some() {
            shared_socket(bind).and_then(UdpSocket::from_std)
        } else {
            UdpSocket::bind(bind).await
        };
        let socket = bound.map_err(|source| Error::Bind {
            role: Role::Subscriber.as_str(),
            addr: bind,
            source,
        })?;

        if let Some((group, iface)) = membership {
            socket
                .join_multicast_v4(group, iface)
                .map_err(|source| Error::Join {
                    group: addr,
                    interface: iface,
                    source,
                })?;
            info!("Joined multicast group {} on {}", addr, iface);
        } else {
            info!("Listening for patterns on {}", socket.local_addr()?);
        }

        Ok(Self {
            socket,
            role: Role::Subscriber,
            target: addr,
            membership,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Address datagrams are sent to / received for
    pub fn target(&self) -> SocketAddrV4 {
        self.target
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Send one datagram; failures are returned, never retried
    pub async fn send(&self, bytes: &[u8]) -> Result<usize> {
        self.socket
            .send_to(bytes, self.target)
            .await
            .map_err(|source| Error::Send {
                addr: self.target,
                source,
            })
    }

    /// Block until one datagram arrives
    ///
    /// Datagrams larger than `buf` are truncated to its length.
    pub async fn receive(&self, buf: &mut [u8]) -> Result<usize> {
        let (len, from) = self.socket.recv_from(buf).await.map_err(Error::Receive)?;
        debug!("Received {} bytes from {}", len, from);
        Ok(len)
    }

    /// Leave the group and release the socket
    pub fn close(mut self) -> Result<()> {
        self.leave()
    }

    fn leave(&mut self) -> Result<()> {
        if let Some((group, iface)) = self.membership.take() {
            self.socket.leave_multicast_v4(group, iface)?;
            debug!("Left multicast group {}", group);
        }
        Ok(())
    }
}

/// Anything the player can pull pattern datagrams from
#[async_trait]
pub trait DatagramSource: Send + Sync + 'static {
    /// Wait for the next datagram and copy it into `buf`
    async fn next_datagram(&self, buf: &mut [u8]) -> Result<usize>;
}

#[async_trait]
impl DatagramSource for Distributor {
    async fn next_datagram(&self, buf: &mut [u8]) -> Result<usize> {
        self.receive(buf).await
    }
}

/// Group listeners bind with address (and, on unix, port) reuse so other
/// clients on the host can bind the same group port
fn shared_socket(bind: SocketAddrV4) -> io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.bind(&SocketAddr::V4(bind).into())?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

impl Drop for Distributor {
    fn drop(&mut self) {
        if let Err(e) = self.leave() {
            warn!("Could not leave multicast group {}: {}", self.target, e);
        }
    }
}
