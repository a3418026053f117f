//! UDP (datagram) session.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::base::neterror::Error;
use crate::base::timed::{Deadline, TimedRuntime};
use crate::socket::{Endpoint, EstablishSession, SessionConfig, Transport, TransportStream};

/// Deadline-bounded connected UDP socket.
///
/// Same shape as [`super::TcpSession`] minus the partial-transfer surface:
/// `send` and `receive` move a single datagram each.
#[derive(Debug)]
pub struct UdpSession {
    rt: TimedRuntime,
    socket: Option<UdpSocket>,
    peer: SocketAddr,
    io_timeout: Duration,
    io_timeout_on: bool,
}

impl UdpSession {
    /// Bind an ephemeral local port of the matching family and connect it
    /// to `endpoint`.
    pub fn connect(
        endpoint: &Endpoint,
        deadline: impl Into<Deadline>,
        operation_timeout: Duration,
    ) -> Result<Self, Error> {
        if endpoint.transport != Transport::Udp {
            return Err(Error::WrongProtocolType);
        }
        let rt = TimedRuntime::new()?;
        let local: SocketAddr = if endpoint.addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = rt.run_until(deadline.into(), async {
            let socket = UdpSocket::bind(local).await?;
            socket.connect(endpoint.addr).await?;
            Ok::<_, std::io::Error>(socket)
        })??;

        Ok(UdpSession {
            rt,
            socket: Some(socket),
            peer: endpoint.addr,
            io_timeout: operation_timeout,
            io_timeout_on: true,
        })
    }

    /// Remote endpoint this session was connected to.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Local endpoint of the open socket, `None` once closed.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|socket| socket.local_addr().ok())
    }

    /// Replace the default I/O timeout, returning the previous value.
    pub fn set_io_timeout(&mut self, new_timeout: Duration) -> Duration {
        std::mem::replace(&mut self.io_timeout, new_timeout)
    }

    /// Current default I/O timeout, `None` when disabled.
    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_on.then_some(self.io_timeout)
    }
}

impl TransportStream for UdpSession {
    /// Send `data` as one datagram.
    fn send(&mut self, data: &[u8], deadline: Deadline) -> Result<usize, Error> {
        let result = {
            let socket = self.socket.as_ref().ok_or(Error::BadDescriptor)?;
            self.rt.run_until(deadline, socket.send(data))
        };
        match result {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(err)) => Err(err.into()),
            Err(timeout) => {
                self.socket = None;
                Err(timeout)
            }
        }
    }

    /// Receive one datagram into `data`, returning its length.
    fn receive(&mut self, data: &mut [u8], deadline: Deadline) -> Result<usize, Error> {
        let result = {
            let socket = self.socket.as_ref().ok_or(Error::BadDescriptor)?;
            self.rt.run_until(deadline, socket.recv(data))
        };
        match result {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(err)) => Err(err.into()),
            Err(timeout) => {
                self.socket = None;
                Err(timeout)
            }
        }
    }

    fn close(&mut self) -> Result<(), Error> {
        // No shutdown sequence for datagrams; dropping releases the handle.
        self.socket = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn io_deadline(&self) -> Deadline {
        if self.io_timeout_on {
            Deadline::from(self.io_timeout)
        } else {
            Deadline::Never
        }
    }
}

impl EstablishSession for UdpSession {
    const TRANSPORT: Transport = Transport::Udp;

    fn establish(
        config: &SessionConfig,
        endpoint: &Endpoint,
        deadline: Deadline,
    ) -> Result<Self, Error> {
        UdpSession::connect(endpoint, deadline, config.operation_timeout)
    }

    fn is_open(&self) -> bool {
        TransportStream::is_open(self)
    }
}
