//! Plain TCP session.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::base::logger::log_debug;
use crate::base::neterror::Error;
use crate::base::timed::{Deadline, TimedRuntime};
use crate::socket::{
    Endpoint, EstablishSession, SessionConfig, StreamSocket, Transport, TransportStream,
};

/// Deadline-bounded TCP client socket.
///
/// Owns its handle and its reactor; move-only. Not thread-safe: concurrent
/// operations on one session are a usage error the `&mut self` receivers
/// rule out.
#[derive(Debug)]
pub struct TcpSession {
    rt: TimedRuntime,
    stream: Option<TcpStream>,
    peer: SocketAddr,
    io_timeout: Duration,
    io_timeout_on: bool,
}

impl TcpSession {
    /// Connect to `endpoint`, bounded by `deadline`. I/O timeouts do not
    /// apply during connect. On success the socket gets keep-alive,
    /// no-delay and, where available, quick-ack.
    pub fn connect(
        endpoint: &Endpoint,
        deadline: impl Into<Deadline>,
        operation_timeout: Duration,
    ) -> Result<Self, Error> {
        if endpoint.transport != Transport::Tcp {
            return Err(Error::WrongProtocolType);
        }
        let rt = TimedRuntime::new()?;
        let stream = rt.run_until(deadline.into(), TcpStream::connect(endpoint.addr))??;
        apply_stream_options(&stream)?;

        Ok(TcpSession {
            rt,
            stream: Some(stream),
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
        self.stream.as_ref().and_then(|stream| stream.local_addr().ok())
    }

    /// Replace the default I/O timeout, returning the previous value.
    pub fn set_io_timeout(&mut self, new_timeout: Duration) -> Duration {
        std::mem::replace(&mut self.io_timeout, new_timeout)
    }

    /// Enable or disable the default I/O timeout, returning the previous
    /// state. Disabled means unbounded blocking for calls that rely on it.
    pub fn set_io_timeout_enabled(&mut self, enabled: bool) -> bool {
        std::mem::replace(&mut self.io_timeout_on, enabled)
    }

    /// Current default I/O timeout, `None` when disabled.
    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_on.then_some(self.io_timeout)
    }
}

impl TransportStream for TcpSession {
    fn send(&mut self, data: &[u8], deadline: Deadline) -> Result<usize, Error> {
        let result = {
            let stream = self.stream.as_mut().ok_or(Error::BadDescriptor)?;
            self.rt.run_until(deadline, stream.write_all(data))
        };
        match result {
            Ok(Ok(())) => Ok(data.len()),
            Ok(Err(err)) => Err(err.into()),
            Err(timeout) => {
                // Deadline fired mid-write: close the handle, the stream
                // position is indeterminate.
                self.stream = None;
                Err(timeout)
            }
        }
    }

    fn receive(&mut self, data: &mut [u8], deadline: Deadline) -> Result<usize, Error> {
        let result = {
            let stream = self.stream.as_mut().ok_or(Error::BadDescriptor)?;
            self.rt.run_until(deadline, stream.read_exact(data))
        };
        match result {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(err)) => Err(err.into()),
            Err(timeout) => {
                self.stream = None;
                Err(timeout)
            }
        }
    }

    fn close(&mut self) -> Result<(), Error> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        // Graceful FIN first; NotConnected here means the peer beat us to
        // it, which counts as success. The handle itself closes on drop.
        match self.rt.run_until(self.io_deadline(), stream.shutdown()) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            Ok(Err(err)) => Err(err.into()),
            Err(timeout) => Err(timeout),
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn io_deadline(&self) -> Deadline {
        if self.io_timeout_on {
            Deadline::from(self.io_timeout)
        } else {
            Deadline::Never
        }
    }
}

impl StreamSocket for TcpSession {
    fn write_some(&mut self, data: &[u8], deadline: Deadline) -> Result<usize, Error> {
        let result = {
            let stream = self.stream.as_mut().ok_or(Error::BadDescriptor)?;
            self.rt.run_until(deadline, stream.write(data))
        };
        match result {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(err)) => Err(err.into()),
            Err(timeout) => {
                self.stream = None;
                Err(timeout)
            }
        }
    }

    fn read_some(&mut self, data: &mut [u8], deadline: Deadline) -> Result<usize, Error> {
        let result = {
            let stream = self.stream.as_mut().ok_or(Error::BadDescriptor)?;
            self.rt.run_until(deadline, stream.read(data))
        };
        match result {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(err)) => Err(err.into()),
            Err(timeout) => {
                self.stream = None;
                Err(timeout)
            }
        }
    }
}

impl EstablishSession for TcpSession {
    const TRANSPORT: Transport = Transport::Tcp;

    fn establish(
        config: &SessionConfig,
        endpoint: &Endpoint,
        deadline: Deadline,
    ) -> Result<Self, Error> {
        TcpSession::connect(endpoint, deadline, config.operation_timeout)
    }

    fn is_open(&self) -> bool {
        TransportStream::is_open(self)
    }
}

impl Drop for TcpSession {
    fn drop(&mut self) {
        if self.stream.is_some() {
            if let Err(err) = TransportStream::close(self) {
                log_debug!("closing session to {}: {}", self.peer, err);
            }
        }
    }
}

/// Keep-alive, no-delay and (Linux) quick-ack, as for any freshly
/// connected client stream.
pub(crate) fn apply_stream_options(stream: &TcpStream) -> Result<(), Error> {
    stream.set_nodelay(true)?;
    let sock = socket2::SockRef::from(stream);
    sock.set_keepalive(true)?;
    #[cfg(target_os = "linux")]
    sock.set_quickack(true)?;
    Ok(())
}

/// Async connect helper shared with the TLS layer, which wraps the raw
/// stream before it ever becomes a `TcpSession`.
pub(crate) async fn connect_raw(addr: SocketAddr) -> io::Result<TcpStream> {
    TcpStream::connect(addr).await
}
