//! TLS-over-TCP session (BoringSSL).

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use boring::ssl::{SslConnector, SslMethod, SslVerifyMode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_boring::SslStream;

use crate::base::logger::log_debug;
use crate::base::neterror::Error;
use crate::base::timed::{Deadline, TimedRuntime};
use crate::socket::stream::{apply_stream_options, connect_raw};
use crate::socket::{
    Endpoint, EstablishSession, SessionConfig, StreamSocket, Transport, TransportStream,
};

/// Deadline-bounded TLS client stream.
///
/// TCP connect and TLS handshake share a single connect deadline. The
/// certificate chain is checked against the system trust anchors and the
/// hostname per RFC 2818 unless verification is disabled.
#[derive(Debug)]
pub struct TlsSession {
    rt: TimedRuntime,
    stream: Option<SslStream<TcpStream>>,
    peer: SocketAddr,
    io_timeout: Duration,
    io_timeout_on: bool,
}

impl TlsSession {
    /// Connect and handshake with `endpoint`, presenting `upstream_host`
    /// as SNI and verifying the peer certificate against it when `verify`
    /// is set.
    pub fn connect(
        endpoint: &Endpoint,
        deadline: impl Into<Deadline>,
        operation_timeout: Duration,
        upstream_host: &str,
        verify: bool,
    ) -> Result<Self, Error> {
        if endpoint.transport != Transport::Tcp {
            return Err(Error::WrongProtocolType);
        }
        let rt = TimedRuntime::new()?;
        let deadline = deadline.into();

        let mut builder = SslConnector::builder(SslMethod::tls())
            .map_err(|err| Error::HandshakeProtocol(err.to_string()))?;
        if !verify {
            builder.set_verify(SslVerifyMode::NONE);
        }
        let connector = builder.build();
        let mut config = connector
            .configure()
            .map_err(|err| Error::HandshakeProtocol(err.to_string()))?;
        if !verify {
            config.set_verify_hostname(false);
        }

        let addr = endpoint.addr;
        let host = upstream_host.to_owned();
        let stream = rt.run_until(deadline, async move {
            let tcp = connect_raw(addr).await.map_err(Error::from)?;
            apply_stream_options(&tcp)?;
            tokio_boring::connect(config, &host, tcp)
                .await
                .map_err(classify_handshake)
        })??;

        Ok(TlsSession {
            rt,
            stream: Some(stream),
            peer: addr,
            io_timeout: operation_timeout,
            io_timeout_on: true,
        })
    }

    /// Remote endpoint this session was connected to.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Replace the default I/O timeout, returning the previous value.
    pub fn set_io_timeout(&mut self, new_timeout: Duration) -> Duration {
        std::mem::replace(&mut self.io_timeout, new_timeout)
    }

    /// Enable or disable the default I/O timeout, returning the previous
    /// state.
    pub fn set_io_timeout_enabled(&mut self, enabled: bool) -> bool {
        std::mem::replace(&mut self.io_timeout_on, enabled)
    }

    /// Current default I/O timeout, `None` when disabled.
    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_on.then_some(self.io_timeout)
    }
}

impl TransportStream for TlsSession {
    fn send(&mut self, data: &[u8], deadline: Deadline) -> Result<usize, Error> {
        let result = {
            let stream = self.stream.as_mut().ok_or(Error::BadDescriptor)?;
            self.rt.run_until(deadline, stream.write_all(data))
        };
        match result {
            Ok(Ok(())) => Ok(data.len()),
            Ok(Err(err)) => Err(err.into()),
            Err(timeout) => {
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
        // TLS shutdown; peers routinely skip close_notify, so a truncated
        // stream counts as a clean close.
        match self.rt.run_until(self.io_deadline(), stream.shutdown()) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) if shutdown_is_benign(&err) => Ok(()),
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

impl StreamSocket for TlsSession {
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

impl EstablishSession for TlsSession {
    const TRANSPORT: Transport = Transport::Tcp;

    fn establish(
        config: &SessionConfig,
        endpoint: &Endpoint,
        deadline: Deadline,
    ) -> Result<Self, Error> {
        TlsSession::connect(
            endpoint,
            deadline,
            config.operation_timeout,
            &config.host,
            config.tls_verify,
        )
    }

    fn is_open(&self) -> bool {
        TransportStream::is_open(self)
    }
}

impl Drop for TlsSession {
    fn drop(&mut self) {
        if self.stream.is_some() {
            if let Err(err) = TransportStream::close(self) {
                log_debug!("closing TLS session to {}: {}", self.peer, err);
            }
        }
    }
}

fn classify_handshake(err: tokio_boring::HandshakeError<TcpStream>) -> Error {
    let text = format!("{err:?}");
    if text.contains("certificate verify failed") || text.contains("CERTIFICATE_VERIFY_FAILED") {
        Error::HandshakeVerification(text)
    } else {
        Error::HandshakeProtocol(text)
    }
}

fn shutdown_is_benign(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof | io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe
    )
}
