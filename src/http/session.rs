//! HTTP/1.1 session over any stream socket.

use bytes::{Bytes, BytesMut};
use http::{Request, Response};

use crate::base::neterror::Error;
use crate::base::timed::Deadline;
use crate::http::codec::{RequestSerializer, ResponseParser};
use crate::socket::{Endpoint, EstablishSession, SessionConfig, StreamSocket, Transport};

/// Default cap for the response header section.
pub const DEFAULT_HEADER_LIMIT: usize = 64 * 1024;
/// Default cap for the response body.
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Writable region prepared per read, bounded to keep single reads cheap.
const READ_REGION: usize = 64 * 1024;

/// HTTP/1.1 request/response framing over a stream socket.
///
/// The receive buffer is allocated once per session, sized to
/// `header_limit + body_limit`, and reused across requests on the same
/// session; overflowing either limit fails the request with
/// [`Error::BufferOverflow`].
pub struct HttpSession<S> {
    stream: S,
    header_limit: usize,
    body_limit: usize,
    buffer: BytesMut,
}

impl<S: StreamSocket> HttpSession<S> {
    /// Wrap `stream` with the default receive limits.
    pub fn new(stream: S) -> Self {
        HttpSession::with_limits(stream, DEFAULT_HEADER_LIMIT, DEFAULT_BODY_LIMIT)
    }

    /// Wrap `stream` with explicit receive limits.
    pub fn with_limits(stream: S, header_limit: usize, body_limit: usize) -> Self {
        HttpSession {
            stream,
            header_limit,
            body_limit,
            buffer: BytesMut::with_capacity(header_limit + body_limit),
        }
    }

    /// Send `request` and receive its response, both bounded by one
    /// deadline.
    pub fn perform(
        &mut self,
        request: &Request<Bytes>,
        deadline: impl Into<Deadline>,
    ) -> Result<Response<Bytes>, Error> {
        let deadline = deadline.into();
        self.send_request(request, deadline)?;
        self.recv_response(deadline)
    }

    /// [`Self::perform`] bounded by the stream's default I/O timeout.
    pub fn perform_default(&mut self, request: &Request<Bytes>) -> Result<Response<Bytes>, Error> {
        let deadline = self.stream.io_deadline();
        self.perform(request, deadline)
    }

    /// Serialize and write `request`, advancing by the bytes each
    /// `write_some` actually moved. The deadline spans the whole call.
    pub fn send_request(
        &mut self,
        request: &Request<Bytes>,
        deadline: impl Into<Deadline>,
    ) -> Result<(), Error> {
        let deadline = deadline.into();
        let mut serializer = RequestSerializer::new(request);
        loop {
            let written = {
                let Some(chunk) = serializer.next_chunk() else {
                    break;
                };
                self.stream.write_some(chunk, deadline)?
            };
            if written == 0 {
                return Err(Error::BrokenPipe);
            }
            serializer.advance(written);
        }
        Ok(())
    }

    /// Drive the incremental parser over deadline-bounded reads until a
    /// complete response is assembled.
    pub fn recv_response(
        &mut self,
        deadline: impl Into<Deadline>,
    ) -> Result<Response<Bytes>, Error> {
        let deadline = deadline.into();
        let mut parser = ResponseParser::new(self.header_limit, self.body_limit);
        let capacity = self.header_limit + self.body_limit;

        loop {
            if !self.buffer.is_empty() {
                let consumed = parser.feed(&self.buffer)?;
                let _ = self.buffer.split_to(consumed);
                if parser.is_done() {
                    break;
                }
            }

            if self.buffer.len() >= capacity {
                return Err(Error::BufferOverflow);
            }
            let room = (capacity - self.buffer.len()).min(READ_REGION);
            let start = self.buffer.len();
            self.buffer.resize(start + room, 0);
            let read = match self.stream.read_some(&mut self.buffer[start..], deadline) {
                Ok(read) => read,
                Err(err) => {
                    self.buffer.truncate(start);
                    return Err(err);
                }
            };
            self.buffer.truncate(start + read);

            if read == 0 {
                if parser.received_any() {
                    // A close-delimited body may legally end here; anything
                    // else is a truncated message.
                    parser.feed_eof()?;
                    break;
                }
                return Err(Error::EndOfStream);
            }
        }

        // Fully drained: BytesMut reclaims the arena on the next reserve,
        // so the session keeps one stable allocation across requests.
        parser.into_response()
    }

    /// Close the underlying stream.
    pub fn close(&mut self) -> Result<(), Error> {
        self.stream.close()
    }

    /// Whether the underlying stream is open.
    pub fn is_open(&self) -> bool {
        self.stream.is_open()
    }

    /// Reference to the underlying stream.
    pub fn inner(&self) -> &S {
        &self.stream
    }

    /// Mutable reference to the underlying stream.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Consume the session, returning the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S> EstablishSession for HttpSession<S>
where
    S: StreamSocket + EstablishSession,
{
    const TRANSPORT: Transport = S::TRANSPORT;

    fn establish(
        config: &SessionConfig,
        endpoint: &Endpoint,
        deadline: Deadline,
    ) -> Result<Self, Error> {
        let stream = S::establish(config, endpoint, deadline)?;
        Ok(HttpSession::with_limits(
            stream,
            config.header_limit,
            config.body_limit,
        ))
    }

    fn is_open(&self) -> bool {
        EstablishSession::is_open(&self.stream)
    }
}
