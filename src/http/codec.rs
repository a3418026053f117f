//! Incremental HTTP/1.1 wire codec.
//!
//! The serializer and parser both work in fragments so the session layer
//! can interleave them with deadline-bounded partial reads and writes. All
//! line-level parsing operates on `&[u8]` and reports how many bytes it
//! consumed; "not enough data yet" is never an error.

use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, Request, Response, StatusCode, Version};

use crate::base::neterror::Error;

/// Upper bound for one chunk-size line, hex digits plus extensions.
const CHUNK_LINE_LIMIT: usize = 256;

/// Incremental request serializer: head fragment first, then the body.
/// Advance by the byte count actually written and ask for the next
/// fragment until done.
pub struct RequestSerializer {
    head: Bytes,
    body: Bytes,
    offset: usize,
}

impl RequestSerializer {
    pub fn new(request: &Request<Bytes>) -> Self {
        let mut head = BytesMut::with_capacity(256);
        let path = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let version = match request.version() {
            Version::HTTP_10 => "HTTP/1.0",
            _ => "HTTP/1.1",
        };
        head.extend_from_slice(request.method().as_str().as_bytes());
        head.extend_from_slice(b" ");
        head.extend_from_slice(path.as_bytes());
        head.extend_from_slice(b" ");
        head.extend_from_slice(version.as_bytes());
        head.extend_from_slice(b"\r\n");

        for (name, value) in request.headers() {
            head.extend_from_slice(name.as_str().as_bytes());
            head.extend_from_slice(b": ");
            head.extend_from_slice(value.as_bytes());
            head.extend_from_slice(b"\r\n");
        }
        let body = request.body().clone();
        if !body.is_empty()
            && !request.headers().contains_key(CONTENT_LENGTH)
            && !request.headers().contains_key(TRANSFER_ENCODING)
        {
            head.extend_from_slice(format!("content-length: {}\r\n", body.len()).as_bytes());
        }
        head.extend_from_slice(b"\r\n");

        RequestSerializer {
            head: head.freeze(),
            body,
            offset: 0,
        }
    }

    /// Next unwritten fragment, `None` once everything was consumed.
    pub fn next_chunk(&self) -> Option<&[u8]> {
        if self.offset < self.head.len() {
            Some(&self.head[self.offset..])
        } else {
            let body_offset = self.offset - self.head.len();
            if body_offset < self.body.len() {
                Some(&self.body[body_offset..])
            } else {
                None
            }
        }
    }

    /// Record `n` bytes as written.
    pub fn advance(&mut self, n: usize) {
        self.offset = (self.offset + n).min(self.head.len() + self.body.len());
    }

    pub fn is_done(&self) -> bool {
        self.offset >= self.head.len() + self.body.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    StatusLine,
    Headers,
    Body,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyMode {
    /// Message has no body (1xx, 204, 304).
    None,
    /// Fixed Content-Length, counting down.
    Length(usize),
    /// Chunked transfer coding.
    Chunked(ChunkState),
    /// Body runs until the peer closes the stream.
    UntilEof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data { remaining: usize },
    DataCrlf,
    Trailer,
}

/// Incremental response parser with hard header and body limits.
///
/// Feed raw bytes as they arrive; the parser consumes what it can and
/// reports the count. Exceeding either limit fails with
/// [`Error::BufferOverflow`].
pub struct ResponseParser {
    state: State,
    mode: BodyMode,
    header_limit: usize,
    body_limit: usize,
    head_bytes: usize,
    received_any: bool,
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: BytesMut,
}

impl ResponseParser {
    pub fn new(header_limit: usize, body_limit: usize) -> Self {
        ResponseParser {
            state: State::StatusLine,
            mode: BodyMode::UntilEof,
            header_limit,
            body_limit,
            head_bytes: 0,
            received_any: false,
            status: StatusCode::OK,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
        }
    }

    /// Consume as much of `data` as the current state allows. Returns the
    /// number of bytes consumed; fewer than `data.len()` means the parser
    /// needs more input to make progress.
    pub fn feed(&mut self, mut data: &[u8]) -> Result<usize, Error> {
        if !data.is_empty() {
            self.received_any = true;
        }
        let mut consumed = 0;
        loop {
            match self.state {
                State::StatusLine => match parse_status_line(data)? {
                    Some((version, status, n)) => {
                        self.version = version;
                        self.status = status;
                        self.advance_head(n)?;
                        consumed += n;
                        data = &data[n..];
                        self.state = State::Headers;
                    }
                    None => {
                        self.check_head_room(data.len())?;
                        return Ok(consumed);
                    }
                },
                State::Headers => match parse_header_line(data)? {
                    Some(HeaderLine::End(n)) => {
                        self.advance_head(n)?;
                        consumed += n;
                        data = &data[n..];
                        self.begin_body()?;
                    }
                    Some(HeaderLine::Field(name, value, n)) => {
                        self.headers.append(name, value);
                        self.advance_head(n)?;
                        consumed += n;
                        data = &data[n..];
                    }
                    None => {
                        self.check_head_room(data.len())?;
                        return Ok(consumed);
                    }
                },
                State::Body => {
                    let n = self.feed_body(data)?;
                    consumed += n;
                    data = &data[n..];
                    if self.state == State::Body && (n == 0 || data.is_empty()) {
                        return Ok(consumed);
                    }
                }
                State::Done => return Ok(consumed),
            }
        }
    }

    /// Signal end of stream. Legal only when the message is complete or
    /// its body is delimited by connection close.
    pub fn feed_eof(&mut self) -> Result<(), Error> {
        match (self.state, self.mode) {
            (State::Done, _) => Ok(()),
            (State::Body, BodyMode::UntilEof) => {
                self.state = State::Done;
                Ok(())
            }
            _ => Err(Error::EndOfStream),
        }
    }

    /// Whether any input bytes have reached the parser.
    pub fn received_any(&self) -> bool {
        self.received_any
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Assemble the parsed message. Call only after [`Self::is_done`].
    pub fn into_response(self) -> Result<Response<Bytes>, Error> {
        let mut builder = Response::builder()
            .status(self.status)
            .version(self.version);
        if let Some(headers) = builder.headers_mut() {
            *headers = self.headers;
        }
        builder
            .body(self.body.freeze())
            .map_err(|_| Error::InvalidResponse("message assembly failed"))
    }

    fn advance_head(&mut self, n: usize) -> Result<(), Error> {
        self.head_bytes += n;
        if self.head_bytes > self.header_limit {
            return Err(Error::BufferOverflow);
        }
        Ok(())
    }

    /// A partial line still counts against the header limit.
    fn check_head_room(&self, pending: usize) -> Result<(), Error> {
        if self.head_bytes + pending > self.header_limit {
            return Err(Error::BufferOverflow);
        }
        Ok(())
    }

    fn begin_body(&mut self) -> Result<(), Error> {
        self.mode = self.body_framing()?;
        match self.mode {
            BodyMode::None | BodyMode::Length(0) => self.state = State::Done,
            _ => self.state = State::Body,
        }
        Ok(())
    }

    fn body_framing(&self) -> Result<BodyMode, Error> {
        if self.status.is_informational()
            || self.status == StatusCode::NO_CONTENT
            || self.status == StatusCode::NOT_MODIFIED
        {
            return Ok(BodyMode::None);
        }
        if let Some(te) = self.headers.get(TRANSFER_ENCODING) {
            let te = te
                .to_str()
                .map_err(|_| Error::InvalidResponse("invalid transfer-encoding"))?;
            if te
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("chunked"))
            {
                return Ok(BodyMode::Chunked(ChunkState::Size));
            }
        }
        let mut lengths = self.headers.get_all(CONTENT_LENGTH).iter();
        if let Some(value) = lengths.next() {
            if lengths.any(|other| other != value) {
                return Err(Error::InvalidResponse("conflicting content-length"));
            }
            let length: usize = value
                .to_str()
                .ok()
                .and_then(|text| text.trim().parse().ok())
                .ok_or(Error::InvalidResponse("invalid content-length"))?;
            return Ok(BodyMode::Length(length));
        }
        Ok(BodyMode::UntilEof)
    }

    fn push_body(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.body.len() + data.len() > self.body_limit {
            return Err(Error::BufferOverflow);
        }
        self.body.extend_from_slice(data);
        Ok(())
    }

    fn feed_body(&mut self, data: &[u8]) -> Result<usize, Error> {
        match self.mode {
            BodyMode::Length(remaining) => {
                let take = remaining.min(data.len());
                self.push_body(&data[..take])?;
                let left = remaining - take;
                self.mode = BodyMode::Length(left);
                if left == 0 {
                    self.state = State::Done;
                }
                Ok(take)
            }
            BodyMode::UntilEof => {
                self.push_body(data)?;
                Ok(data.len())
            }
            BodyMode::Chunked(chunk) => self.feed_chunked(chunk, data),
            BodyMode::None => {
                self.state = State::Done;
                Ok(0)
            }
        }
    }

    fn feed_chunked(&mut self, mut chunk: ChunkState, mut data: &[u8]) -> Result<usize, Error> {
        let mut consumed = 0;
        loop {
            match chunk {
                ChunkState::Size => match parse_chunk_size(data)? {
                    Some((0, n)) => {
                        consumed += n;
                        data = &data[n..];
                        chunk = ChunkState::Trailer;
                    }
                    Some((size, n)) => {
                        consumed += n;
                        data = &data[n..];
                        chunk = ChunkState::Data { remaining: size };
                    }
                    None => break,
                },
                ChunkState::Data { remaining } => {
                    let take = remaining.min(data.len());
                    self.push_body(&data[..take])?;
                    consumed += take;
                    data = &data[take..];
                    let left = remaining - take;
                    if left == 0 {
                        chunk = ChunkState::DataCrlf;
                    } else {
                        chunk = ChunkState::Data { remaining: left };
                        break;
                    }
                }
                ChunkState::DataCrlf => {
                    if data.len() < 2 {
                        break;
                    }
                    if &data[..2] != b"\r\n" {
                        return Err(Error::InvalidResponse("chunk data not CRLF-terminated"));
                    }
                    consumed += 2;
                    data = &data[2..];
                    chunk = ChunkState::Size;
                }
                ChunkState::Trailer => {
                    // Trailer fields are consumed and dropped.
                    match find_crlf(data) {
                        Some(0) => {
                            consumed += 2;
                            self.state = State::Done;
                            self.mode = BodyMode::Chunked(ChunkState::Trailer);
                            return Ok(consumed);
                        }
                        Some(line_end) => {
                            consumed += line_end + 2;
                            data = &data[line_end + 2..];
                        }
                        None => break,
                    }
                }
            }
        }
        self.mode = BodyMode::Chunked(chunk);
        Ok(consumed)
    }
}

enum HeaderLine {
    Field(HeaderName, HeaderValue, usize),
    End(usize),
}

/// Parse `HTTP/1.x SP status [SP reason] CRLF`. `None` when incomplete.
fn parse_status_line(data: &[u8]) -> Result<Option<(Version, StatusCode, usize)>, Error> {
    let Some(line_end) = find_crlf(data) else {
        return Ok(None);
    };
    let line = &data[..line_end];

    let version = if line.starts_with(b"HTTP/1.1") {
        Version::HTTP_11
    } else if line.starts_with(b"HTTP/1.0") {
        Version::HTTP_10
    } else {
        return Err(Error::InvalidResponse("unsupported HTTP version"));
    };
    let rest = &line[8..];
    if rest.len() < 4 || rest[0] != b' ' {
        return Err(Error::InvalidResponse("malformed status line"));
    }
    let status = StatusCode::from_bytes(&rest[1..4])
        .map_err(|_| Error::InvalidResponse("invalid status code"))?;

    Ok(Some((version, status, line_end + 2)))
}

/// Parse one header line or the head-terminating empty line.
fn parse_header_line(data: &[u8]) -> Result<Option<HeaderLine>, Error> {
    let Some(line_end) = find_crlf(data) else {
        return Ok(None);
    };
    if line_end == 0 {
        return Ok(Some(HeaderLine::End(2)));
    }
    let line = &data[..line_end];

    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or(Error::InvalidResponse("header line without colon"))?;
    if colon == 0 {
        return Err(Error::InvalidResponse("empty header name"));
    }
    let name = HeaderName::from_bytes(&line[..colon])
        .map_err(|_| Error::InvalidResponse("invalid header name"))?;
    let value = HeaderValue::from_bytes(trim_ows(&line[colon + 1..]))
        .map_err(|_| Error::InvalidResponse("invalid header value"))?;

    Ok(Some(HeaderLine::Field(name, value, line_end + 2)))
}

/// Parse `HEX_SIZE [; ext] CRLF`. `None` when incomplete.
fn parse_chunk_size(data: &[u8]) -> Result<Option<(usize, usize)>, Error> {
    let Some(line_end) = find_crlf(data) else {
        if data.len() > CHUNK_LINE_LIMIT {
            return Err(Error::InvalidResponse("chunk size line too long"));
        }
        return Ok(None);
    };
    let line = &data[..line_end];
    let hex_end = line
        .iter()
        .position(|&b| b == b';' || b == b' ')
        .unwrap_or(line.len());
    let hex = &line[..hex_end];
    if hex.is_empty() {
        return Err(Error::InvalidResponse("empty chunk size"));
    }
    let size = parse_hex(hex).ok_or(Error::InvalidResponse("invalid chunk size"))?;
    Ok(Some((size, line_end + 2)))
}

/// Offset of `\r` in the first `\r\n`, if present.
fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|pair| pair == b"\r\n")
}

/// Trim optional whitespace (SP / HTAB) from both ends.
fn trim_ows(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|&b| b != b' ' && b != b'\t')
        .unwrap_or(data.len());
    let end = data
        .iter()
        .rposition(|&b| b != b' ' && b != b'\t')
        .map(|i| i + 1)
        .unwrap_or(start);
    &data[start..end]
}

fn parse_hex(data: &[u8]) -> Option<usize> {
    let mut value: usize = 0;
    for &b in data {
        let digit = match b {
            b'0'..=b'9' => (b - b'0') as usize,
            b'a'..=b'f' => (b - b'a' + 10) as usize,
            b'A'..=b'F' => (b - b'A' + 10) as usize,
            _ => return None,
        };
        value = value.checked_mul(16)?.checked_add(digit)?;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn parser() -> ResponseParser {
        ResponseParser::new(1024, 4096)
    }

    #[test]
    fn serializer_emits_head_then_body() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/echo")
            .version(Version::HTTP_11)
            .header("host", "localhost")
            .body(Bytes::from_static(b"test"))
            .unwrap();
        let mut serializer = RequestSerializer::new(&request);

        let mut wire = Vec::new();
        while let Some(chunk) = serializer.next_chunk() {
            // Simulate short writes of one byte.
            wire.push(chunk[0]);
            serializer.advance(1);
        }
        assert!(serializer.is_done());

        let text = String::from_utf8(wire).unwrap();
        assert!(text.starts_with("POST /echo HTTP/1.1\r\n"));
        assert!(text.contains("host: localhost\r\n"));
        assert!(text.contains("content-length: 4\r\n"));
        assert!(text.ends_with("\r\n\r\ntest"));
    }

    #[test]
    fn serializer_keeps_explicit_content_length() {
        let request = Request::builder()
            .uri("/")
            .header("content-length", "4")
            .body(Bytes::from_static(b"test"))
            .unwrap();
        let serializer = RequestSerializer::new(&request);
        let head = std::str::from_utf8(serializer.next_chunk().unwrap()).unwrap();
        assert_eq!(head.matches("content-length").count(), 1);
    }

    #[test]
    fn parses_content_length_response() {
        let mut parser = parser();
        let wire = b"HTTP/1.1 200 OK\r\ncontent-length: 4\r\n\r\ntest";
        let consumed = parser.feed(wire).unwrap();
        assert_eq!(consumed, wire.len());
        assert!(parser.is_done());

        let response = parser.into_response().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.version(), Version::HTTP_11);
        assert_eq!(response.body().as_ref(), b"test");
    }

    #[test]
    fn parses_byte_by_byte() {
        let mut parser = parser();
        let wire = b"HTTP/1.1 404 Not Found\r\nx-a: b\r\ncontent-length: 2\r\n\r\nhi";
        // Mirror the session loop: unconsumed bytes stay buffered and are
        // offered again together with the next read.
        let mut pending: Vec<u8> = Vec::new();
        for &byte in wire.iter() {
            pending.push(byte);
            let consumed = parser.feed(&pending).unwrap();
            pending.drain(..consumed);
        }
        assert!(parser.is_done());
        let response = parser.into_response().unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-a"], "b");
        assert_eq!(response.body().as_ref(), b"hi");
    }

    #[test]
    fn parses_chunked_response() {
        let mut parser = parser();
        let wire = b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n\
                     4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
        let consumed = parser.feed(wire).unwrap();
        assert_eq!(consumed, wire.len());
        assert!(parser.is_done());
        let response = parser.into_response().unwrap();
        assert_eq!(response.body().as_ref(), b"Wikipedia");
    }

    #[test]
    fn chunked_with_extension_and_trailer() {
        let mut parser = parser();
        let wire = b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n\
                     2;name=v\r\nok\r\n0\r\nx-trailer: skip\r\n\r\n";
        parser.feed(wire).unwrap();
        assert!(parser.is_done());
        let response = parser.into_response().unwrap();
        assert_eq!(response.body().as_ref(), b"ok");
        assert!(!response.headers().contains_key("x-trailer"));
    }

    #[test]
    fn body_until_eof() {
        let mut parser = parser();
        parser.feed(b"HTTP/1.1 200 OK\r\n\r\npartial").unwrap();
        assert!(!parser.is_done());
        parser.feed(b" body").unwrap();
        parser.feed_eof().unwrap();
        assert!(parser.is_done());
        let response = parser.into_response().unwrap();
        assert_eq!(response.body().as_ref(), b"partial body");
    }

    #[test]
    fn eof_mid_head_is_end_of_stream() {
        let mut parser = parser();
        parser.feed(b"HTTP/1.1 2").unwrap();
        assert!(matches!(parser.feed_eof(), Err(Error::EndOfStream)));
    }

    #[test]
    fn eof_mid_fixed_body_is_end_of_stream() {
        let mut parser = parser();
        parser
            .feed(b"HTTP/1.1 200 OK\r\ncontent-length: 10\r\n\r\nshort")
            .unwrap();
        assert!(matches!(parser.feed_eof(), Err(Error::EndOfStream)));
    }

    #[test]
    fn no_content_has_no_body() {
        let mut parser = parser();
        parser.feed(b"HTTP/1.1 204 No Content\r\n\r\n").unwrap();
        assert!(parser.is_done());
        let response = parser.into_response().unwrap();
        assert!(response.body().is_empty());
    }

    #[test]
    fn header_limit_overflows() {
        let mut parser = ResponseParser::new(64, 4096);
        let mut wire = b"HTTP/1.1 200 OK\r\n".to_vec();
        wire.extend_from_slice(b"x-long: ");
        wire.extend_from_slice(&vec![b'a'; 128]);
        assert!(matches!(
            parser.feed(&wire),
            Err(Error::BufferOverflow)
        ));
    }

    #[test]
    fn body_limit_overflows() {
        let mut parser = ResponseParser::new(1024, 8);
        let wire = b"HTTP/1.1 200 OK\r\ncontent-length: 16\r\n\r\n0123456789abcdef";
        assert!(matches!(parser.feed(wire), Err(Error::BufferOverflow)));
    }

    #[test]
    fn conflicting_content_lengths_rejected() {
        let mut parser = parser();
        let wire = b"HTTP/1.1 200 OK\r\ncontent-length: 4\r\ncontent-length: 5\r\n\r\n";
        assert!(matches!(
            parser.feed(wire),
            Err(Error::InvalidResponse(_))
        ));
    }

    #[test]
    fn rejects_http2_status_line() {
        let mut parser = parser();
        assert!(matches!(
            parser.feed(b"HTTP/2 200\r\n"),
            Err(Error::InvalidResponse(_))
        ));
    }

    #[test]
    fn hex_parse_bounds() {
        assert_eq!(parse_hex(b"ff"), Some(255));
        assert_eq!(parse_hex(b"0"), Some(0));
        assert_eq!(parse_hex(b"zz"), None);
    }
}
