//! Minimal HTTP/1.x support for static-file delivery.
//!
//! Only what a browser needs to fetch files: GET/HEAD request-line parsing,
//! header draining, and `Connection: close` responses. Anything fancier is
//! out of scope for this server.

use std::fmt;
use std::io;
use std::str::FromStr;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Upper bound on header lines read per request; past this the request is
/// treated as malformed rather than letting a client feed us forever.
const MAX_HEADER_LINES: usize = 256;

/// Upper bound on total request-head bytes. A line that never ends must not
/// buffer unbounded memory, so the whole head is read through a `take`
/// adapter with this limit (the stdlib `http.server` caps at the same 64 KiB).
const MAX_HEAD_BYTES: u64 = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
        };
        write!(f, "{method}")
    }
}

impl FromStr for Method {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            other => Err(RequestError::UnsupportedMethod(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    MovedPermanently,
    BadRequest,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    InternalServerError,
}

impl Status {
    pub const fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::MovedPermanently => 301,
            Self::BadRequest => 400,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::InternalServerError => 500,
        }
    }

    pub const fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::MovedPermanently => "Moved Permanently",
            Self::BadRequest => "Bad Request",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::InternalServerError => "Internal Server Error",
        }
    }
}

/// The parts of a request this server acts on. Headers are read off the wire
/// but not retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub target: String,
}

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl From<&RequestError> for Status {
    fn from(error: &RequestError) -> Self {
        match error {
            RequestError::Malformed(_) => Self::BadRequest,
            RequestError::UnsupportedMethod(_) => Self::MethodNotAllowed,
            RequestError::Io(_) => Self::InternalServerError,
        }
    }
}

/// Reads one request head from the stream.
///
/// Returns `Ok(None)` when the client closed the connection without sending
/// anything.
///
/// # Errors
/// Returns `RequestError` for malformed request lines, non-GET/HEAD methods,
/// unsupported protocol versions, and transport failures.
pub async fn read_request<R>(reader: &mut BufReader<R>) -> Result<Option<Request>, RequestError>
where
    R: AsyncRead + Unpin,
{
    let mut head = (&mut *reader).take(MAX_HEAD_BYTES);

    let mut request_line = String::new();
    if head.read_line(&mut request_line).await? == 0 {
        return Ok(None);
    }
    // read_line stopping short of a newline means the take limit cut it off
    if !request_line.ends_with('\n') {
        return Err(RequestError::Malformed("request head too large".into()));
    }

    let [method_str, target, version] = request_line
        .split_whitespace()
        .collect::<Vec<&str>>()
        .try_into()
        .map_err(|_| {
            RequestError::Malformed(format!(
                "bad request line: {}",
                request_line.trim_end()
            ))
        })?;

    if !version.starts_with("HTTP/1.") {
        return Err(RequestError::Malformed(format!(
            "unsupported protocol version: {version}"
        )));
    }

    let method = method_str.parse()?;
    let target = target.to_owned();

    // drain headers until the blank line; their content is irrelevant here
    for _ in 0..MAX_HEADER_LINES {
        let mut header = String::new();
        if head.read_line(&mut header).await? == 0 {
            break;
        }
        if header == "\r\n" || header == "\n" {
            return Ok(Some(Request { method, target }));
        }
        if !header.ends_with('\n') {
            break;
        }
    }

    Err(RequestError::Malformed("request head too large".into()))
}

/// Writes the status line and response headers. The body, if any, follows
/// separately so file contents can be streamed.
pub async fn write_head<W>(
    out: &mut W,
    status: Status,
    content_type: &str,
    content_length: u64,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status.code(),
        status.reason(),
        content_type,
        content_length,
    );
    out.write_all(head.as_bytes()).await
}

/// Writes a complete 301 response pointing at `location`.
///
/// `location` comes from a parsed request target and so can never contain
/// whitespace or CR/LF.
pub async fn write_redirect<W>(out: &mut W, location: &str, include_body: bool) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let status = Status::MovedPermanently;
    let body = format!(
        "<!DOCTYPE html>\n<html><head><title>{code} {reason}</title></head>\n\
         <body><h1>{code} {reason}</h1></body></html>\n",
        code = status.code(),
        reason = status.reason(),
    );
    let head = format!(
        "HTTP/1.1 {} {}\r\nLocation: {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\
         Connection: close\r\n\r\n",
        status.code(),
        status.reason(),
        location,
        body.len(),
    );
    out.write_all(head.as_bytes()).await?;
    if include_body {
        out.write_all(body.as_bytes()).await?;
    }
    out.flush().await
}

/// Writes a complete error response with a small HTML body. For HEAD
/// requests the body is suppressed but the headers still describe it.
pub async fn write_error<W>(out: &mut W, status: Status, include_body: bool) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = format!(
        "<!DOCTYPE html>\n<html><head><title>{code} {reason}</title></head>\n\
         <body><h1>{code} {reason}</h1></body></html>\n",
        code = status.code(),
        reason = status.reason(),
    );
    write_head(out, status, "text/html", body.len() as u64).await?;
    if include_body {
        out.write_all(body.as_bytes()).await?;
    }
    out.flush().await
}
