//! Per-connection request handling.
//!
//! Each accepted connection is handled to completion here: parse the request
//! head, resolve the target beneath the root, stream the response, and emit
//! exactly one access-log record whatever the outcome. Faults are contained
//! to the connection; the accept loop never sees them.

use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, error};

use crate::server::http::{self, Method, Request, Status};
use crate::server::log::{LogEmitter, LogRecord};
use crate::server::static_files::{self, Resolved};

/// Everything a connection needs, injected at construction time.
pub struct RequestContext {
    pub root_dir: PathBuf,
    pub emitter: LogEmitter,
}

/// Handles one connection from accept to close.
pub async fn handle_connection(stream: TcpStream, addr: SocketAddr, ctx: Arc<RequestContext>) {
    let client = addr.to_string();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let request = match http::read_request(&mut reader).await {
        Ok(Some(request)) => request,
        // client connected and went away without a request; nothing to log
        Ok(None) => return,
        Err(e) => {
            let status = Status::from(&e);
            let _ = http::write_error(&mut write_half, status, true).await;
            ctx.emitter.emit(LogRecord::request(
                &client,
                format!("rejected request ({e}) {}", status.code()),
            ));
            let _ = write_half.shutdown().await;
            return;
        }
    };

    debug!("{client} -> {} {}", request.method, request.target);

    let summary = match serve_request(&request, &mut write_half, &ctx.root_dir).await {
        Ok(status) => format!("\"{} {}\" {}", request.method, request.target, status.code()),
        Err(e) => {
            // unexpected fault; answer 500 if the socket will still take it
            error!("request for {} failed: {e}", request.target);
            let _ = http::write_error(
                &mut write_half,
                Status::InternalServerError,
                request.method != Method::Head,
            )
            .await;
            format!(
                "\"{} {}\" {} ({e})",
                request.method,
                request.target,
                Status::InternalServerError.code()
            )
        }
    };

    // emit before the FIN goes out so a client that saw the full response is
    // guaranteed its record is already in the channel
    ctx.emitter.emit(LogRecord::request(&client, summary));
    let _ = write_half.shutdown().await;
}

/// Resolves and answers a single request, returning the response status.
///
/// # Errors
/// Only unexpected faults (transport failures, files vanishing mid-response)
/// surface as errors; expected outcomes like 403/404 are part of the `Ok`
/// path.
async fn serve_request<W>(request: &Request, out: &mut W, root: &Path) -> io::Result<Status>
where
    W: AsyncWrite + Unpin,
{
    let head_only = request.method == Method::Head;

    match static_files::resolve(&request.target, root) {
        Ok(Resolved::File(path)) => {
            let mut file = match tokio::fs::File::open(&path).await {
                Ok(file) => file,
                // resolved but gone by open time
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    http::write_error(out, Status::NotFound, !head_only).await?;
                    return Ok(Status::NotFound);
                }
                Err(e) => return Err(e),
            };
            let length = file.metadata().await?.len();
            http::write_head(out, Status::Ok, static_files::content_type(&path), length).await?;
            if !head_only {
                tokio::io::copy(&mut file, out).await?;
            }
            out.flush().await?;
            Ok(Status::Ok)
        }
        Ok(Resolved::Redirect(location)) => {
            http::write_redirect(out, &location, !head_only).await?;
            Ok(Status::MovedPermanently)
        }
        Ok(Resolved::Listing(dir)) => {
            let body = static_files::render_listing(&dir, &request.target)?;
            http::write_head(out, Status::Ok, "text/html", body.len() as u64).await?;
            if !head_only {
                out.write_all(body.as_bytes()).await?;
            }
            out.flush().await?;
            Ok(Status::Ok)
        }
        Err(e) => {
            let status = match e.kind() {
                ErrorKind::PermissionDenied => Status::Forbidden,
                ErrorKind::InvalidInput => Status::BadRequest,
                // anything else the lookup reports means the target does not
                // name a servable file, e.g. a trailing slash on a regular
                // file canonicalizing to NotADirectory
                _ => Status::NotFound,
            };
            http::write_error(out, status, !head_only).await?;
            Ok(status)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run_request(root: &Path, request: &Request) -> (Status, Vec<u8>) {
        let mut out = Vec::new();
        let status = serve_request(request, &mut out, root).await.unwrap();
        (status, out)
    }

    #[tokio::test]
    async fn serves_file_bytes_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.bin"), [0u8, 159, 146, 150]).unwrap();
        let request = Request {
            method: Method::Get,
            target: "/data.bin".into(),
        };
        let (status, out) = run_request(dir.path(), &request).await;
        assert_eq!(status, Status::Ok);
        assert!(out.ends_with(&[0u8, 159, 146, 150]));
    }

    #[tokio::test]
    async fn head_omits_the_body() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        let request = Request {
            method: Method::Head,
            target: "/a.txt".into(),
        };
        let (status, out) = run_request(dir.path(), &request).await;
        assert_eq!(status, Status::Ok);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Content-Length: 5"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn directory_target_redirects_to_trailing_slash() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/a.txt"), "nested").unwrap();
        let request = Request {
            method: Method::Get,
            target: "/sub".into(),
        };
        let (status, out) = run_request(dir.path(), &request).await;
        assert_eq!(status, Status::MovedPermanently);
        assert!(String::from_utf8(out).unwrap().contains("Location: /sub/\r\n"));
    }

    #[tokio::test]
    async fn file_target_with_trailing_slash_is_404() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        let request = Request {
            method: Method::Get,
            target: "/a.txt/".into(),
        };
        let (status, _) = run_request(dir.path(), &request).await;
        assert_eq!(status, Status::NotFound);
    }

    #[tokio::test]
    async fn missing_file_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let request = Request {
            method: Method::Get,
            target: "/absent".into(),
        };
        let (status, _) = run_request(dir.path(), &request).await;
        assert_eq!(status, Status::NotFound);
    }

    #[tokio::test]
    async fn traversal_is_403() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("root");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(parent.path().join("secret.txt"), "secret").unwrap();
        let request = Request {
            method: Method::Get,
            target: "/../secret.txt".into(),
        };
        let (status, out) = run_request(&root, &request).await;
        assert_eq!(status, Status::Forbidden);
        assert!(!String::from_utf8_lossy(&out).contains("secret"));
    }
}
