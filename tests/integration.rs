//! End-to-end lifecycle and wire tests.
//!
//! Each test drives a controller through the public control API and talks to
//! the server with raw TCP clients, the way a browser or curl would.

use std::fs;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use dirserve::{LifecycleState, LogRecord, ServerLifecycleController, StartError, StopError};

/// Picks a port that was free a moment ago.
fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Sends a raw request and returns `(status_code, header_block, body_bytes)`.
fn raw_request(port: u16, request: &str) -> (u16, String, Vec<u8>) {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.write_all(request.as_bytes()).unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();

    let split = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("no header terminator in response");
    let head = std::str::from_utf8(&response[..split]).unwrap().to_owned();
    let status: u16 = head
        .split_whitespace()
        .nth(1)
        .expect("no status code")
        .parse()
        .unwrap();
    (status, head, response[split + 4..].to_vec())
}

fn http_get(port: u16, path: &str) -> (u16, Vec<u8>) {
    let (status, _, body) =
        raw_request(port, &format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n"));
    (status, body)
}

#[test]
fn serves_files_and_releases_port_on_stop() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("index.html"), "hello").unwrap();

    let port = free_port();
    let controller = ServerLifecycleController::new();
    controller.start(dir.path(), port).unwrap();
    assert_eq!(controller.current_state(), LifecycleState::Running);

    let (status, body) = http_get(port, "/");
    assert_eq!(status, 200);
    assert_eq!(body, b"hello");

    let (status, body) = http_get(port, "/index.html");
    assert_eq!(status, 200);
    assert_eq!(body, b"hello");

    controller.stop().unwrap();
    assert_eq!(controller.current_state(), LifecycleState::Idle);
    assert!(
        TcpStream::connect(("127.0.0.1", port)).is_err(),
        "port still accepting after stop"
    );

    // the port must be immediately rebindable
    controller.start(dir.path(), port).unwrap();
    let (status, _) = http_get(port, "/index.html");
    assert_eq!(status, 200);
    controller.stop().unwrap();
}

#[test]
fn body_bytes_are_identical_to_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let payload: Vec<u8> = (0u8..=255).cycle().take(70_000).collect();
    fs::write(dir.path().join("blob.bin"), &payload).unwrap();

    let port = free_port();
    let controller = ServerLifecycleController::new();
    controller.start(dir.path(), port).unwrap();

    let (status, body) = http_get(port, "/blob.bin");
    assert_eq!(status, 200);
    assert_eq!(body, payload);

    controller.stop().unwrap();
}

#[test]
fn missing_paths_return_404() {
    let dir = tempfile::tempdir().unwrap();
    let port = free_port();
    let controller = ServerLifecycleController::new();
    controller.start(dir.path(), port).unwrap();

    let (status, _) = http_get(port, "/no-such-file.txt");
    assert_eq!(status, 404);

    controller.stop().unwrap();
}

#[test]
fn traversal_never_leaks_out_of_root_bytes() {
    let parent = tempfile::tempdir().unwrap();
    let root = parent.path().join("root");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("ok.txt"), "ok").unwrap();
    fs::write(parent.path().join("secret.txt"), "TOP-SECRET").unwrap();

    let port = free_port();
    let controller = ServerLifecycleController::new();
    controller.start(&root, port).unwrap();

    for target in ["/../secret.txt", "/%2e%2e/secret.txt", "/ok.txt/../../secret.txt"] {
        let (status, body) = http_get(port, target);
        assert_ne!(status, 200, "{target} was served");
        assert!(
            !body.windows(10).any(|w| w == b"TOP-SECRET"),
            "{target} leaked out-of-root bytes"
        );
    }

    controller.stop().unwrap();
}

#[test]
fn directory_without_index_gets_a_listing() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("alpha.txt"), "a").unwrap();
    fs::write(dir.path().join("beta.txt"), "b").unwrap();

    let port = free_port();
    let controller = ServerLifecycleController::new();
    controller.start(dir.path(), port).unwrap();

    let (status, body) = http_get(port, "/");
    assert_eq!(status, 200);
    let listing = String::from_utf8(body).unwrap();
    assert!(listing.contains("alpha.txt"));
    assert!(listing.contains("beta.txt"));

    controller.stop().unwrap();
}

#[test]
fn directory_urls_redirect_so_relative_links_resolve() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("sub/a.txt"), "nested").unwrap();

    let port = free_port();
    let controller = ServerLifecycleController::new();
    controller.start(dir.path(), port).unwrap();

    let (status, head, _) = raw_request(port, "GET /sub HTTP/1.1\r\nHost: localhost\r\n\r\n");
    assert_eq!(status, 301);
    assert!(head.contains("Location: /sub/"), "{head}");

    let (status, body) = http_get(port, "/sub/");
    assert_eq!(status, 200);
    let listing = String::from_utf8(body).unwrap();
    assert!(listing.contains("href=\"a.txt\""), "{listing}");

    // the address a browser resolves that relative link against
    let (status, body) = http_get(port, "/sub/a.txt");
    assert_eq!(status, 200);
    assert_eq!(body, b"nested");

    controller.stop().unwrap();
}

#[test]
fn file_url_with_trailing_slash_is_404_not_500() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "hello").unwrap();

    let port = free_port();
    let controller = ServerLifecycleController::new();
    controller.start(dir.path(), port).unwrap();

    let (status, _) = http_get(port, "/a.txt/");
    assert_eq!(status, 404);

    controller.stop().unwrap();
}

#[test]
fn head_returns_headers_without_body() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "hello").unwrap();

    let port = free_port();
    let controller = ServerLifecycleController::new();
    controller.start(dir.path(), port).unwrap();

    let (status, _, body) = raw_request(port, "HEAD /a.txt HTTP/1.1\r\nHost: localhost\r\n\r\n");
    assert_eq!(status, 200);
    assert!(body.is_empty());

    controller.stop().unwrap();
}

#[test]
fn unsupported_method_gets_405_and_garbage_gets_400() {
    let dir = tempfile::tempdir().unwrap();
    let port = free_port();
    let controller = ServerLifecycleController::new();
    controller.start(dir.path(), port).unwrap();

    let (status, _, _) = raw_request(port, "DELETE /x HTTP/1.1\r\nHost: localhost\r\n\r\n");
    assert_eq!(status, 405);

    let (status, _, _) = raw_request(port, "complete nonsense\r\n\r\n");
    assert_eq!(status, 400);

    controller.stop().unwrap();
}

#[test]
fn stop_when_idle_reports_not_running() {
    let controller = ServerLifecycleController::new();
    assert!(matches!(controller.stop(), Err(StopError::NotRunning)));
    assert_eq!(controller.current_state(), LifecycleState::Idle);
}

#[test]
fn start_while_running_reports_already_running() {
    let dir = tempfile::tempdir().unwrap();
    let port = free_port();
    let controller = ServerLifecycleController::new();
    controller.start(dir.path(), port).unwrap();

    assert!(matches!(
        controller.start(dir.path(), port),
        Err(StartError::AlreadyRunning)
    ));
    assert_eq!(controller.current_state(), LifecycleState::Running);

    controller.stop().unwrap();
}

#[test]
fn invalid_inputs_are_rejected_while_idle() {
    let controller = ServerLifecycleController::new();

    assert!(matches!(
        controller.start("/definitely/not/a/real/dir", 8123),
        Err(StartError::InvalidDirectory(_))
    ));
    assert_eq!(controller.current_state(), LifecycleState::Idle);

    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        controller.start(dir.path(), 0),
        Err(StartError::InvalidPort)
    ));
    assert_eq!(controller.current_state(), LifecycleState::Idle);
}

#[test]
fn occupied_port_fails_with_port_in_use_and_allows_retry() {
    let dir = tempfile::tempdir().unwrap();
    let occupant = TcpListener::bind("0.0.0.0:0").unwrap();
    let taken = occupant.local_addr().unwrap().port();

    let controller = ServerLifecycleController::new();
    let err = controller.start(dir.path(), taken).unwrap_err();
    assert!(matches!(err, StartError::PortInUse { port, .. } if port == taken));
    assert_eq!(controller.current_state(), LifecycleState::Failed);

    // ready to retry on a different port
    let port = free_port();
    controller.start(dir.path(), port).unwrap();
    assert_eq!(controller.current_state(), LifecycleState::Running);
    controller.stop().unwrap();
}

#[test]
fn two_controllers_racing_for_one_port_yield_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let port = free_port();

    let first = ServerLifecycleController::new();
    let second = ServerLifecycleController::new();

    first.start(dir.path(), port).unwrap();
    assert_eq!(first.current_state(), LifecycleState::Running);

    assert!(matches!(
        second.start(dir.path(), port),
        Err(StartError::PortInUse { .. })
    ));
    assert_ne!(second.current_state(), LifecycleState::Running);

    first.stop().unwrap();
}

#[test]
fn log_records_arrive_in_order_with_lifecycle_bookends() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "a").unwrap();

    let port = free_port();
    let controller = ServerLifecycleController::new();
    let records: Arc<Mutex<Vec<LogRecord>>> = Arc::default();
    let sink_records = Arc::clone(&records);
    controller.register_log_sink(move |record| sink_records.lock().unwrap().push(record));

    controller.start(dir.path(), port).unwrap();
    http_get(port, "/a.txt");
    http_get(port, "/missing");
    controller.stop().unwrap();

    // delivery is asynchronous; wait for all four records
    let deadline = Instant::now() + Duration::from_secs(2);
    let snapshot = loop {
        let snapshot = records.lock().unwrap().clone();
        if snapshot.len() >= 4 {
            break snapshot;
        }
        assert!(
            Instant::now() < deadline,
            "records not delivered in time: {snapshot:?}"
        );
        thread::sleep(Duration::from_millis(10));
    };

    assert_eq!(snapshot.len(), 4, "unexpected records: {snapshot:?}");
    assert!(snapshot[0].summary.contains("serving"), "{:?}", snapshot[0]);
    assert!(snapshot[1].summary.contains("/a.txt"), "{:?}", snapshot[1]);
    assert!(snapshot[1].summary.contains("200"), "{:?}", snapshot[1]);
    assert!(snapshot[2].summary.contains("/missing"), "{:?}", snapshot[2]);
    assert!(snapshot[2].summary.contains("404"), "{:?}", snapshot[2]);
    assert_eq!(snapshot[3].summary, "server stopped");
}

#[test]
fn dropping_the_controller_stops_the_server() {
    let dir = tempfile::tempdir().unwrap();
    let port = free_port();

    let controller = ServerLifecycleController::new();
    controller.start(dir.path(), port).unwrap();
    assert!(TcpStream::connect(("127.0.0.1", port)).is_ok());
    drop(controller);

    assert!(
        TcpStream::connect(("127.0.0.1", port)).is_err(),
        "port still accepting after controller drop"
    );
}
