//! End-to-end waiter runs against real local sockets.

use std::io::{Read, Write};
use std::net::TcpListener;

use initwait::config::loader::parse;
use initwait::runtime::ProbeTarget;
use initwait::{Executor, EXIT_FAILED, EXIT_READY};

fn executor(yaml: &str) -> Executor {
    let doc = parse(yaml, "test").expect("parse document");
    Executor::new(&doc).expect("compile document")
}

/// Minimal HTTP server answering one request with the given status line.
fn serve_one_http(listener: TcpListener, status_line: &'static str) {
    std::thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buf = [0u8; 2048];
            let _ = stream.read(&mut buf);
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                status_line
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });
}

#[tokio::test]
async fn all_mode_succeeds_when_target_is_open() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let yaml = format!(
        "mode: all\ndependencies:\n  db:\n    host: 127.0.0.1\n    ports: [{}]\n    timeout: 1\n",
        port
    );
    assert_eq!(executor(&yaml).run().await, EXIT_READY);
}

#[tokio::test]
async fn all_mode_fails_after_attempt_budget() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let yaml = format!(
        "mode: all\ndependencies:\n  mq:\n    host: 127.0.0.1\n    ports: [{}]\n    attempts: 2\n    delay: 1\n    timeout: 1\n",
        port
    );
    assert_eq!(executor(&yaml).run().await, EXIT_FAILED);
}

#[tokio::test]
async fn http_dependency_succeeds_on_200() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    serve_one_http(listener, "200 OK");

    let yaml = format!(
        "dependencies:\n  api:\n    http: \"http://127.0.0.1:{}/health\"\n    attempts: 1\n    timeout: 2\n",
        port
    );
    assert_eq!(executor(&yaml).run().await, EXIT_READY);
}

#[tokio::test]
async fn http_dependency_fails_on_500() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    serve_one_http(listener, "500 Internal Server Error");

    let yaml = format!(
        "dependencies:\n  api:\n    http: \"http://127.0.0.1:{}/health\"\n    attempts: 1\n    timeout: 2\n",
        port
    );
    assert_eq!(executor(&yaml).run().await, EXIT_FAILED);
}

#[tokio::test]
async fn http_dependency_fails_on_truncated_body() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    // Claims a 64-byte body, sends 5 bytes, hangs up.
    std::thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buf = [0u8; 2048];
            let _ = stream.read(&mut buf);
            let _ = stream.write_all(
                b"HTTP/1.1 200 OK\r\nContent-Length: 64\r\nConnection: close\r\n\r\nshort",
            );
        }
    });

    let yaml = format!(
        "dependencies:\n  api:\n    http: \"http://127.0.0.1:{}/health\"\n    attempts: 1\n    timeout: 2\n",
        port
    );
    assert_eq!(executor(&yaml).run().await, EXIT_FAILED);
}

#[tokio::test]
async fn any_mode_within_a_dependency_needs_one_open_port() {
    let open = TcpListener::bind("127.0.0.1:0").unwrap();
    let open_port = open.local_addr().unwrap().port();
    let closed = TcpListener::bind("127.0.0.1:0").unwrap();
    let closed_port = closed.local_addr().unwrap().port();
    drop(closed);

    let yaml = format!(
        "dependencies:\n  cluster:\n    mode: any\n    host: 127.0.0.1\n    ports: [{}, {}]\n    attempts: 1\n    timeout: 1\n",
        closed_port, open_port
    );
    assert_eq!(executor(&yaml).run().await, EXIT_READY);
}

#[tokio::test]
async fn disabled_document_skips_probing() {
    let doc = parse("enabled: false\ndependencies:\n  db:\n    ports: [5432]\n", "test").unwrap();
    assert!(!doc.enabled);
}

#[test]
fn dynamic_host_resolution_reaches_the_probe_target() {
    std::env::set_var("WAITER_IT_DB_HOST", "db.internal");
    let ex = executor(
        "dependencies:\n  db:\n    host: \"@env:WAITER_IT_DB_HOST\"\n    port: 5432\n",
    );
    assert_eq!(
        ex.dependencies()[0].probes,
        vec![ProbeTarget::Tcp {
            host: "db.internal".to_string(),
            port: 5432
        }]
    );
}

#[test]
fn json_document_compiles_like_yaml() {
    let ex = executor(r#"{"dependencies": {"db": {"host": "db", "ports": [5432, 5433]}}}"#);
    assert_eq!(ex.dependencies()[0].probes.len(), 2);
}
