/// Message delivery integration tests: webhook file lookup and real HTTP
/// against a loopback listener.

use herald::core::grammar::GrammarSet;
use herald::core::message::{DeliveryState, Message, MessageError};
use herald::core::transport::{
    HttpTransport, Transport, TransportError, TransportResponse, WebhookPayload,
};
use herald::core::webhooks::{WebhookFile, WebhookMap, WebhookStore};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cell::Cell;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread;

/// Accept one request, answer with `status_line`, and hand back the raw
/// request text.
fn spawn_hook_server(status_line: &'static str) -> (String, thread::JoinHandle<String>) {
    serve_once(format!(
        "{}\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
        status_line
    ))
}

/// Accept one request and write `reply` verbatim.
fn serve_once(reply: String) -> (String, thread::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut request = String::new();
        let mut content_length = 0usize;

        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let lower = line.to_ascii_lowercase();
            if let Some(value) = lower.strip_prefix("content-length:") {
                content_length = value.trim().parse().unwrap();
            }
            request.push_str(&lower);
            if line == "\r\n" || line.is_empty() {
                break;
            }
        }

        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).unwrap();
        request.push_str(&String::from_utf8(body).unwrap());

        stream.write_all(reply.as_bytes()).unwrap();
        request
    });

    (format!("http://{}/hook", addr), handle)
}

fn loopback_transport() -> HttpTransport {
    HttpTransport::with_client(
        reqwest::blocking::Client::builder()
            .no_proxy()
            .build()
            .unwrap(),
    )
}

fn hello_message(target: &str) -> Message {
    let rules = GrammarSet::from_rules([
        ("origin", vec!["Hello, #name#!"]),
        ("name", vec!["world"]),
    ])
    .unwrap();
    Message::new(
        target,
        "#origin#",
        rules,
        chrono::Utc::now(),
        &mut StdRng::seed_from_u64(0),
    )
    .unwrap()
}

#[test]
fn send_posts_json_content_over_http() {
    let (url, server) = spawn_hook_server("HTTP/1.1 200 OK");
    let hooks: WebhookMap = [("general", url.as_str())].into_iter().collect();
    let mut msg = hello_message("general");

    let receipt = msg.send(&hooks, &loopback_transport()).unwrap();
    let request = server.join().unwrap();

    assert!(request.starts_with("post /hook http/1.1"));
    assert!(request.contains("content-type: application/json"));
    assert!(request.ends_with(r#"{"content":"Hello, world!"}"#));
    assert_eq!(receipt.status, 200);
    assert_eq!(receipt.body, "ok");
    assert!(msg.is_sent());
}

#[test]
fn error_status_still_finalizes_message() {
    let (url, server) = spawn_hook_server("HTTP/1.1 404 Not Found");
    let hooks: WebhookMap = [("general", url.as_str())].into_iter().collect();
    let mut msg = hello_message("general");

    let receipt = msg.send(&hooks, &loopback_transport()).unwrap();
    server.join().unwrap();

    assert_eq!(receipt.status, 404);
    assert!(matches!(msg.state(), DeliveryState::Sent { status: 404, .. }));
    assert!(matches!(
        msg.send(&hooks, &loopback_transport()),
        Err(MessageError::AlreadySent)
    ));
}

#[test]
fn truncated_response_body_leaves_message_unsent() {
    let (url, server) = serve_once(
        "HTTP/1.1 200 OK\r\nContent-Length: 20\r\nConnection: close\r\n\r\nok".to_string(),
    );
    let hooks: WebhookMap = [("general", url.as_str())].into_iter().collect();
    let mut msg = hello_message("general");

    let err = msg.send(&hooks, &loopback_transport()).unwrap_err();
    server.join().unwrap();

    assert!(matches!(err, MessageError::Transport(_)));
    assert_eq!(msg.state(), &DeliveryState::Unsent);
}

/// Fails the first call, then accepts.
struct FlakyTransport {
    calls: Cell<u32>,
}

impl Transport for FlakyTransport {
    fn post_json(
        &self,
        _url: &str,
        payload: &WebhookPayload,
    ) -> Result<TransportResponse, TransportError> {
        self.calls.set(self.calls.get() + 1);
        if self.calls.get() == 1 {
            // A URL reqwest refuses before touching the network.
            return HttpTransport::new().post_json("not a url", payload);
        }
        Ok(TransportResponse {
            status: 204,
            body: String::new(),
        })
    }
}

#[test]
fn transport_failure_leaves_message_retryable() {
    let hooks: WebhookMap = [("general", "https://example.com/hook")]
        .into_iter()
        .collect();
    let transport = FlakyTransport {
        calls: Cell::new(0),
    };
    let mut msg = hello_message("general");

    let err = msg.send(&hooks, &transport).unwrap_err();
    assert!(matches!(err, MessageError::Transport(_)));
    assert_eq!(msg.state(), &DeliveryState::Unsent);

    let receipt = msg.send(&hooks, &transport).unwrap();
    assert_eq!(receipt.status, 204);
    assert_eq!(transport.calls.get(), 2);
    assert!(msg.is_sent());
}

#[test]
fn webhook_file_resolves_fixture_targets() {
    let file = WebhookFile::in_dir("tests/fixtures");
    assert_eq!(
        file.webhook_url("general").unwrap().as_deref(),
        Some("https://example.com/hook")
    );
    let mut msg = hello_message("announcements");

    let err = msg.send(&file, &HttpTransport::new()).unwrap_err();

    assert!(matches!(err, MessageError::UnknownTarget(ref t) if t == "announcements"));
    assert!(!msg.is_sent());
}

#[test]
fn unreadable_webhook_file_is_distinct_from_unknown_target() {
    let file = WebhookFile::in_dir("tests/fixtures/missing_dir");
    let mut msg = hello_message("general");

    let err = msg.send(&file, &HttpTransport::new()).unwrap_err();

    assert!(matches!(err, MessageError::Webhook(_)));
    assert!(!msg.is_sent());
}
