use std::error::Error as _;
use std::io::{BufRead as _, BufReader, Read as _, Write as _};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context as _, Result};
use mercure_publisher::{Message, PublishErrorKind, Publisher, PublisherOptions};
use serde::Serialize;
use tiny_http::{Response, Server};
use tokio_util::sync::CancellationToken;

const TEST_TOKEN: &str = "test-jwt-token";

#[derive(Debug)]
struct ReceivedRequest {
    method: String,
    path: String,
    authorization: Option<String>,
    content_type: Option<String>,
    body: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SimplePayload {
    value: &'static str,
}

/// Starts a hub which answers a single publish request with `status` and
/// `content`, and hands the received request back.
fn one_shot_hub(
    status: u16,
    content: &'static str,
) -> Result<(String, mpsc::Receiver<ReceivedRequest>)> {
    let server = Server::http("127.0.0.1:0").map_err(|err| anyhow!(err))?;
    let addr = server
        .server_addr()
        .to_ip()
        .context("hub is not listening on an IP address")?;
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let Ok(mut request) = server.recv() else {
            return;
        };
        let header = |name: &'static str| {
            request
                .headers()
                .iter()
                .find(|header| header.field.equiv(name))
                .map(|header| header.value.as_str().to_owned())
        };
        let authorization = header("Authorization");
        let content_type = header("Content-Type");
        let method = request.method().to_string();
        let path = request.url().to_owned();
        let mut body = String::new();
        let _ = request.as_reader().read_to_string(&mut body);
        let _ = tx.send(ReceivedRequest {
            method,
            path,
            authorization,
            content_type,
            body,
        });
        let _ = request.respond(Response::from_string(content).with_status_code(status));
    });

    Ok((format!("http://{addr}"), rx))
}

/// Reads one HTTP request (head and body) from `stream`.
fn read_request(stream: &TcpStream) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);
    let mut content_length = 0;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 || line == "\r\n" {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    let mut body = vec![0; content_length];
    reader.read_exact(&mut body)
}

/// Starts a hub which answers a single publish request with a 500 response
/// announcing a longer body than it sends. The connection is closed once
/// `hold_open` is dropped, or right away if it is `None`.
fn truncating_hub(hold_open: Option<mpsc::Receiver<()>>) -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        if read_request(&stream).is_err() {
            return;
        }
        let _ = stream.write_all(
            b"HTTP/1.1 500 Internal Server Error\r\nContent-Type: text/plain\r\n\
              Content-Length: 100\r\nConnection: close\r\n\r\npartial",
        );
        let _ = stream.flush();
        if let Some(hold_open) = hold_open {
            let _ = hold_open.recv();
        }
    });

    Ok(format!("http://{addr}"))
}

#[tokio::test]
async fn it_publishes_to_hub() -> Result<()> {
    let (host, rx) = one_shot_hub(200, "urn:uuid:5e94c686-2c0b-4f9b-958c-92ccc3bbb4eb")?;
    let publisher = Publisher::from_options(&PublisherOptions::new(host, TEST_TOKEN))?;
    let message = Message::new("test/topic", SimplePayload {
        value: "test-value",
    })
    .with_id("msg-123");

    publisher.publish(&message, None).await?;

    let request = rx.recv().context("hub received no request")?;
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/.well-known/mercure");
    assert_eq!(request.authorization.as_deref(), Some("Bearer test-jwt-token"));
    assert_eq!(
        request.content_type.as_deref(),
        Some("application/x-www-form-urlencoded")
    );
    assert_eq!(
        request.body,
        "id=msg-123&topic=test%2Ftopic&data=%7B%22Value%22%3A%22test-value%22%7D"
    );
    Ok(())
}

#[tokio::test]
async fn it_publishes_to_hub_under_path_prefix() -> Result<()> {
    let (host, rx) = one_shot_hub(200, "")?;
    let options = PublisherOptions::new(format!("{host}/hub"), TEST_TOKEN);
    let publisher = Publisher::from_options(&options)?;

    publisher
        .publish(
            &Message::new("test/topic", SimplePayload { value: "v" }),
            None,
        )
        .await?;

    let request = rx.recv().context("hub received no request")?;
    assert_eq!(request.path, "/hub/.well-known/mercure");
    Ok(())
}

#[tokio::test]
async fn it_reports_hub_rejection() -> Result<()> {
    let (host, _rx) = one_shot_hub(500, "hub is on fire")?;
    let publisher = Publisher::from_options(&PublisherOptions::new(host, TEST_TOKEN))?;

    let err = publisher
        .publish(
            &Message::new("test/topic", SimplePayload { value: "v" }),
            None,
        )
        .await
        .expect_err("publish should fail");

    assert!(matches!(err.kind(), PublishErrorKind::Rejected { .. }));
    let msg = err.to_string();
    assert!(msg.contains("500"), "{msg}");
    assert!(msg.contains("hub is on fire"), "{msg}");
    assert!(err.source().is_none());
    Ok(())
}

#[tokio::test]
async fn it_reports_connection_failure() -> Result<()> {
    let host = {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        format!("http://{addr}", addr = listener.local_addr()?)
    };
    let publisher = Publisher::from_options(&PublisherOptions::new(host, TEST_TOKEN))?;

    let err = publisher
        .publish(
            &Message::new("test/topic", SimplePayload { value: "v" }),
            None,
        )
        .await
        .expect_err("publish should fail");

    assert!(matches!(err.kind(), PublishErrorKind::SendRequest));
    assert!(err.to_string().starts_with("Failed to send to Mercure: "));
    let source = err
        .source()
        .and_then(|err| err.downcast_ref::<reqwest::Error>())
        .context("source should be a reqwest error")?;
    assert!(source.is_connect());
    Ok(())
}

#[tokio::test]
async fn it_reports_failure_to_read_rejection_body() -> Result<()> {
    let host = truncating_hub(None)?;
    let publisher = Publisher::from_options(&PublisherOptions::new(host, TEST_TOKEN))?;

    let err = publisher
        .publish(
            &Message::new("test/topic", SimplePayload { value: "v" }),
            None,
        )
        .await
        .expect_err("publish should fail");

    assert!(matches!(err.kind(), PublishErrorKind::ReadResponse));
    assert!(err.to_string().starts_with("Failed to send to Mercure: "));
    assert!(err
        .source()
        .and_then(|err| err.downcast_ref::<reqwest::Error>())
        .is_some());
    assert!(!err.is_cancelled());
    Ok(())
}

#[tokio::test]
async fn it_abandons_reading_rejection_body_when_cancelled() -> Result<()> {
    let (_hold_open, hold_open_rx) = mpsc::channel();
    let host = truncating_hub(Some(hold_open_rx))?;
    let publisher = Publisher::from_options(&PublisherOptions::new(host, TEST_TOKEN))?;
    let cancel = CancellationToken::new();
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        })
    };

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        publisher.publish(
            &Message::new("test/topic", SimplePayload { value: "v" }),
            Some(&cancel),
        ),
    )
    .await
    .context("publish was not abandoned")?
    .expect_err("publish should fail");
    canceller.await?;

    assert!(matches!(err.kind(), PublishErrorKind::Cancelled));
    assert!(err.is_cancelled());
    Ok(())
}
