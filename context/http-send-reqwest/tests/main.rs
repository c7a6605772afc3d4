use bytes::Bytes;
use everytrail_core::{Body, ErrorKind, HttpSend};
use everytrail_http_send_reqwest::ReqwestHttpSend;
use futures::stream;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Read one request and return its body.
async fn read_request(socket: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.expect("read must succeed");
        assert!(n > 0, "connection closed before headers were complete");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
    let length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .map(|v| v.trim().parse::<usize>().expect("content-length must be a number"))
        .unwrap_or(0);

    while buf.len() < header_end + length {
        let n = socket.read(&mut chunk).await.expect("read must succeed");
        assert!(n > 0, "connection closed before body was complete");
        buf.extend_from_slice(&chunk[..n]);
    }
    buf[header_end..header_end + length].to_vec()
}

#[tokio::test]
async fn test_stream_body_is_sent() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let body = read_request(&mut socket).await;
        let reply = format!("<received bytes=\"{}\"/>", body.len());
        let resp = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: text/xml\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            reply.len(),
            reply
        );
        socket.write_all(resp.as_bytes()).await.unwrap();
        body
    });

    let chunks = vec![
        Ok(Bytes::from_static(b"hello ")),
        Ok(Bytes::from_static(b"every")),
        Ok(Bytes::from_static(b"trail")),
    ];
    let req = http::Request::post(format!("http://{addr}/api/photo/upload"))
        .body(Body::Stream {
            stream: Box::pin(stream::iter(chunks)),
            length: 16,
        })
        .unwrap();

    let resp = ReqwestHttpSend::default()
        .http_send(req, Some(Duration::from_secs(5)))
        .await
        .expect("request must succeed");

    assert_eq!(resp.status(), http::StatusCode::OK);
    assert_eq!(resp.body().as_ref(), b"<received bytes=\"16\"/>");
    assert_eq!(server.await.unwrap(), b"hello everytrail");
}

#[tokio::test]
async fn test_timeout_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let _server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        // Hold the connection open without answering.
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(socket);
    });

    let req = http::Request::get(format!("http://{addr}/api/trip/search"))
        .body(Body::Empty)
        .unwrap();
    let err = ReqwestHttpSend::default()
        .http_send(req, Some(Duration::from_millis(200)))
        .await
        .expect_err("request must time out");

    assert_eq!(err.kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn test_connection_error_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let req = http::Request::get(format!("http://{addr}/api/trip/search"))
        .body(Body::Empty)
        .unwrap();
    let err = ReqwestHttpSend::default()
        .http_send(req, Some(Duration::from_secs(5)))
        .await
        .expect_err("request must fail");

    assert_eq!(err.kind(), ErrorKind::Connection);
}
