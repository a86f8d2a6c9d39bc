//! Client decoding against a raw HTTP server that controls chunk boundaries
//! byte by byte.

use std::time::Duration;

use chat_relay::decoder::DecodeError;
use chat_relay::{ChatClient, ClientError, Role};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// How the raw server finishes its response.
#[derive(Clone, Copy)]
enum Finish {
    Clean,
    Abort,
}

/// Serve one chunked `text/plain` response made of `chunks`, exactly as
/// given, and return the endpoint URL.
async fn serve_raw(chunks: Vec<Vec<u8>>, finish: Finish) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;

        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: text/plain; charset=utf-8\r\ntransfer-encoding: chunked\r\n\r\n",
            )
            .await
            .unwrap();
        for chunk in chunks {
            if chunk.is_empty() {
                continue;
            }
            let mut frame = format!("{:x}\r\n", chunk.len()).into_bytes();
            frame.extend_from_slice(&chunk);
            frame.extend_from_slice(b"\r\n");
            socket.write_all(&frame).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        if let Finish::Clean = finish {
            socket.write_all(b"0\r\n\r\n").await.unwrap();
            socket.flush().await.unwrap();
            // Let the client read the terminator before the socket closes.
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    });

    format!("http://{addr}/api/chat")
}

/// Consume request headers and a `content-length` body.
async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    loop {
        let n = socket.read(&mut tmp).await.unwrap();
        assert!(n > 0, "client closed before sending a request");
        buf.extend_from_slice(&tmp[..n]);
        let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
        let content_length = headers
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= header_end + 4 + content_length {
            return;
        }
    }
}

#[tokio::test]
async fn code_points_split_across_chunks_are_reassembled() {
    let text = "héllo → wörld 💬 日本語";
    let bytes = text.as_bytes();

    // Split inside the 4-byte emoji and inside a 3-byte CJK character.
    let emoji = text.find('💬').unwrap();
    let cjk = text.find('本').unwrap();
    let chunks = vec![
        bytes[..emoji + 1].to_vec(),
        bytes[emoji + 1..emoji + 3].to_vec(),
        bytes[emoji + 3..cjk + 2].to_vec(),
        bytes[cjk + 2..].to_vec(),
    ];

    let url = serve_raw(chunks, Finish::Clean).await;
    let mut client = ChatClient::new(url);
    let mut fragments = Vec::new();
    let reply = client
        .send_streaming("Hello", |f| fragments.push(f.to_owned()))
        .await
        .unwrap();

    assert_eq!(reply.content, text);
    assert_eq!(fragments.concat(), text);
}

#[tokio::test]
async fn one_byte_chunks_are_reassembled() {
    let text = "Hi there! 💬";
    let chunks = text.bytes().map(|b| vec![b]).collect();

    let url = serve_raw(chunks, Finish::Clean).await;
    let mut client = ChatClient::new(url);
    assert_eq!(client.send("Hello").await.unwrap().content, text);
}

#[tokio::test]
async fn zero_chunks_yield_empty_reply() {
    let url = serve_raw(Vec::new(), Finish::Clean).await;
    let mut client = ChatClient::new(url);
    let reply = client.send("Hello").await.unwrap();
    assert_eq!(reply.content, "");
    assert_eq!(reply.role, Role::Assistant);
}

#[tokio::test]
async fn dangling_partial_code_point_is_malformed() {
    let emoji = "💬".as_bytes();
    let url = serve_raw(vec![b"ok ".to_vec(), emoji[..2].to_vec()], Finish::Clean).await;

    let mut client = ChatClient::new(url);
    assert!(matches!(
        client.send("Hello").await,
        Err(ClientError::Decode(DecodeError::InvalidUtf8 { offset: 3 }))
    ));
    assert_eq!(client.transcript().len(), 1);
}

#[tokio::test]
async fn aborted_body_is_a_transport_error_and_discards_partial_text() {
    let url = serve_raw(vec![b"Partial".to_vec()], Finish::Abort).await;

    let mut client = ChatClient::new(url);
    match client.send("Hello").await {
        Err(ClientError::Decode(DecodeError::Transport { bytes_received, .. })) => {
            assert_eq!(bytes_received, 7);
        }
        other => panic!("expected transport error, got {other:?}"),
    }
    let entries = client.transcript().snapshot();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].role, Role::User);
}
