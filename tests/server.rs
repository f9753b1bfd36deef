use bytes::{Buf, Bytes, BytesMut};
use std::io::Cursor;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout, Duration};

use respcast::commands::{self, Context};
use respcast::frame::{self, Frame};
use respcast::server::{serve, Server};
use respcast::Config;

async fn start() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let ctx = Context::default();
    let server = Server::new(commands::router(ctx.clone()), ctx.pubsub, Config::default());
    tokio::spawn(serve(listener, server));

    addr
}

struct Client {
    stream: TcpStream,
    buffer: BytesMut,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Client {
        Client {
            stream: TcpStream::connect(addr).await.unwrap(),
            buffer: BytesMut::with_capacity(4096),
        }
    }

    async fn send(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    async fn command(&mut self, parts: &[&str]) {
        let mut encoded = format!("*{}\r\n", parts.len());
        for part in parts {
            encoded.push_str(&format!("${}\r\n{}\r\n", part.len(), part));
        }
        self.send(encoded.as_bytes()).await;
    }

    /// Next reply, or `None` once the server closed the connection.
    async fn read_frame(&mut self) -> Option<Frame> {
        timeout(Duration::from_secs(5), self.next_frame())
            .await
            .expect("timed out waiting for a reply")
    }

    async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let parsed = {
                let mut cursor = Cursor::new(&self.buffer[..]);
                match Frame::parse(&mut cursor) {
                    Ok(frame) => Some((frame, cursor.position() as usize)),
                    Err(frame::Error::Incomplete) => None,
                    Err(e) => panic!("unexpected reply: {:?}", e),
                }
            };

            if let Some((frame, len)) = parsed {
                self.buffer.advance(len);
                return Some(frame);
            }

            if self.stream.read_buf(&mut self.buffer).await.unwrap() == 0 {
                return None;
            }
        }
    }
}

fn bulk(value: &'static str) -> Frame {
    Frame::Bulk(Bytes::from(value))
}

#[tokio::test]
async fn pipelined_replies_keep_request_order() {
    let mut client = Client::connect(start().await).await;

    client
        .send(
            b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n\
              *2\r\n$3\r\nGET\r\n$3\r\nkey\r\n\
              *1\r\n$4\r\nPING\r\n",
        )
        .await;

    assert_eq!(client.read_frame().await, Some(Frame::Simple("OK".into())));
    assert_eq!(client.read_frame().await, Some(bulk("value")));
    assert_eq!(client.read_frame().await, Some(Frame::Simple("PONG".into())));
}

#[tokio::test]
async fn commands_split_across_writes() {
    let mut client = Client::connect(start().await).await;

    client.send(b"*2\r\n$4\r\nEC").await;
    sleep(Duration::from_millis(20)).await;
    client.send(b"HO\r\n$11\r\nhello").await;
    sleep(Duration::from_millis(20)).await;
    client.send(b" world\r\n").await;

    assert_eq!(client.read_frame().await, Some(bulk("hello world")));
}

#[tokio::test]
async fn set_with_a_missing_value_is_rejected() {
    let mut client = Client::connect(start().await).await;

    client.command(&["SET", "key"]).await;
    assert_eq!(
        client.read_frame().await,
        Some(Frame::Error(
            "ERR wrong number of arguments for 'set' command".into()
        ))
    );

    client.command(&["GET", "key"]).await;
    assert_eq!(client.read_frame().await, Some(Frame::Null));

    client.command(&["SET", "key", "value"]).await;
    client.command(&["GET", "key"]).await;
    assert_eq!(client.read_frame().await, Some(Frame::Simple("OK".into())));
    assert_eq!(client.read_frame().await, Some(bulk("value")));
}

#[tokio::test]
async fn quit_closes_after_the_whole_batch() {
    let addr = start().await;
    let mut client = Client::connect(addr).await;

    client
        .send(
            b"*1\r\n$4\r\nPING\r\n*1\r\n$4\r\nQUIT\r\n\
              *3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n",
        )
        .await;

    assert_eq!(client.read_frame().await, Some(Frame::Simple("PONG".into())));
    assert_eq!(client.read_frame().await, Some(Frame::Simple("OK".into())));
    assert_eq!(client.read_frame().await, Some(Frame::Simple("OK".into())));
    assert_eq!(client.read_frame().await, None);

    let mut other = Client::connect(addr).await;
    other.command(&["GET", "key"]).await;
    assert_eq!(other.read_frame().await, Some(bulk("value")));
}

#[tokio::test]
async fn protocol_error_closes_the_connection() {
    let mut client = Client::connect(start().await).await;

    client.send(b"PING\r\n").await;

    assert_eq!(
        client.read_frame().await,
        Some(Frame::Error(
            "ERR Protocol error: expected '*', got 'P'".into()
        ))
    );
    assert_eq!(client.read_frame().await, None);
}

#[tokio::test]
async fn publish_reaches_channel_and_pattern_subscribers() {
    let addr = start().await;
    let mut a = Client::connect(addr).await;
    let mut b = Client::connect(addr).await;
    let mut publisher = Client::connect(addr).await;

    a.command(&["SUBSCRIBE", "news"]).await;
    assert_eq!(
        a.read_frame().await,
        Some(Frame::Array(vec![
            bulk("subscribe"),
            bulk("news"),
            Frame::Integer(1)
        ]))
    );

    b.command(&["PSUBSCRIBE", "new.*"]).await;
    assert_eq!(
        b.read_frame().await,
        Some(Frame::Array(vec![
            bulk("psubscribe"),
            bulk("new.*"),
            Frame::Integer(1)
        ]))
    );

    publisher.command(&["PUBLISH", "news", "hi"]).await;
    assert_eq!(publisher.read_frame().await, Some(Frame::Integer(2)));

    assert_eq!(
        a.read_frame().await,
        Some(Frame::Array(vec![bulk("message"), bulk("news"), bulk("hi")]))
    );
    assert_eq!(
        b.read_frame().await,
        Some(Frame::Array(vec![
            bulk("pmessage"),
            bulk("new.*"),
            bulk("news"),
            bulk("hi")
        ]))
    );
}

#[tokio::test]
async fn disconnected_subscribers_are_forgotten() {
    let addr = start().await;
    let mut subscriber = Client::connect(addr).await;
    let mut publisher = Client::connect(addr).await;

    subscriber.command(&["SUBSCRIBE", "news"]).await;
    subscriber.read_frame().await;
    drop(subscriber);

    // The server notices the disconnect asynchronously.
    let mut delivered = None;
    for _ in 0..50 {
        publisher.command(&["PUBLISH", "news", "hi"]).await;
        delivered = publisher.read_frame().await;
        if delivered == Some(Frame::Integer(0)) {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(delivered, Some(Frame::Integer(0)));

    publisher.command(&["PUBSUB", "NUMSUB", "news"]).await;
    assert_eq!(
        publisher.read_frame().await,
        Some(Frame::Array(vec![bulk("news"), Frame::Integer(0)]))
    );
}

#[tokio::test]
async fn subscriber_keeps_answering_commands() {
    let mut client = Client::connect(start().await).await;

    client
        .send(b"*1\r\n$4\r\nPING\r\n*2\r\n$9\r\nSUBSCRIBE\r\n$1\r\na\r\n*1\r\n$4\r\nPING\r\n")
        .await;

    assert_eq!(client.read_frame().await, Some(Frame::Simple("PONG".into())));
    assert_eq!(
        client.read_frame().await,
        Some(Frame::Array(vec![bulk("subscribe"), bulk("a"), Frame::Integer(1)]))
    );
    assert_eq!(client.read_frame().await, Some(Frame::Simple("PONG".into())));
}
