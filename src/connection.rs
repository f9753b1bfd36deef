use bytes::{Bytes, BytesMut};
use futures::SinkExt;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::codec::{BytesCodec, FramedWrite};
use uuid::Uuid;

/// What the writer side of a connection receives, in order.
#[derive(Debug, PartialEq)]
pub enum Outbound {
    Data(Bytes),
    /// Everything queued before this is flushed, then the write half is shut down.
    Close,
}

/// A handle to a live client connection.
///
/// Handles are cheap to clone and can be used from any thread: writes are pushed into an
/// unbounded per-connection queue that a single writer task drains in order, see [`write_loop`].
/// Once the connection is closed every write is dropped and reported as not delivered.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    id: Uuid,
    addr: SocketAddr,
    tx: UnboundedSender<Outbound>,
    closed: AtomicBool,
}

impl Connection {
    /// Creates a handle and the receiving end of its outbound queue.
    pub fn new(addr: SocketAddr) -> (Connection, UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            id: Uuid::new_v4(),
            addr,
            tx,
            closed: AtomicBool::new(false),
        });

        (Connection { inner }, rx)
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.inner.addr
    }

    /// Queues `bytes` for delivery. Returns `false` if the connection is already gone.
    pub fn write(&self, bytes: Bytes) -> bool {
        if self.is_closed() {
            return false;
        }
        self.inner.tx.send(Outbound::Data(bytes)).is_ok()
    }

    /// Queues several encoded values as a single write.
    pub fn write_batch(&self, chunks: Vec<Bytes>) -> bool {
        match chunks.len() {
            0 => true,
            1 => self.write(chunks.into_iter().next().unwrap_or_default()),
            _ => {
                let len = chunks.iter().map(Bytes::len).sum();
                let mut buf = BytesMut::with_capacity(len);
                for chunk in chunks {
                    buf.extend_from_slice(&chunk);
                }
                self.write(buf.freeze())
            }
        }
    }

    /// Marks the connection closed. Data queued so far is still flushed. Calling it more than
    /// once is harmless.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            let _ = self.inner.tx.send(Outbound::Close);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Connection {}

impl Hash for Connection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("addr", &self.inner.addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Drains a connection's outbound queue into `writer` until the connection is closed or every
/// handle is dropped.
pub async fn write_loop<W>(mut rx: UnboundedReceiver<Outbound>, writer: W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, BytesCodec::new());

    while let Some(outbound) = rx.recv().await {
        match outbound {
            Outbound::Data(bytes) => {
                // Coalesce whatever else is already queued into the same flush.
                sink.feed(bytes).await?;
                let mut close = false;
                while let Ok(next) = rx.try_recv() {
                    match next {
                        Outbound::Data(bytes) => sink.feed(bytes).await?,
                        Outbound::Close => {
                            close = true;
                            break;
                        }
                    }
                }
                SinkExt::<Bytes>::flush(&mut sink).await?;
                if close {
                    break;
                }
            }
            Outbound::Close => break,
        }
    }

    SinkExt::<Bytes>::close(&mut sink).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:6380".parse().unwrap()
    }

    #[test]
    fn write_batch_is_a_single_write() {
        let (conn, mut rx) = Connection::new(addr());

        assert!(conn.write_batch(vec![Bytes::from("+OK\r\n"), Bytes::from(":1\r\n")]));

        assert_eq!(rx.try_recv().unwrap(), Outbound::Data(Bytes::from("+OK\r\n:1\r\n")));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn writes_after_close_are_dropped() {
        let (conn, mut rx) = Connection::new(addr());

        assert!(conn.write(Bytes::from("+OK\r\n")));
        conn.close();
        conn.close();

        assert!(!conn.write(Bytes::from("+LATE\r\n")));
        assert_eq!(rx.try_recv().unwrap(), Outbound::Data(Bytes::from("+OK\r\n")));
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn writes_fail_when_writer_is_gone() {
        let (conn, rx) = Connection::new(addr());
        drop(rx);

        assert!(!conn.write(Bytes::from("+OK\r\n")));
    }

    #[test]
    fn clones_are_the_same_connection() {
        let (a, _rx_a) = Connection::new(addr());
        let (b, _rx_b) = Connection::new(addr());

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn write_loop_flushes_before_close() {
        let (conn, rx) = Connection::new(addr());
        let (client, server) = tokio::io::duplex(64);

        conn.write(Bytes::from("+OK\r\n"));
        conn.write(Bytes::from(":2\r\n"));
        conn.close();

        write_loop(rx, server).await.unwrap();

        let mut received = Vec::new();
        let mut client = client;
        tokio::io::AsyncReadExt::read_to_end(&mut client, &mut received)
            .await
            .unwrap();

        assert_eq!(received, b"+OK\r\n:2\r\n");
    }
}
