use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{BytesCodec, FramedRead};
use tracing::{debug, error, info, instrument, warn};

use crate::codec;
use crate::commands::{self, Context};
use crate::config::Config;
use crate::connection::{self, Connection};
use crate::pubsub::{Kind, PubSub};
use crate::router::{Action, Router};
use crate::session::Session;
use crate::store::Store;
use crate::Result;

/// Ties the decoding, dispatch and pub/sub pieces to a connection's lifecycle.
///
/// The facade doesn't own sockets: whatever drives I/O calls [`Server::on_open`] when a client
/// connects, [`Server::on_data_ready`] with every chunk it reads, and [`Server::on_close`] once
/// the client is gone. [`serve`] is such a driver on top of tokio.
#[derive(Clone)]
pub struct Server {
    router: Arc<Router>,
    pubsub: PubSub,
    config: Config,
}

impl Server {
    pub fn new(router: Router, pubsub: PubSub, config: Config) -> Server {
        Server {
            router: Arc::new(router),
            pubsub,
            config,
        }
    }

    pub fn pubsub(&self) -> &PubSub {
        &self.pubsub
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sends `message` to the subscribers of `channel`. Returns the number of deliveries.
    pub fn publish(&self, channel: &[u8], message: &[u8]) -> usize {
        self.pubsub.publish(channel, message)
    }

    pub fn subscribe(&self, conn: &Connection, kind: Kind, names: &[Bytes]) -> usize {
        self.pubsub.subscribe(conn, kind, names)
    }

    pub fn on_open(&self, conn: &Connection) -> Session {
        debug!("Opening session for {} ({})", conn.id(), conn.addr());
        Session::new(self.config.limits(), self.config.read_buffer_size)
    }

    /// Decodes `data` and, once no command is left half-received, dispatches the whole batch.
    ///
    /// A malformed stream gets one error reply and [`Action::Close`]: there is no way to find the
    /// next command boundary again.
    pub fn on_data_ready(&self, conn: &Connection, session: &mut Session, data: &[u8]) -> Action {
        match session.feed(data) {
            Ok(Some(batch)) => self.router.dispatch(conn, batch),
            Ok(None) => Action::Continue,
            Err(err) => {
                warn!("Closing connection {}: {}", conn.id(), err);
                let mut dst = BytesMut::new();
                codec::append_error(&mut dst, &format!("ERR {}", err));
                conn.write(dst.freeze());
                Action::Close
            }
        }
    }

    /// Drops the session and every subscription of the connection, then closes it.
    pub fn on_close(&self, conn: &Connection, session: Session) {
        if session.has_partial_frame() {
            debug!("Connection {} left a partial command behind", conn.id());
        }
        drop(session);

        self.pubsub.on_disconnect(conn.id());
        conn.close();
    }
}

/// Binds to the configured address and serves the example commands until the listener fails.
pub async fn run(config: Config) -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;

    let ctx = Context::new(Store::new(), PubSub::new());
    let router = commands::router(ctx.clone());
    let server = Server::new(router, ctx.pubsub, config);

    serve(listener, server).await
}

/// Accepts connections on `listener`, one task per connection.
pub async fn serve(listener: TcpListener, server: Server) -> Result<()> {
    info!("Server listening on {}", listener.local_addr()?);

    loop {
        let (socket, client_address) = listener.accept().await?;
        let server = server.clone();
        info!("Accepted connection from {:?}", client_address);

        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, client_address, server).await {
                error!("Connection failed: {}", e);
            }
        });
    }
}

#[instrument(
    name = "connection",
    skip(stream, server),
    fields(connection_id, client_address)
)]
async fn handle_connection(
    stream: TcpStream,
    client_address: SocketAddr,
    server: Server,
) -> Result<()> {
    let (conn, rx) = Connection::new(client_address);

    tracing::Span::current()
        .record("connection_id", conn.id().to_string())
        .record("client_address", client_address.to_string());

    let (reader, writer) = stream.into_split();
    let writer = tokio::spawn(connection::write_loop(rx, writer));

    let mut chunks =
        FramedRead::with_capacity(reader, BytesCodec::new(), server.config.read_buffer_size);
    let mut session = server.on_open(&conn);

    let result = loop {
        match chunks.next().await {
            Some(Ok(chunk)) => {
                if server.on_data_ready(&conn, &mut session, &chunk) == Action::Close {
                    break Ok(());
                }
            }
            Some(Err(e)) => break Err(e.into()),
            None => break Ok(()),
        }
    };

    server.on_close(&conn, session);

    match writer.await {
        Ok(Err(e)) => debug!("Writer stopped: {}", e),
        Err(e) => warn!("Writer task failed: {}", e),
        Ok(Ok(())) => {}
    }

    info!("Connection closed");
    result
}
