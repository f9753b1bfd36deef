use redis::aio::MultiplexedConnection;
use redis::RedisError;
use tokio::net::TcpListener;

use respcast::commands::{self, Context};
use respcast::server::{serve, Server};
use respcast::Config;

async fn connect() -> Result<MultiplexedConnection, RedisError> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let ctx = Context::default();
    let server = Server::new(commands::router(ctx.clone()), ctx.pubsub, Config::default());
    tokio::spawn(serve(listener, server));

    let client = redis::Client::open(format!("redis://{}/", addr))?;
    client.get_multiplexed_async_connection().await
}

#[tokio::test]
async fn pipeline_set_then_get() {
    let mut conn = connect().await.unwrap();

    let (set, get): (String, String) = redis::pipe()
        .cmd("SET")
        .arg("key")
        .arg("value")
        .cmd("GET")
        .arg("key")
        .query_async(&mut conn)
        .await
        .unwrap();

    assert_eq!(set, "OK");
    assert_eq!(get, "value");
}

#[tokio::test]
async fn missing_key_is_nil() {
    let mut conn = connect().await.unwrap();

    let value: Option<String> = redis::cmd("GET")
        .arg("missing")
        .query_async(&mut conn)
        .await
        .unwrap();

    assert_eq!(value, None);
}

#[tokio::test]
async fn errors_do_not_break_the_connection() {
    let mut conn = connect().await.unwrap();

    let err: Result<(), RedisError> = redis::cmd("SET").arg("key").query_async(&mut conn).await;
    assert!(err.is_err());

    let pong: String = redis::cmd("PING").query_async(&mut conn).await.unwrap();
    assert_eq!(pong, "PONG");
}

#[tokio::test]
async fn publish_without_subscribers() {
    let mut conn = connect().await.unwrap();

    let delivered: i64 = redis::cmd("PUBLISH")
        .arg("news")
        .arg("hi")
        .query_async(&mut conn)
        .await
        .unwrap();

    assert_eq!(delivered, 0);
}
