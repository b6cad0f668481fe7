use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use sqlproxy::codec::{NulCodec, DEFAULT_MAX_FRAME_SIZE};
use sqlproxy::config::Config;
use sqlproxy::executor::Executor;
use sqlproxy::server::{run, serve};
use sqlproxy::store::{Store, DEFAULT_BUSY_TIMEOUT};
use sqlproxy::Error;

struct TestServer {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), Error>>,
    // Keeps the store file alive for the duration of the test.
    _dir: TempDir,
}

async fn start_server() -> TestServer {
    start_server_with_max_frame_size(DEFAULT_MAX_FRAME_SIZE).await
}

async fn start_server_with_max_frame_size(max_frame_size: usize) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path().join("store.db"), DEFAULT_BUSY_TIMEOUT);
    store.bootstrap().unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown, rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(serve(
        listener,
        Executor::new(store),
        max_frame_size,
        async move {
            let _ = rx.await;
        },
    ));

    TestServer {
        addr,
        shutdown,
        handle,
        _dir: dir,
    }
}

type Client = Framed<TcpStream, NulCodec>;

async fn connect(addr: SocketAddr) -> Client {
    let stream = TcpStream::connect(addr).await.unwrap();
    Framed::new(stream, NulCodec::new())
}

async fn query(client: &mut Client, sql: &str) -> String {
    client.send(sql.to_string()).await.unwrap();
    client.next().await.unwrap().unwrap()
}

#[tokio::test]
async fn test_insert_then_select() {
    let server = start_server().await;
    let mut client = connect(server.addr).await;

    let res = query(
        &mut client,
        "INSERT INTO users VALUES ('alice','pw1','2024-01-01')",
    )
    .await;
    assert_eq!(res, "SUCCESS");

    let res = query(&mut client, "SELECT * FROM users").await;
    assert_eq!(res, "SUCCESS|('alice', 'pw1', '2024-01-01')");
}

#[tokio::test]
async fn test_raw_wire_format() {
    let server = start_server().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    stream.write_all(b"SELECT 1, 'one', NULL\0").await.unwrap();

    let expected = b"SUCCESS|(1, 'one', None)\0";
    let mut buf = vec![0u8; expected.len()];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf[..], &expected[..]);
}

#[tokio::test]
async fn test_select_from_nonexistent_table() {
    let server = start_server().await;
    let mut client = connect(server.addr).await;

    let res = query(&mut client, "SELECT * FROM nonexistent_table").await;
    assert!(res.starts_with("ERROR:"), "{}", res);
    assert_eq!(res, "ERROR: no such table: nonexistent_table");
}

#[tokio::test]
async fn test_syntax_error_reply() {
    let server = start_server().await;
    let mut client = connect(server.addr).await;

    let res = query(&mut client, "SELECT FROM WHERE").await;
    assert_eq!(res, "ERROR: near \"FROM\": syntax error");
}

#[tokio::test]
async fn test_connection_survives_failures() {
    let server = start_server().await;
    let mut client = connect(server.addr).await;

    for sql in ["NOT EVEN SQL", "INSERT INTO", "SELECT * FROM", "DELETE FROM nowhere"] {
        let res = query(&mut client, sql).await;
        assert!(res.starts_with("ERROR: "), "{:?} -> {}", sql, res);
    }

    let res = query(&mut client, "SELECT 40 + 2").await;
    assert_eq!(res, "SUCCESS|(42,)");
}

#[tokio::test]
async fn test_duplicate_username_is_rejected() {
    let server = start_server().await;
    let mut client = connect(server.addr).await;

    let sql = "INSERT INTO users (username, password, registration_date) VALUES ('bob', 'x', datetime('now'))";
    assert_eq!(query(&mut client, sql).await, "SUCCESS");

    let res = query(&mut client, sql).await;
    assert!(res.starts_with("ERROR: UNIQUE constraint failed"), "{}", res);

    let res = query(&mut client, "SELECT COUNT(*) FROM users").await;
    assert_eq!(res, "SUCCESS|(1,)");
}

#[tokio::test]
async fn test_login_bookkeeping_through_plain_commands() {
    let server = start_server().await;
    let mut client = connect(server.addr).await;

    let commands = [
        "INSERT INTO login_history (username, login_time) VALUES ('carol', '2024-01-01 10:00:00')",
        "INSERT INTO file_tracking (username, filename, upload_time, game_channel) VALUES ('carol', 'events.json', '2024-01-01 10:05:00', 'germany_spain')",
        "UPDATE login_history SET logout_time = '2024-01-01 11:00:00' WHERE username = 'carol' AND logout_time IS NULL",
    ];
    for sql in commands {
        assert_eq!(query(&mut client, sql).await, "SUCCESS");
    }

    let res = query(&mut client, "SELECT * FROM login_history").await;
    assert_eq!(
        res,
        "SUCCESS|(1, 'carol', '2024-01-01 10:00:00', '2024-01-01 11:00:00')"
    );

    let res = query(
        &mut client,
        "SELECT filename, game_channel FROM file_tracking WHERE username = 'carol'",
    )
    .await;
    assert_eq!(res, "SUCCESS|('events.json', 'germany_spain')");
}

#[tokio::test]
async fn test_writes_are_visible_to_other_connections() {
    let server = start_server().await;
    let mut writer = connect(server.addr).await;
    let mut reader = connect(server.addr).await;

    let res = query(&mut writer, "INSERT INTO users VALUES ('dave', 'pw', 'today')").await;
    assert_eq!(res, "SUCCESS");

    let res = query(&mut reader, "SELECT username FROM users").await;
    assert_eq!(res, "SUCCESS|('dave',)");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_lose_no_updates() {
    const CONNECTIONS: usize = 8;
    const COMMANDS: usize = 25;

    let server = start_server().await;
    let addr = server.addr;

    let tasks = (0..CONNECTIONS)
        .map(|n| {
            tokio::spawn(async move {
                let mut client = connect(addr).await;
                for m in 0..COMMANDS {
                    let sql = format!(
                        "INSERT INTO users VALUES ('user_{}_{}', 'pw', 'now')",
                        n, m
                    );
                    let res = query(&mut client, &sql).await;
                    assert_eq!(res, "SUCCESS", "{}", sql);
                }
            })
        })
        .collect::<Vec<_>>();

    for task in tasks {
        task.await.unwrap();
    }

    let mut client = connect(addr).await;
    let res = query(&mut client, "SELECT COUNT(*) FROM users").await;
    assert_eq!(res, format!("SUCCESS|({},)", CONNECTIONS * COMMANDS));
}

#[tokio::test]
async fn test_client_closes_without_sending() {
    let server = start_server().await;

    let stream = TcpStream::connect(server.addr).await.unwrap();
    drop(stream);

    // A partial frame followed by a close is dropped as well.
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(b"INSERT INTO users VALUES").await.unwrap();
    drop(stream);

    let mut client = connect(server.addr).await;
    let res = query(&mut client, "SELECT COUNT(*) FROM users").await;
    assert_eq!(res, "SUCCESS|(0,)");
}

#[tokio::test]
async fn test_oversized_frame_closes_connection() {
    let server = start_server_with_max_frame_size(32).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(&[b'x'; 128]).await.unwrap();

    // The server gives up on this connection without replying.
    let mut buf = Vec::new();
    let n = stream.read_to_end(&mut buf).await.unwrap_or(0);
    assert_eq!(n, 0);

    let mut client = connect(server.addr).await;
    assert_eq!(query(&mut client, "SELECT 1").await, "SUCCESS|(1,)");
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let server = start_server().await;
    let mut client = connect(server.addr).await;

    server.shutdown.send(()).unwrap();
    server.handle.await.unwrap().unwrap();

    // Connections that were already accepted keep working.
    assert_eq!(query(&mut client, "SELECT 1").await, "SUCCESS|(1,)");

    assert!(TcpStream::connect(server.addr).await.is_err());
}

#[tokio::test]
async fn test_run_fails_when_bootstrap_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        port: 0,
        database: dir.path().join("missing").join("store.db"),
        ..Config::default()
    };

    assert!(run(config).await.is_err());
}
