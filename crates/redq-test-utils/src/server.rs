//! In-process mock Redis server.
//!
//! Speaks enough RESP2 for connection-lifecycle testing: AUTH, SELECT, PING,
//! ECHO, GET, SET, DEL and QUIT, with an optional `requirepass` and sixteen
//! logical databases. The store is shared across all connections and
//! survives client reconnects, so tests can assert that data written before
//! a forced disconnect is readable after recovery.
//!
//! `drop_connections` abruptly closes every live connection, which the
//! client observes as a remote close.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use redq_core::protocol::{Codec, RespValue};

/// Mock server configuration.
#[derive(Debug, Clone)]
pub struct MockServerConfig {
    /// When set, commands other than AUTH/QUIT are refused until the client
    /// authenticates with this password.
    pub password: Option<String>,
    /// Number of logical databases.
    pub databases: usize,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            password: None,
            databases: 16,
        }
    }
}

type Store = Arc<Mutex<Vec<HashMap<String, String>>>>;
type Password = Arc<Mutex<Option<String>>>;

/// A running mock server.
pub struct MockRedisServer {
    addr: SocketAddr,
    store: Store,
    password: Password,
    kill_tx: watch::Sender<u64>,
    accept_task: JoinHandle<()>,
}

impl MockRedisServer {
    /// Spawn a server with no password required.
    pub async fn spawn() -> Self {
        Self::spawn_with(MockServerConfig::default()).await
    }

    /// Spawn a server requiring the given password.
    pub async fn spawn_with_password(password: impl Into<String>) -> Self {
        Self::spawn_with(MockServerConfig {
            password: Some(password.into()),
            ..MockServerConfig::default()
        })
        .await
    }

    /// Spawn a server with explicit configuration.
    pub async fn spawn_with(config: MockServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("mock server addr");
        let store: Store = Arc::new(Mutex::new(vec![HashMap::new(); config.databases.max(1)]));
        let password: Password = Arc::new(Mutex::new(config.password));
        let (kill_tx, kill_rx) = watch::channel(0u64);

        let accept_store = Arc::clone(&store);
        let accept_password = Arc::clone(&password);
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((sock, peer)) = listener.accept().await else {
                    return;
                };
                debug!(%peer, "mock server accepted connection");
                tokio::spawn(handle_connection(
                    sock,
                    Arc::clone(&accept_store),
                    Arc::clone(&accept_password),
                    kill_rx.clone(),
                ));
            }
        });

        Self {
            addr,
            store,
            password,
            kill_tx,
            accept_task,
        }
    }

    /// Address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Change the required password at runtime. `None` disables
    /// authentication; existing connections keep their authenticated state.
    pub fn set_password(&self, password: Option<String>) {
        *self.password.lock().unwrap_or_else(|e| e.into_inner()) = password;
    }

    /// Abruptly close every live connection (a remote close from the
    /// client's point of view). New connections are still accepted.
    pub fn drop_connections(&self) {
        self.kill_tx.send_modify(|n| *n += 1);
    }

    /// Stop accepting connections and close the live ones. The address goes
    /// dead until the server is dropped.
    pub fn shutdown(&self) {
        self.accept_task.abort();
        self.drop_connections();
    }

    /// Direct store access for assertions.
    pub fn value(&self, db: usize, key: &str) -> Option<String> {
        self.store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(db)
            .and_then(|m| m.get(key).cloned())
    }
}

impl Drop for MockRedisServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn handle_connection(
    mut sock: TcpStream,
    store: Store,
    password: Password,
    mut kill_rx: watch::Receiver<u64>,
) {
    // Only kills issued after this connection was accepted apply to it.
    kill_rx.borrow_and_update();

    let mut buf = BytesMut::with_capacity(4096);
    let mut authed = password.lock().unwrap_or_else(|e| e.into_inner()).is_none();
    let mut db = 0usize;

    loop {
        // Read one command, bailing out on a forced drop.
        let value = loop {
            match Codec::decode(&mut buf) {
                Ok(Some(value)) => break value,
                Ok(None) => {}
                Err(_) => return,
            }
            tokio::select! {
                _ = kill_rx.changed() => {
                    debug!("mock server dropping connection");
                    return;
                }
                read = sock.read_buf(&mut buf) => match read {
                    Ok(0) => return,
                    Ok(_) => {}
                    Err(_) => return,
                },
            }
        };

        let Some(parts) = command_parts(&value) else {
            let reply = RespValue::Error("ERR Protocol error: expected array of bulk strings".into());
            if write_reply(&mut sock, &reply).await.is_err() {
                return;
            }
            continue;
        };

        let name = parts[0].to_ascii_uppercase();
        let mut close_after_reply = false;

        let reply = match name.as_str() {
            "AUTH" if parts.len() == 2 => {
                let current = password.lock().unwrap_or_else(|e| e.into_inner()).clone();
                match current {
                    None => {
                        RespValue::Error("ERR Client sent AUTH, but no password is set".into())
                    }
                    Some(pw) if pw == parts[1] => {
                        authed = true;
                        RespValue::Simple("OK".into())
                    }
                    Some(_) => RespValue::Error("ERR invalid password".into()),
                }
            }
            "QUIT" => {
                close_after_reply = true;
                RespValue::Simple("OK".into())
            }
            _ if !authed => RespValue::Error("NOAUTH Authentication required.".into()),
            "SELECT" if parts.len() == 2 => {
                let databases = store.lock().unwrap_or_else(|e| e.into_inner()).len();
                match parts[1].parse::<usize>() {
                    Ok(index) if index < databases => {
                        db = index;
                        RespValue::Simple("OK".into())
                    }
                    _ => RespValue::Error("ERR DB index is out of range".into()),
                }
            }
            "PING" => RespValue::Simple("PONG".into()),
            "ECHO" if parts.len() == 2 => RespValue::Bulk(Bytes::from(parts[1].clone())),
            "SET" if parts.len() == 3 => {
                store.lock().unwrap_or_else(|e| e.into_inner())[db]
                    .insert(parts[1].clone(), parts[2].clone());
                RespValue::Simple("OK".into())
            }
            "GET" if parts.len() == 2 => {
                match store.lock().unwrap_or_else(|e| e.into_inner())[db].get(&parts[1]) {
                    Some(value) => RespValue::Bulk(Bytes::from(value.clone())),
                    None => RespValue::Null,
                }
            }
            "DEL" if parts.len() >= 2 => {
                let mut guard = store.lock().unwrap_or_else(|e| e.into_inner());
                let removed = parts[1..]
                    .iter()
                    .filter(|key| guard[db].remove(*key).is_some())
                    .count();
                RespValue::Integer(removed as i64)
            }
            _ => RespValue::Error(format!("ERR unknown command '{}'", parts[0])),
        };

        if write_reply(&mut sock, &reply).await.is_err() {
            return;
        }
        if close_after_reply {
            let _ = sock.shutdown().await;
            return;
        }
    }
}

/// A client command is an array of bulk strings; flatten it to text parts.
fn command_parts(value: &RespValue) -> Option<Vec<String>> {
    let RespValue::Array(items) = value else {
        return None;
    };
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|item| match item {
            RespValue::Bulk(data) => String::from_utf8(data.to_vec()).ok(),
            _ => None,
        })
        .collect()
}

async fn write_reply(sock: &mut TcpStream, reply: &RespValue) -> std::io::Result<()> {
    sock.write_all(&Codec::encode_value(reply)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use redq_core::protocol::Command;
    use redq_core::transport::Transport;

    async fn open(server: &MockRedisServer) -> Transport {
        Transport::open(&server.addr().to_string(), 1, Duration::from_secs(1))
            .await
            .expect("connect to mock server")
    }

    async fn call(transport: &mut Transport, cmd: Command) -> RespValue {
        transport.send(&cmd).await.expect("send");
        transport.read_value().await.expect("reply")
    }

    #[tokio::test]
    async fn ping_and_echo() {
        let server = MockRedisServer::spawn().await;
        let mut t = open(&server).await;

        let reply = call(&mut t, Command::new("PING")).await;
        assert_eq!(reply, RespValue::Simple("PONG".into()));

        let reply = call(&mut t, Command::new("ECHO").arg("hello")).await;
        assert_eq!(reply, RespValue::Bulk(Bytes::from_static(b"hello")));
    }

    #[tokio::test]
    async fn requirepass_gates_commands() {
        let server = MockRedisServer::spawn_with_password("sekret").await;
        let mut t = open(&server).await;

        let reply = call(&mut t, Command::new("PING")).await;
        assert_eq!(
            reply,
            RespValue::Error("NOAUTH Authentication required.".into())
        );

        let reply = call(&mut t, Command::new("AUTH").arg("wrong")).await;
        assert_eq!(reply, RespValue::Error("ERR invalid password".into()));

        let reply = call(&mut t, Command::new("AUTH").arg("sekret")).await;
        assert_eq!(reply, RespValue::Simple("OK".into()));

        let reply = call(&mut t, Command::new("PING")).await;
        assert_eq!(reply, RespValue::Simple("PONG".into()));
    }

    #[tokio::test]
    async fn auth_without_requirepass_is_an_error() {
        let server = MockRedisServer::spawn().await;
        let mut t = open(&server).await;

        let reply = call(&mut t, Command::new("AUTH").arg("anything")).await;
        assert_eq!(
            reply,
            RespValue::Error("ERR Client sent AUTH, but no password is set".into())
        );
    }

    #[tokio::test]
    async fn databases_are_isolated_and_persistent() {
        let server = MockRedisServer::spawn().await;
        let mut t = open(&server).await;

        call(&mut t, Command::new("SET").arg("k").arg("v")).await;
        call(&mut t, Command::new("SELECT").arg("1")).await;
        let reply = call(&mut t, Command::new("GET").arg("k")).await;
        assert_eq!(reply, RespValue::Null);

        let reply = call(&mut t, Command::new("SELECT").arg("1024")).await;
        assert_eq!(reply, RespValue::Error("ERR DB index is out of range".into()));

        // A second connection sees data written by the first.
        let mut t2 = open(&server).await;
        let reply = call(&mut t2, Command::new("GET").arg("k")).await;
        assert_eq!(reply, RespValue::Bulk(Bytes::from_static(b"v")));
        assert_eq!(server.value(0, "k").as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn quit_closes_after_ok() {
        let server = MockRedisServer::spawn().await;
        let mut t = open(&server).await;

        let reply = call(&mut t, Command::new("QUIT")).await;
        assert_eq!(reply, RespValue::Simple("OK".into()));

        // Stream ends after the acknowledgment.
        let result = t.read_value().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn drop_connections_forces_remote_close() {
        let server = MockRedisServer::spawn().await;
        let mut t = open(&server).await;

        let reply = call(&mut t, Command::new("PING")).await;
        assert_eq!(reply, RespValue::Simple("PONG".into()));

        server.drop_connections();
        let result = t.read_value().await;
        assert!(result.is_err());

        // The server still accepts fresh connections.
        let mut t2 = open(&server).await;
        let reply = call(&mut t2, Command::new("PING")).await;
        assert_eq!(reply, RespValue::Simple("PONG".into()));
    }
}
