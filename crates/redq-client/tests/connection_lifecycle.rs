//! Connection lifecycle tests: authentication, database selection, and the
//! session-state invariants around rejected commands.

use redq_client::{ClientConfig, Connection, Error};
use redq_core::logging::init_test_logging;
use redq_test_utils::MockRedisServer;

async fn connect(server: &MockRedisServer) -> Connection {
    init_test_logging();
    Connection::connect(server.addr().to_string(), ClientConfig::default())
        .await
        .expect("connect")
}

#[tokio::test]
async fn ping_round_trip() {
    let server = MockRedisServer::spawn().await;
    let conn = connect(&server).await;

    assert_eq!(conn.ping().await.unwrap(), "PONG");
    assert!(conn.is_open());
}

#[tokio::test]
async fn echo_round_trip() {
    let server = MockRedisServer::spawn().await;
    let conn = connect(&server).await;

    assert_eq!(conn.echo("hello").await.unwrap(), "hello");
}

#[tokio::test]
async fn set_get_del_round_trip() {
    let server = MockRedisServer::spawn().await;
    let conn = connect(&server).await;

    conn.set("key", "value").await.unwrap();
    assert_eq!(conn.get("key").await.unwrap().as_deref(), Some("value"));
    assert_eq!(conn.del("key").await.unwrap(), 1);
    assert_eq!(conn.get("key").await.unwrap(), None);
}

#[tokio::test]
async fn auth_against_password_protected_server() {
    let server = MockRedisServer::spawn_with_password("passwd").await;
    let conn = connect(&server).await;

    // Unauthenticated commands are refused with the server's text verbatim.
    match conn.ping().await.unwrap_err() {
        Error::ServerRejection { message } => {
            assert_eq!(message, "NOAUTH Authentication required.");
        }
        other => panic!("expected ServerRejection, got {:?}", other),
    }

    conn.auth("passwd").await.unwrap();
    conn.set("key", "value").await.unwrap();
    assert_eq!(conn.get("key").await.unwrap().as_deref(), Some("value"));
    assert_eq!(conn.session().credential.as_deref(), Some("passwd"));
}

#[tokio::test]
async fn empty_credential_is_rejected_locally() {
    let server = MockRedisServer::spawn().await;
    let conn = connect(&server).await;

    let err = conn.auth("").await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));

    // Nothing reached the wire.
    assert_eq!(conn.metrics().commands_sent, 0);
    assert!(conn.session().credential.is_none());
}

#[tokio::test]
async fn rejected_auth_leaves_credential_unset() {
    // No password configured: AUTH itself is the rejected command.
    let server = MockRedisServer::spawn().await;
    let conn = connect(&server).await;

    match conn.auth("invalid").await.unwrap_err() {
        Error::ServerRejection { message } => {
            assert_eq!(message, "ERR Client sent AUTH, but no password is set");
        }
        other => panic!("expected ServerRejection, got {:?}", other),
    }
    assert!(conn.session().credential.is_none());
}

#[tokio::test]
async fn wrong_password_leaves_credential_unchanged() {
    let server = MockRedisServer::spawn_with_password("passwd").await;
    let conn = connect(&server).await;

    match conn.auth("wrong").await.unwrap_err() {
        Error::ServerRejection { message } => {
            assert_eq!(message, "ERR invalid password");
        }
        other => panic!("expected ServerRejection, got {:?}", other),
    }
    assert!(conn.session().credential.is_none());

    conn.auth("passwd").await.unwrap();
    assert_eq!(conn.session().credential.as_deref(), Some("passwd"));
}

#[tokio::test]
async fn rejected_select_leaves_database_unchanged() {
    let server = MockRedisServer::spawn().await;
    let conn = connect(&server).await;

    match conn.select(1024).await.unwrap_err() {
        Error::ServerRejection { message } => {
            assert!(message.starts_with("ERR"), "unexpected message {}", message);
        }
        other => panic!("expected ServerRejection, got {:?}", other),
    }
    assert_eq!(conn.session().database, 0);

    // And a rejection after a successful SELECT keeps the prior value.
    conn.select(1).await.unwrap();
    assert_eq!(conn.session().database, 1);
    conn.select(1024).await.unwrap_err();
    assert_eq!(conn.session().database, 1);
}

#[tokio::test]
async fn select_isolates_databases() {
    let server = MockRedisServer::spawn().await;
    let conn = connect(&server).await;

    conn.set("key", "value").await.unwrap();
    conn.select(1).await.unwrap();
    assert_eq!(conn.get("key").await.unwrap(), None);
}

#[tokio::test]
async fn execute_surfaces_unknown_commands() {
    let server = MockRedisServer::spawn().await;
    let conn = connect(&server).await;

    let err = conn
        .execute(redq_client::Command::new("FLUSHWHAT"))
        .await
        .unwrap_err();
    match err {
        Error::ServerRejection { message } => {
            assert!(message.starts_with("ERR unknown command"));
        }
        other => panic!("expected ServerRejection, got {:?}", other),
    }
}

#[tokio::test]
async fn close_is_terminal() {
    let server = MockRedisServer::spawn().await;
    let conn = connect(&server).await;

    conn.close().await;

    // The task processes the close and transitions to Closed.
    for _ in 0..500 {
        if conn.state().is_terminal() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    assert!(conn.state().is_terminal());
    assert!(!conn.is_open());

    let err = conn.ping().await.unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
}
