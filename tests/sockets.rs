mod common;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use hearth::container::Container;
use hearth::layout::Modules;
use hearth::socket::{SocketConnection, SocketServer};

use common::Fixture;

fn echo_module(c: &Container) {
    c.set(
        "socket.modules",
        Modules::<SocketConnection>::new().with("echo", |conn: &SocketConnection, _: &Container| {
            conn.on_message(|conn, text| {
                conn.send_text(format!("echo:{}", text));
            });
            Ok(())
        }),
    );
}

#[tokio::test]
async fn test_socket_modules_load_per_connection() {
    let fixture = Fixture::with_config("socket:\n  path: /ws\n");
    fixture.write_app("socket/echo.rs", "");

    let app = fixture.app(echo_module);
    app.boot().unwrap();
    let addr = app.listen().await.unwrap();
    let socket = app.container().resolve::<SocketServer>("socket").unwrap();
    assert!(socket.is_accepting());

    let (mut first, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .unwrap();
    let (mut second, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .unwrap();

    first.send(Message::text("ping")).await.unwrap();
    second.send(Message::text("pong")).await.unwrap();

    let reply = first.next().await.unwrap().unwrap();
    assert_eq!(reply.to_text().unwrap(), "echo:ping");
    let reply = second.next().await.unwrap().unwrap();
    assert_eq!(reply.to_text().unwrap(), "echo:pong");
    assert_eq!(socket.connections(), 2);

    assert_eq!(app.stop(None).await, 0);
    assert!(!socket.is_accepting());

    let frame = tokio::time::timeout(Duration::from_secs(2), first.next())
        .await
        .unwrap();
    assert!(
        matches!(frame, Some(Ok(Message::Close(_))) | Some(Err(_)) | None),
        "expected close, got {:?}",
        frame
    );
}

#[tokio::test]
async fn test_socket_route_absent_without_socket_files() {
    let fixture = Fixture::new();

    let app = fixture.app(echo_module);
    app.boot().unwrap();
    let addr = app.listen().await.unwrap();

    assert!(!app.phases().socket);
    assert!(tokio_tungstenite::connect_async(format!("ws://{}/socket", addr))
        .await
        .is_err());

    app.stop(None).await;
}
