//! End-to-end exercise of the HTTP auth endpoints and the websocket chat
//! session against real MySQL and Redis instances.

use std::time::Duration;

use chat_server::db::{Pool, PoolConfig};
use chat_server::kv::KvClient;
use chat_server::pubsub::PubSubBus;
use chat_server::state::AppState;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::mysql::Mysql;
use testcontainers_modules::redis::Redis;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header;

async fn start_server() -> (
    testcontainers::ContainerAsync<Mysql>,
    testcontainers::ContainerAsync<Redis>,
    std::net::SocketAddr,
) {
    let mysql = Mysql::default().start().await.unwrap();
    let mysql_port = mysql.get_host_port_ipv4(3306).await.unwrap();
    let database_url = format!("mysql://root@127.0.0.1:{mysql_port}/test");
    chat_server::db::run_migrations(&database_url).await.unwrap();

    let redis = Redis::default().start().await.unwrap();
    let redis_port = redis.get_host_port_ipv4(6379).await.unwrap();
    let redis_url = format!("redis://127.0.0.1:{redis_port}/");
    let kv = KvClient::connect(&redis_url).await.unwrap();

    let pool = Pool::spawn(database_url, PoolConfig::default());
    let doc_root = std::env::temp_dir().join(format!("chat-server-it-{}", std::process::id()));
    let state = AppState::new(pool, kv, PubSubBus::new(), doc_root);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, chat_server::build_router(state)).await.unwrap();
    });

    (mysql, redis, addr)
}

async fn create_account(client: &reqwest::Client, addr: std::net::SocketAddr, username: &str, email: &str) -> String {
    let response = client
        .post(format!("http://{addr}/api/create-account"))
        .json(&json!({ "username": username, "email": email, "password": "correct horse battery" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
    let set_cookie = response.headers().get(reqwest::header::SET_COOKIE).unwrap().to_str().unwrap().to_owned();
    set_cookie.split(';').next().unwrap().to_owned()
}

#[tokio::test]
async fn create_account_then_chat_session_receives_hello() {
    let (_mysql, _redis, addr) = start_server().await;
    let client = reqwest::Client::new();
    let cookie = create_account(&client, addr, "alice", "alice@example.com").await;

    let mut request = format!("ws://{addr}/ws").into_client_request().unwrap();
    request.headers_mut().insert(header::COOKIE, cookie.parse().unwrap());

    let (mut socket, _response) = tokio_tungstenite::connect_async(request).await.unwrap();
    let first = tokio::time::timeout(Duration::from_secs(5), socket.next()).await.unwrap().unwrap().unwrap();
    let text = first.into_text().unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();

    assert_eq!(value["type"], "hello");
    assert_eq!(value["payload"]["me"]["username"], "alice");
    assert_eq!(value["payload"]["rooms"].as_array().unwrap().len(), 4);

    socket.close(None).await.ok();
}

#[tokio::test]
async fn websocket_upgrade_without_a_session_cookie_is_closed() {
    let (_mysql, _redis, addr) = start_server().await;

    let request = format!("ws://{addr}/ws").into_client_request().unwrap();
    let (mut socket, _response) = tokio_tungstenite::connect_async(request).await.unwrap();

    let next = tokio::time::timeout(Duration::from_secs(5), socket.next()).await.unwrap();
    match next {
        Some(Ok(tokio_tungstenite::tungstenite::Message::Close(_))) | None => {}
        other => panic!("expected the connection to be closed, got {other:?}"),
    }
}

#[tokio::test]
async fn sending_a_client_message_broadcasts_it_back_to_the_sender() {
    let (_mysql, _redis, addr) = start_server().await;
    let client = reqwest::Client::new();
    let cookie = create_account(&client, addr, "bob", "bob@example.com").await;

    let mut request = format!("ws://{addr}/ws").into_client_request().unwrap();
    request.headers_mut().insert(header::COOKIE, cookie.parse().unwrap());
    let (mut socket, _response) = tokio_tungstenite::connect_async(request).await.unwrap();

    // hello
    tokio::time::timeout(Duration::from_secs(5), socket.next()).await.unwrap().unwrap().unwrap();

    let outgoing = json!({
        "type": "clientMessages",
        "payload": { "roomId": "wasm", "messages": [{ "content": "hi there" }] }
    });
    socket.send(tokio_tungstenite::tungstenite::Message::Text(outgoing.to_string().into())).await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), socket.next()).await.unwrap().unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&reply.into_text().unwrap()).unwrap();

    assert_eq!(value["type"], "serverMessages");
    assert_eq!(value["payload"]["roomId"], "wasm");
    assert_eq!(value["payload"]["messages"][0]["content"], "hi there");
    assert_eq!(value["payload"]["messages"][0]["user"]["username"], "bob");

    socket.close(None).await.ok();
}
