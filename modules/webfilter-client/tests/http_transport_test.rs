//! HttpTransport against a real socket.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Form, Json, Router};
use serde_json::{json, Value};
use webfilter_client::{
    HttpTransport, OutboundRequest, PayloadEncoding, SubscriberTransport, TransportError,
};

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn app() -> Router {
    Router::new()
        .route(
            "/echo",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let content_type = headers
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({"data": body, "content_type": content_type}))
            }),
        )
        .route(
            "/form",
            post(|Form(fields): Form<HashMap<String, String>>| async move { Json(json!(fields)) }),
        )
        .route(
            "/teapot",
            post(|| async { (StatusCode::IM_A_TEAPOT, "short and stout") }),
        )
        .route(
            "/slow",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "late"
            }),
        )
}

fn request(url: String, body: Value) -> OutboundRequest {
    OutboundRequest {
        url,
        body,
        encoding: PayloadEncoding::Json,
        timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn posts_json_and_returns_body() {
    let addr = spawn(app()).await;
    let transport = HttpTransport::new("webfilter-test").unwrap();

    let resp = transport
        .post(&request(format!("http://{addr}/echo"), json!({"mode": "honor"})))
        .await
        .unwrap();

    assert_eq!(resp.status, 200);
    let body: Value = serde_json::from_str(&resp.body).unwrap();
    assert_eq!(body["data"]["mode"], "honor");
    assert_eq!(body["content_type"], "application/json");
}

#[tokio::test]
async fn error_status_is_a_response_not_an_error() {
    let addr = spawn(app()).await;
    let transport = HttpTransport::new("webfilter-test").unwrap();

    let resp = transport
        .post(&request(format!("http://{addr}/teapot"), json!({})))
        .await
        .unwrap();

    assert_eq!(resp.status, 418);
    assert_eq!(resp.reason, "I'm a teapot");
    assert!(resp.is_client_error());
    assert_eq!(resp.body, "short and stout");
}

#[tokio::test]
async fn form_encoding_flattens_nested_payload() {
    let addr = spawn(app()).await;
    let transport = HttpTransport::new("webfilter-test").unwrap();

    let mut req = request(
        format!("http://{addr}/form"),
        json!({"user": {"id": 4, "username": "andres"}}),
    );
    req.encoding = PayloadEncoding::Form;
    let resp = transport.post(&req).await.unwrap();

    let body: Value = serde_json::from_str(&resp.body).unwrap();
    assert_eq!(body["user_id"], "4");
    assert_eq!(body["user_username"], "andres");
}

#[tokio::test]
async fn slow_subscriber_times_out() {
    let addr = spawn(app()).await;
    let transport = HttpTransport::new("webfilter-test").unwrap();

    let mut req = request(format!("http://{addr}/slow"), json!({}));
    req.timeout = Duration::from_millis(100);
    let err = transport.post(&req).await.unwrap_err();

    assert!(matches!(err, TransportError::Timeout { .. }), "got {err:?}");
    assert_eq!(err.url(), Some(req.url.as_str()));
}

#[tokio::test]
async fn refused_connection_is_a_connect_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = HttpTransport::new("webfilter-test").unwrap();
    let err = transport
        .post(&request(format!("http://{addr}/echo"), json!({})))
        .await
        .unwrap_err();

    assert!(matches!(err, TransportError::Connect { .. }), "got {err:?}");
}
