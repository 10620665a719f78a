//! Local stand-in for vendor APIs, used by adapter and dispatcher tests.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::Value;
use tokio::{net::TcpListener, sync::Mutex};

type Calls = Arc<Mutex<Vec<(HeaderMap, Value)>>>;

#[derive(Clone)]
struct MockState {
    calls: Calls,
    status: StatusCode,
    response: Value,
}

/**
 * \brief A running mock vendor answering one POST route with a canned reply.
 */
pub(crate) struct MockVendor {
    pub base: String,
    calls: Calls,
}

impl MockVendor {
    /** \brief Headers and JSON bodies received so far. */
    pub async fn calls(&self) -> Vec<(HeaderMap, Value)> {
        self.calls.lock().await.clone()
    }
}

async fn record(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.calls.lock().await.push((headers, body));
    (state.status, Json(state.response.clone()))
}

pub(crate) async fn mock_vendor(path: &str, status: StatusCode, response: Value) -> MockVendor {
    let calls = Calls::default();
    let state = MockState {
        calls: calls.clone(),
        status,
        response,
    };
    let router = Router::new().route(path, post(record)).with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock vendor");
    let addr = listener.local_addr().expect("mock vendor addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    MockVendor {
        base: format!("http://{}", addr),
        calls,
    }
}
