//! Status HTTP server for dropcoder
//!
//! Read-only view of the persisted collections for tools that prefer HTTP
//! over reading the state directory.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

use crate::shutdown::Shutdown;
use crate::state_store::{StateSnapshot, StateStore};

/// Errors that can occur when running the status server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid bind address {0:?}")]
    InvalidAddress(String),

    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
}

/// Handler for GET /state
async fn get_state(
    State(store): State<Arc<StateStore>>,
) -> Result<Json<StateSnapshot>, (StatusCode, String)> {
    store
        .snapshot()
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Handler for GET /health
async fn health() -> &'static str {
    "ok"
}

/// Creates the axum Router with the status endpoints
pub fn create_status_router(store: Arc<StateStore>) -> Router {
    Router::new()
        .route("/state", get(get_state))
        .route("/health", get(health))
        .with_state(store)
}

/// Runs the status server until shutdown
///
/// # Arguments
/// * `store` - State store to serve snapshots from
/// * `bind` - Socket address, e.g. `127.0.0.1:7878`
/// * `shutdown` - Stops the server gracefully when triggered
pub async fn run_status_server(
    store: Arc<StateStore>,
    bind: &str,
    mut shutdown: Shutdown,
) -> Result<(), ServerError> {
    let addr: SocketAddr = bind
        .parse()
        .map_err(|_| ServerError::InvalidAddress(bind.to_string()))?;

    let app = create_status_router(store);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Status server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_store::{ErrorKind, ErrorRecord, QueueEntry};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_get_state_returns_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(StateStore::open(temp_dir.path()).unwrap());
        store.enqueue(QueueEntry::new("/w/Drop/a xx.mp4")).unwrap();
        store
            .append_error(ErrorRecord::new("/w/Drop", ErrorKind::NoEligibleFiles, "no eligible files"))
            .unwrap();

        let app = create_status_router(store);
        let response = app
            .oneshot(Request::builder().uri("/state").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .expect("should have content-type header");
        assert!(content_type.to_str().unwrap().contains("application/json"));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let snapshot: StateSnapshot = serde_json::from_slice(&body).unwrap();
        assert_eq!(snapshot.queue.len(), 1);
        assert!(snapshot.current.is_none());
        assert_eq!(snapshot.errors[0].kind, ErrorKind::NoEligibleFiles);
    }

    #[tokio::test]
    async fn test_health() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(StateStore::open(temp_dir.path()).unwrap());

        let response = create_status_router(store)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_invalid_bind_address() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(StateStore::open(temp_dir.path()).unwrap());
        let (_trigger, shutdown) = crate::shutdown::channel();

        let result = run_status_server(store, "not an address", shutdown).await;
        assert!(matches!(result, Err(ServerError::InvalidAddress(_))));
    }
}
