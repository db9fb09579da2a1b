//! Static image server so the review tool can load task images by URL.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::http::Method;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Files under `dir` at `/{relative path}`, readable from any origin.
pub fn router(dir: &Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .fallback_service(ServeDir::new(dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// `http://localhost:{port}`, the base for task image URLs.
pub fn base_url(port: u16) -> String {
    format!("http://localhost:{port}")
}

/// Whether something already accepts connections on `localhost:port`.
pub async fn port_in_use(port: u16) -> bool {
    tokio::net::TcpStream::connect(("localhost", port)).await.is_ok()
}

/// Bind `0.0.0.0:port` and serve `dir` until the task is dropped.
pub async fn serve(dir: PathBuf, port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(dir = %dir.display(), url = %base_url(port), "serving images");
    axum::serve(listener, router(&dir)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serves_files_with_cors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("frame.jpg"), b"not really a jpeg").unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let app = router(dir.path());
        tokio::spawn(async move { axum::serve(listener, app).await });

        assert!(port_in_use(port).await);
        let resp = reqwest::Client::new()
            .get(format!("http://127.0.0.1:{port}/frame.jpg"))
            .header("Origin", "http://localhost:8081")
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
        assert_eq!(
            resp.headers()["access-control-allow-origin"].to_str().unwrap(),
            "*"
        );
        assert_eq!(resp.bytes().await.unwrap().as_ref(), b"not really a jpeg");
    }
}
