//! Static HTTP listener for web games.

use axum::response::Redirect;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::LaunchError;

/// A running static file server. Dropping it without `shutdown` leaves the
/// listener task running until the runtime exits.
#[derive(Debug)]
pub struct StaticServer {
    addr: SocketAddr,
    main_file: Option<String>,
    cancel: CancellationToken,
    /// Cancelled by the server task when it finishes, for any reason
    done: CancellationToken,
    task: JoinHandle<()>,
}

impl StaticServer {
    /// Bind `0.0.0.0:<port>` (0 = ephemeral) and start serving `root`.
    pub async fn bind(root: &Path, main_file: Option<&str>, port: u16) -> Result<Self, LaunchError> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|source| LaunchError::Bind { port, source })?;
        let addr = listener.local_addr()?;

        let cancel = CancellationToken::new();
        let done = CancellationToken::new();
        let app = router(root, main_file);

        let task = {
            let cancel = cancel.clone();
            let done = done.clone();
            tokio::spawn(async move {
                let result = axum::serve(listener, app)
                    .with_graceful_shutdown(async move { cancel.cancelled().await })
                    .await;
                if let Err(e) = result {
                    tracing::error!("Game server on port {} failed: {}", addr.port(), e);
                }
                done.cancel();
            })
        };

        tracing::info!("Serving {} on port {}", root.display(), addr.port());
        Ok(Self {
            addr,
            main_file: main_file.map(String::from),
            cancel,
            done,
            task,
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Address a browser on this host should open.
    pub fn url(&self) -> String {
        match &self.main_file {
            Some(main) => format!("http://localhost:{}{}", self.port(), url_path(main)),
            None => format!("http://localhost:{}/", self.port()),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.done.is_cancelled()
    }

    /// Resolves once the listener task has finished.
    pub async fn stopped(&self) {
        self.done.cancelled().await
    }

    /// Stop accepting connections and give in-flight requests `drain` to
    /// finish; whatever is still running after that is aborted.
    pub async fn shutdown(mut self, drain: Duration) {
        self.cancel.cancel();
        match tokio::time::timeout(drain, &mut self.task).await {
            Ok(_) => tracing::info!("Game server on port {} stopped", self.port()),
            Err(_) => {
                tracing::warn!(
                    "Game server on port {} did not drain within {}s, aborting",
                    self.port(),
                    drain.as_secs()
                );
                self.task.abort();
            }
        }
    }
}

/// Static files under `root`; `/` redirects to the entry document when known.
pub fn router(root: &Path, main_file: Option<&str>) -> Router {
    let mut app = Router::new();
    if let Some(main) = main_file {
        let target = url_path(main);
        app = app.route("/", get(move || async move { Redirect::temporary(&target) }));
    }
    app.fallback_service(ServeDir::new(root).append_index_html_on_directories(true))
        .layer(TraceLayer::new_for_http())
}

/// Absolute URL path for a `/`-separated relative file path, each segment
/// percent-encoded so `#`, `?` and `%` in names stay part of the path.
fn url_path(relative: &str) -> String {
    relative
        .split('/')
        .map(|segment| format!("/{}", urlencoding::encode(segment)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    fn game_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>ninja</h1>").unwrap();
        std::fs::create_dir(dir.path().join("js")).unwrap();
        std::fs::write(dir.path().join("js/game.js"), "let x = 1;").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_root_redirects_to_main_file() {
        let dir = game_dir();
        let resp = router(dir.path(), Some("index.html"))
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(resp.headers()[header::LOCATION], "/index.html");
    }

    #[tokio::test]
    async fn test_redirect_escapes_reserved_characters() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("c#game")).unwrap();
        std::fs::write(dir.path().join("c#game/index.html"), "<h1>sharp</h1>").unwrap();
        let app = router(dir.path(), Some("c#game/index.html"));

        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
        let location = resp.headers()[header::LOCATION].to_str().unwrap().to_string();
        assert_eq!(location, "/c%23game/index.html");

        let resp = app
            .oneshot(Request::builder().uri(&location).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"<h1>sharp</h1>");
    }

    #[test]
    fn test_url_path_encodes_each_segment() {
        assert_eq!(url_path("index.html"), "/index.html");
        assert_eq!(url_path("my game/50%/play?.html"), "/my%20game/50%25/play%3F.html");
    }

    #[tokio::test]
    async fn test_serves_nested_file() {
        let dir = game_dir();
        let resp = router(dir.path(), None)
            .oneshot(Request::builder().uri("/js/game.js").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"let x = 1;");
    }

    #[tokio::test]
    async fn test_missing_file_is_404() {
        let dir = game_dir();
        let resp = router(dir.path(), None)
            .oneshot(Request::builder().uri("/nope.png").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bind_ephemeral_and_shutdown() {
        let dir = game_dir();
        let server = StaticServer::bind(dir.path(), Some("index.html"), 0).await.unwrap();
        assert_ne!(server.port(), 0);
        assert!(server.is_running());
        assert_eq!(server.url(), format!("http://localhost:{}/index.html", server.port()));
        server.shutdown(Duration::from_secs(2)).await;

        let sharp = StaticServer::bind(dir.path(), Some("c#game/index.html"), 0).await.unwrap();
        assert_eq!(
            sharp.url(),
            format!("http://localhost:{}/c%23game/index.html", sharp.port())
        );
        sharp.shutdown(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn test_bind_conflict_is_bind_error() {
        let dir = game_dir();
        let first = StaticServer::bind(dir.path(), None, 0).await.unwrap();
        let err = StaticServer::bind(dir.path(), None, first.port()).await.unwrap_err();
        assert!(matches!(err, LaunchError::Bind { .. }));
        first.shutdown(Duration::from_secs(2)).await;
    }
}
