//! Exposes an in-process HTTP target for use in integration tests.
//!
//! ```
//! use bucketsync_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let url = server.url("/");
//!    // point a load scenario at the URL...
//! }
//! ```

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, StatusCode};

/// A request received by a [`TestServer`].
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: Method,
    /// The request path, without the query string.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug)]
struct Shared {
    status: StatusCode,
    hits: AtomicU64,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// An in-process HTTP server answering every request with a fixed status code.
///
/// It listens on a random available port on localhost, counts the requests it receives and keeps
/// a copy of each of them.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    shared: Arc<Shared>,
}

impl TestServer {
    /// Starts a server responding with `200 OK`.
    pub async fn new() -> Self {
        Self::with_status(StatusCode::OK).await
    }

    /// Starts a server responding with the given status code.
    pub async fn with_status(status: StatusCode) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let shared = Arc::new(Shared {
            status,
            hits: AtomicU64::new(0),
            requests: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .fallback(respond)
            .with_state(Arc::clone(&shared));

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            shared,
        }
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.socket.port(), path)
    }

    /// Returns the base URL of the server, without a trailing slash.
    ///
    /// Unlike [`url`](Self::url), this uses the IP address the server is bound to.
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.socket)
    }

    /// Returns the number of requests served so far.
    pub fn hits(&self) -> u64 {
        self.shared.hits.load(Ordering::Relaxed)
    }

    /// Returns all requests served so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.shared.requests.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn respond(State(shared): State<Arc<Shared>>, request: Request) -> StatusCode {
    shared.hits.fetch_add(1, Ordering::Relaxed);

    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    shared.requests.lock().unwrap().push(RecordedRequest {
        method: parts.method,
        path: parts.uri.path().to_owned(),
        headers: parts.headers,
        body,
    });

    shared.status
}
