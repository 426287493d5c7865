use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use log::info;

use super::routes::routes;
use super::types::AppState;

/// HTTP front of the control panel.
pub struct WebServer {
    state: Arc<AppState>,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(state: Arc<AppState>, addr: SocketAddr) -> Self {
        Self { state, addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serves until `shutdown` resolves. In-flight requests are dropped then.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!("Starting web server on http://{}", self.addr);
        let server = warp::serve(routes(self.state)).run(self.addr);

        tokio::select! {
            _ = server => info!("Web server exited"),
            _ = shutdown => info!("Shutdown requested, stopping web server"),
        }
    }
}
