use std::future::Future;
use std::net::SocketAddr;

use axum::middleware::from_fn_with_state;
use axum::Router;
use tokio::net::TcpListener;

use crate::admission::{admission, GateState};
use crate::relay::{forward, Upstream};

/// Router relaying every request upstream behind the admission middleware.
pub fn build_router(state: GateState, upstream: Upstream) -> Router {
    Router::new()
        .fallback(forward)
        .with_state(upstream)
        .layer(from_fn_with_state(state, admission))
}

/// Configuration for the gateway listener.
pub struct GatewayConfig {
    /// Address to bind the listening socket to.
    pub listen_addr: SocketAddr,
    pub state: GateState,
    pub upstream: Upstream,
}

/// The HTTP gateway in front of the CKAN site.
pub struct Gateway {
    listen_addr: SocketAddr,
    router: Router,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            listen_addr: config.listen_addr,
            router: build_router(config.state, config.upstream),
        }
    }

    /// Bind `listen_addr` and serve until `shutdown` resolves. In-flight
    /// requests are allowed to finish.
    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.listen_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Like [`run`](Self::run) on an already bound listener.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(%addr, "access gate listening");

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        tracing::info!(%addr, "access gate stopped");
        Ok(())
    }
}
