// HTTP listener behind the NetworkServer seam.
//
// axum runs on a current-thread tokio runtime owned by the server thread.
// stop() cancels a token: the listener stops accepting, open connections get
// SHUTDOWN_DRAIN to finish, and whatever is left is dropped with the runtime.

use std::future::IntoFuture;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use super::NetworkServer;

/// How long open connections may keep the serve loop alive after stop().
pub const SHUTDOWN_DRAIN: Duration = Duration::from_millis(300);

pub struct HttpServer {
    /// Taken by the first call to `serve`.
    pending: Mutex<Option<(TcpListener, Router)>>,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
}

impl HttpServer {
    /// Bind on the calling thread so address errors surface before the
    /// server thread exists.
    pub fn bind<A: ToSocketAddrs + std::fmt::Debug>(addr: A, router: Router) -> Result<Self> {
        let listener =
            TcpListener::bind(&addr).with_context(|| format!("Failed to bind listener on {addr:?}"))?;
        listener
            .set_nonblocking(true)
            .context("Failed to make listener non-blocking")?;
        let local_addr = listener.local_addr().context("Failed to read listener address")?;
        Ok(Self {
            pending: Mutex::new(Some((listener, router))),
            local_addr,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl NetworkServer for HttpServer {
    fn serve(&self) -> Result<()> {
        let (listener, router) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .context("Listener has already been served")?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to build server runtime")?;
        let listener = {
            let _guard = runtime.enter();
            tokio::net::TcpListener::from_std(listener)
                .context("Failed to register listener with the runtime")?
        };

        info!("Listening on {}", self.local_addr);
        let shutdown = self.shutdown.clone();
        let result = runtime.block_on(async move {
            let server = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.clone().cancelled_owned())
                .into_future();
            tokio::select! {
                result = server => result.context("HTTP server failed"),
                () = drain_deadline(&shutdown) => {
                    warn!("Open connections did not finish within {SHUTDOWN_DRAIN:?}, dropping them");
                    Ok(())
                }
            }
        });
        // Connection tasks still alive are dropped here.
        drop(runtime);

        info!("Listener on {} stopped", self.local_addr);
        result
    }

    fn stop(&self) {
        self.shutdown.cancel();
    }
}

async fn drain_deadline(shutdown: &CancellationToken) {
    shutdown.cancelled().await;
    tokio::time::sleep(SHUTDOWN_DRAIN).await;
}
