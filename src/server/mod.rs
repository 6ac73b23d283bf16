//! Listening server lifecycle.
//!
//! The transport itself is a collaborator behind [`NetworkServer`]; this
//! module only runs its serve loop on a dedicated thread and forwards the
//! cooperative stop.

mod http;

use std::io;
use std::sync::Arc;

use anyhow::Result;
use log::{debug, error};

use crate::handle::WorkerHandle;

pub use http::{HttpServer, SHUTDOWN_DRAIN};

/// A listener with a blocking serve loop and an interruptible stop.
pub trait NetworkServer: Send + Sync + 'static {
    /// Accept and serve connections until [`stop`](Self::stop) is called.
    fn serve(&self) -> Result<()>;

    /// Ask the serve loop to return. Must be callable from another thread
    /// while `serve` is running, and must not wait for it.
    fn stop(&self);
}

/// A server running on its own thread.
pub struct ServerLifecycle {
    server: Arc<dyn NetworkServer>,
    handle: WorkerHandle,
}

impl ServerLifecycle {
    /// Start the serve loop on a thread named `server`.
    pub fn start<S: NetworkServer>(server: Arc<S>) -> io::Result<Self> {
        let runner = server.clone();
        let handle = WorkerHandle::spawn("server", move || {
            if let Err(e) = runner.serve() {
                error!("Server loop failed: {e:#}");
            }
            debug!("Server loop returned");
        })?;
        Ok(Self { server, handle })
    }

    /// Signal the serve loop to return. Does not wait.
    pub fn stop(&self) {
        self.server.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Give up the lifecycle for the thread handle, to join or detach it.
    pub fn into_handle(self) -> WorkerHandle {
        self.handle
    }
}
