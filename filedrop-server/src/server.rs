//! HTTP server implementation

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use crate::handlers::{handle_request, AppState};
use filedrop_engine::Ingestor;

pub type ServeError = Box<dyn std::error::Error + Send + Sync>;

pub struct FileDropServer {
    state: AppState,
}

impl FileDropServer {
    pub fn new(ingestor: Ingestor) -> Self {
        Self {
            state: AppState { ingestor },
        }
    }

    /// Bind `addr` and serve until `shutdown` resolves
    pub async fn serve(
        self,
        addr: SocketAddr,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), ServeError> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_listener(listener, shutdown).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve_listener(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), ServeError> {
        info!("filedrop server listening on {}", listener.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            let (stream, remote_addr) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = &mut shutdown => {
                    info!("Shutting down listener");
                    return Ok(());
                }
            };
            debug!("New connection from {}", remote_addr);

            // Each connection, and so each upload session, runs on its own task.
            let state = self.state.clone();
            tokio::spawn(async move {
                if let Err(err) = Self::handle_connection(stream, state).await {
                    error!("Connection error from {}: {}", remote_addr, err);
                }
            });
        }
    }

    async fn handle_connection(stream: TcpStream, state: AppState) -> Result<(), ServeError> {
        let io = TokioIo::new(stream);

        let service = service_fn(move |req| {
            let state = state.clone();
            async move { handle_request(req, state).await }
        });

        auto::Builder::new(TokioExecutor::new())
            .serve_connection(io, service)
            .await
    }
}
