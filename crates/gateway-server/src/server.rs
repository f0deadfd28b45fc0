//! HTTP listener with graceful shutdown.

use axum::Router;
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

/// Bound gateway listener
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    shutdown_grace: Duration,
}

impl Server {
    /// Bind the listening socket
    ///
    /// # Errors
    /// Returns error if the address cannot be bound
    pub async fn bind(addr: SocketAddr, shutdown_grace: Duration) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            shutdown_grace,
        })
    }

    /// Address actually bound (useful with port 0)
    ///
    /// # Errors
    /// Returns error if the socket has no local address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve `router` until `signal` resolves.
    ///
    /// After the signal, in-flight requests get `shutdown_grace` to finish;
    /// whatever is still open after that is dropped.
    ///
    /// # Errors
    /// Returns error if accepting connections fails
    pub async fn run<F>(self, router: Router, signal: F) -> std::io::Result<()>
    where
        F: Future + Send,
        F::Output: std::fmt::Debug,
    {
        let addr = self.listener.local_addr()?;
        info!(%addr, "Gateway listening");

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let serve = axum::serve(self.listener, router)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.changed().await;
            })
            .into_future();
        tokio::pin!(serve);

        tokio::select! {
            result = &mut serve => return result,
            reason = signal => {
                info!(signal = ?reason, grace = ?self.shutdown_grace, "Shutdown requested, draining");
                let _ = stop_tx.send(true);
            }
        }

        match tokio::time::timeout(self.shutdown_grace, serve).await {
            Ok(result) => {
                info!("Gateway stopped");
                result
            }
            Err(_) => {
                warn!(grace = ?self.shutdown_grace, "Grace period elapsed, dropping open connections");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_serves_until_signal() {
        let server = Server::bind("127.0.0.1:0".parse().unwrap(), Duration::from_secs(1))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let router = Router::new().route("/ping", get(|| async { "pong" }));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(server.run(router, rx));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /ping HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("pong"));

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
