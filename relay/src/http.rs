use crate::errors::RelayError;
use crate::service::RelayService;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Accept loop for the relay service. Each connection is handed to hyper
/// on its own task; h1/h2 are auto-detected per socket.
pub(crate) async fn serve(listener: TcpListener, service: RelayService) -> Result<(), RelayError> {
    let service = Arc::new(service);

    loop {
        let (stream, _peer_addr) = listener.accept().await?;
        let _ = stream.set_nodelay(true);
        let io = TokioIo::new(stream);
        let svc = service.clone();

        tokio::spawn(async move {
            if let Err(e) = Builder::new(TokioExecutor::new())
                .serve_connection(io, svc)
                .await
            {
                tracing::debug!(error = %e, "connection closed with error");
            }
        });
    }
}
