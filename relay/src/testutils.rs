use crate::config::UpstreamConfig;
use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// A local stub upstream that answers every request with a fixed status and
/// body, recording what it saw. With `drop_connections` set it accepts and
/// immediately closes sockets to simulate connection-level failures.
pub struct TestUpstream {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
    pub requests: Arc<Mutex<Vec<String>>>,
    pub drop_connections: Arc<AtomicBool>,
}

pub async fn spawn_upstream(status: StatusCode, body: &'static [u8]) -> TestUpstream {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test upstream");
    let addr = listener.local_addr().expect("local addr");

    let hits = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let drop_connections = Arc::new(AtomicBool::new(false));

    let task_hits = hits.clone();
    let task_requests = requests.clone();
    let task_drop = drop_connections.clone();

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => return,
            };

            if task_drop.load(Ordering::SeqCst) {
                task_hits.fetch_add(1, Ordering::SeqCst);
                drop(stream);
                continue;
            }

            let hits = task_hits.clone();
            let requests = task_requests.clone();
            let io = TokioIo::new(stream);

            tokio::spawn(async move {
                let handler = service_fn(move |req: Request<hyper::body::Incoming>| {
                    hits.fetch_add(1, Ordering::SeqCst);
                    requests.lock().unwrap().push(req.uri().to_string());
                    async move {
                        let mut response = Response::new(Full::new(Bytes::from_static(body)));
                        *response.status_mut() = status;
                        Ok::<_, Infallible>(response)
                    }
                });
                let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                    .serve_connection(io, handler)
                    .await;
            });
        }
    });

    TestUpstream {
        addr,
        hits,
        requests,
        drop_connections,
    }
}

/// Upstream config pointing both endpoints at local stub addresses.
pub fn test_upstream_config(inventory: SocketAddr, scrapedo: SocketAddr) -> UpstreamConfig {
    UpstreamConfig {
        inventory_endpoint: url::Url::parse(&format!("http://{inventory}/inventory"))
            .expect("inventory url"),
        scrapedo_endpoint: url::Url::parse(&format!("http://{scrapedo}/")).expect("scrapedo url"),
        direct_timeout_secs: 2,
        scrapedo_timeout_secs: 2,
    }
}
