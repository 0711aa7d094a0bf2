//! Bare `hyper` HTTP surface (§10.4): `/metrics` (Prometheus text exposition)
//! and `/healthz` (readiness, gated on the cluster state cache having
//! synced). No routing framework — `storage-operator`'s own `Cargo.toml`
//! already reaches for `hyper`, `hyper-util` and `http-body-util` directly
//! rather than a framework on top, so this follows the same bare shape.

use crate::state::Cache;
use crate::util::metrics::ControllerMetrics;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use owo_colors::OwoColorize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

struct ServerState {
    metrics: Arc<ControllerMetrics>,
    cache: Arc<Cache>,
}

async fn handle(req: Request<Incoming>, state: Arc<ServerState>) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match req.uri().path() {
        "/metrics" => Response::new(Full::new(Bytes::from(state.metrics.encode()))),
        "/healthz" if state.cache.has_synced() => Response::new(Full::new(Bytes::from_static(b"ok"))),
        "/healthz" => Response::builder()
            .status(StatusCode::SERVICE_UNAVAILABLE)
            .body(Full::new(Bytes::from_static(b"not synced")))
            .expect("build response"),
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::new()))
            .expect("build response"),
    };
    Ok(response)
}

/// Binds `0.0.0.0:{port}` and serves `/metrics` and `/healthz` until
/// `shutdown` is cancelled. Each accepted connection runs on its own task;
/// cancellation stops the accept loop, leaving in-flight connections to
/// finish their current request.
pub async fn run(
    port: u16,
    metrics: Arc<ControllerMetrics>,
    cache: Arc<Cache>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    println!("{}", format!("📈 metrics server listening on {addr}").green());
    let state = Arc::new(ServerState { metrics, cache });

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                println!("{}", "🛑 metrics server stopped gracefully".red());
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, _) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        eprintln!("{}", format!("metrics server accept error: {e}").red());
                        continue;
                    }
                };
                let io = TokioIo::new(stream);
                let conn_state = state.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| handle(req, conn_state.clone()));
                    if let Err(err) = Builder::new(TokioExecutor::new())
                        .serve_connection(io, service)
                        .await
                    {
                        eprintln!("metrics server connection error: {err}");
                    }
                });
            }
        }
    }
}
