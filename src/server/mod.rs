// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP server for the dev proxy.
//!
//! The server is a *thin* wrapper around **hyper-util**. It owns the
//! listening socket and translates between Hyper's body types and the
//! buffered [`DevRequest`] / [`DevResponse`] pair the core works with.
//!
//! **Protocol support**
//! Uses `hyper_util::server::conn::auto::Builder`, so the same connection
//! transparently handles both HTTP/1.1 *and* HTTP/2. With `server.https`
//! configured, connections are wrapped in TLS (ALPN offers `h2` and
//! `http/1.1`).
//!
//! ## Bodies
//! Request bodies are buffered up to `server.body_limit`; larger bodies are
//! answered with `413`. Reading the body is what triggers hyper's
//! `100 Continue` for clients that send `Expect: 100-continue`.

#[cfg(test)]
mod tests;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use log::{debug, error, info, warn};
use openssl::ssl::{AlpnError, Ssl, SslAcceptor, SslFiletype, SslMethod};
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{RwLock, oneshot};
use tokio::task::{Id, JoinSet};
use tokio_openssl::SslStream;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use crate::config::{HttpsConfig, ServerConfig};
use crate::core::{DevCore, DevError, DevRequest, DevResponse, HttpMethod, decode_path};
use crate::logging::access::AccessLog;

/// HTTP server for the dev proxy.
#[derive(Clone)]
pub struct DevServer {
    config: ServerConfig,
    core: Arc<DevCore>,
    access_log: AccessLog,
    tls: Option<SslAcceptor>,
    /// Shutdown senders for each connection task
    shutdown_senders: Arc<RwLock<HashMap<Id, oneshot::Sender<()>>>>,
}

impl std::fmt::Debug for DevServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevServer")
            .field("config", &self.config)
            .field("tls", &self.tls.is_some())
            .finish_non_exhaustive()
    }
}

/// Build an acceptor from PEM files.
fn tls_acceptor(https: &HttpsConfig) -> Result<SslAcceptor, DevError> {
    let tls_err = |e: openssl::error::ErrorStack| DevError::ConfigError(format!("TLS setup failed: {e}"));

    let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).map_err(tls_err)?;
    builder
        .set_private_key_file(&https.key_file, SslFiletype::PEM)
        .map_err(tls_err)?;
    builder
        .set_certificate_chain_file(&https.cert_file)
        .map_err(tls_err)?;
    builder.check_private_key().map_err(tls_err)?;
    builder.set_alpn_select_callback(|_, client| {
        openssl::ssl::select_next_proto(b"\x02h2\x08http/1.1", client).ok_or(AlpnError::NOACK)
    });
    Ok(builder.build())
}

impl DevServer {
    pub fn new(config: ServerConfig, core: Arc<DevCore>, access_log: AccessLog) -> Result<Self, DevError> {
        let tls = config.https.as_ref().map(tls_acceptor).transpose()?;
        Ok(Self {
            config,
            core,
            access_log,
            tls,
            shutdown_senders: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn core(&self) -> &Arc<DevCore> {
        &self.core
    }

    fn scheme(&self) -> &'static str {
        if self.tls.is_some() { "https" } else { "http" }
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener, DevError> {
        let addr = self.config.bind_addr();
        TcpListener::bind(&addr)
            .await
            .map_err(|e| DevError::Other(format!("Failed to bind {addr}: {e}")))
    }

    /// Bind and serve until Ctrl-C or SIGTERM.
    pub async fn start(&self) -> Result<(), DevError> {
        let listener = self.bind().await?;

        #[cfg(unix)]
        let mut term_stream = signal(SignalKind::terminate())
            .map_err(|e| DevError::Other(format!("Cannot install SIGTERM handler: {}", e)))?;

        let shutdown = async move {
            #[cfg(unix)]
            let sigterm = term_stream.recv();
            #[cfg(not(unix))]
            let sigterm = std::future::pending::<Option<()>>();

            tokio::select! {
                _ = signal::ctrl_c() => info!("Received Ctrl-C; initiating graceful shutdown"),
                _ = sigterm => info!("Received SIGTERM; initiating graceful shutdown"),
            }
        };

        self.serve_with_shutdown(listener, shutdown).await
    }

    /// Accept connections on `listener` until `shutdown` resolves, then drain.
    pub async fn serve_with_shutdown<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), DevError>
    where
        F: Future<Output = ()>,
    {
        let local = listener.local_addr()?;
        info!("Dev server listening on {}://{}", self.scheme(), local);

        tokio::pin!(shutdown);

        let shutdown_senders = self.shutdown_senders.clone();
        let mut join_set = JoinSet::new();
        let shutdown_initiated = Arc::new(AtomicBool::new(false));

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    shutdown_initiated.store(true, Ordering::SeqCst);
                    break;
                }
                accept = listener.accept() => {
                    match accept {
                        Ok((stream, remote_addr)) => {
                            if shutdown_initiated.load(Ordering::SeqCst) {
                                info!("Rejecting new connection during shutdown");
                                continue;
                            }

                            let (tx, rx) = oneshot::channel();
                            let senders = shutdown_senders.clone();
                            let conn = ConnectionContext {
                                core: self.core.clone(),
                                access_log: self.access_log.clone(),
                                body_limit: self.config.body_limit,
                                remote_addr,
                                scheme: self.scheme(),
                            };
                            let tls = self.tls.clone();

                            let handle = join_set.spawn(async move {
                                let task_id = tokio::task::id();
                                match tls {
                                    Some(acceptor) => match accept_tls(&acceptor, stream).await {
                                        Ok(tls_stream) => conn.serve(tls_stream, rx).await,
                                        Err(e) => warn!("TLS handshake with {} failed: {}", remote_addr, e),
                                    },
                                    None => conn.serve(stream, rx).await,
                                }
                                senders.write().await.remove(&task_id);
                                debug!("Connection task {:?} completed", task_id);
                            });

                            shutdown_senders.write().await.insert(handle.id(), tx);
                        }
                        Err(e) => error!("Accept error: {}", e),
                    }
                }
            }
        }

        info!("Shutting down; waiting for {} connection(s)", join_set.len());
        {
            let mut senders = shutdown_senders.write().await;
            for (task_id, sender) in senders.drain() {
                debug!("Sending shutdown signal to task {:?}", task_id);
                let _ = sender.send(());
            }
        }

        let shutdown_timeout = Duration::from_secs(self.config.shutdown_timeout);
        let start_time = tokio::time::Instant::now();

        let drain = async {
            while let Some(res) = join_set.join_next().await {
                match res {
                    Ok(()) => {}
                    Err(e) if e.is_cancelled() => debug!("Connection task cancelled"),
                    Err(e) => error!("Connection task failed: {}", e),
                }
            }
        };

        match tokio::time::timeout(shutdown_timeout, drain).await {
            Ok(()) => info!(
                "All connections drained gracefully in {:.1}s",
                start_time.elapsed().as_secs_f32()
            ),
            Err(_) => {
                warn!(
                    "Shutdown timed out after {} seconds, some connections may be forcefully closed",
                    shutdown_timeout.as_secs()
                );
                join_set.shutdown().await;
            }
        }

        info!("Shutdown complete");
        Ok(())
    }
}

async fn accept_tls(
    acceptor: &SslAcceptor,
    stream: tokio::net::TcpStream,
) -> Result<SslStream<tokio::net::TcpStream>, DevError> {
    let ssl = Ssl::new(acceptor.context()).map_err(|e| DevError::Other(e.to_string()))?;
    let mut stream = SslStream::new(ssl, stream).map_err(|e| DevError::Other(e.to_string()))?;
    Pin::new(&mut stream)
        .accept()
        .await
        .map_err(|e| DevError::Other(e.to_string()))?;
    Ok(stream)
}

/// Everything a connection task needs.
#[derive(Clone)]
struct ConnectionContext {
    core: Arc<DevCore>,
    access_log: AccessLog,
    body_limit: usize,
    remote_addr: SocketAddr,
    scheme: &'static str,
}

fn is_benign_close(e: &dyn std::fmt::Display) -> bool {
    let err_str = e.to_string();
    err_str.contains("connection closed") || err_str.contains("connection reset")
}

impl ConnectionContext {
    async fn serve<S>(self, stream: S, rx: oneshot::Receiver<()>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let io = TokioIo::new(stream);
        let ctx = self;
        let service = service_fn(move |req: Request<Incoming>| {
            let ctx = ctx.clone();
            async move { Ok::<_, Infallible>(ctx.handle(req).await) }
        });

        let builder = {
            let mut b = AutoBuilder::new(TokioExecutor::new());
            b.http1();
            b.http2();
            b
        };

        let connection = builder.serve_connection(io, service);
        let mut conn = std::pin::pin!(connection);

        tokio::select! {
            res = &mut conn => {
                if let Err(e) = res {
                    if !is_benign_close(&e) {
                        error!("Connection error: {}", e);
                    }
                }
            }
            _ = rx => {
                debug!("Connection received shutdown signal, waiting for graceful close");
                conn.as_mut().graceful_shutdown();
                if let Err(e) = conn.await {
                    if !is_benign_close(&e) {
                        error!("Connection error during graceful shutdown: {}", e);
                    }
                }
            }
        }
    }

    async fn handle(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        let info = self.access_log.begin(
            req.method().as_str(),
            req.uri().path(),
            req.headers(),
            Some(self.remote_addr),
        );

        let response = match self.convert_request(req).await {
            Ok(request) => self.core.respond(request).await,
            Err(e) => {
                warn!("Rejected request from {}: {}", self.remote_addr, e);
                e.to_response()
            }
        };

        self.access_log
            .finish(&info, response.status, response.function_time);
        convert_response(response)
    }

    /// Buffer the body and decode the path.
    async fn convert_request(&self, req: Request<Incoming>) -> Result<DevRequest, DevError> {
        let (parts, body) = req.into_parts();
        let method = HttpMethod::try_from(&parts.method)?;

        let body = Limited::new(body, self.body_limit)
            .collect()
            .await
            .map_err(|e| {
                if e.is::<http_body_util::LengthLimitError>() {
                    DevError::BodyTooLarge(self.body_limit)
                } else {
                    DevError::Other(format!("failed to read request body: {e}"))
                }
            })?
            .to_bytes();

        let raw_path = parts.uri.path().to_string();
        Ok(DevRequest {
            method,
            path: decode_path(&raw_path),
            raw_path,
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers,
            body,
            remote_addr: Some(self.remote_addr),
            scheme: self.scheme,
        })
    }
}

fn convert_response(response: DevResponse) -> Response<Full<Bytes>> {
    let mut out = Response::new(Full::new(response.body));
    *out.status_mut() = StatusCode::from_u16(response.status).unwrap_or_else(|_| {
        error!("Invalid status code {}; answering 500", response.status);
        StatusCode::INTERNAL_SERVER_ERROR
    });
    *out.headers_mut() = response.headers;
    out
}
