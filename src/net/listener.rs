use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use axum::extract::ConnectInfo;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpSocket};
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tracing::{debug, error, info};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const LISTEN_BACKLOG: u32 = 1024;

// -----------------------------------------------------------------------------
// ----- Listener --------------------------------------------------------------

pub fn bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };

    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

/// Accept until `shutdown` resolves. Each connection gets its own task: the
/// optional TLS handshake, then HTTP/1.1 or HTTP/2 (with upgrades) into `app`.
pub async fn serve<F>(
    listener: TcpListener,
    app: Router,
    tls: Option<TlsAcceptor>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("listener shutting down");
                break;
            }

            accept_res = listener.accept() => {
                let (stream, peer) = match accept_res {
                    Ok(v) => v,
                    Err(e) => { error!("accept error: {e}"); continue; }
                };

                let _ = stream.set_nodelay(true);

                let app = app.clone();
                let tls = tls.clone();

                tokio::spawn(async move {
                    match tls {
                        Some(acceptor) => match acceptor.accept(stream).await {
                            Ok(stream) => serve_connection(stream, peer, app).await,
                            Err(e) => debug!("tls handshake with {peer} failed: {e}"),
                        },
                        None => serve_connection(stream, peer, app).await,
                    }
                });
            }
        }
    }

    Ok(())
}

// -----------------------------------------------------------------------------
// ----- Internal: Connection --------------------------------------------------

async fn serve_connection<IO>(io: IO, peer: SocketAddr, app: Router)
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |mut req: hyper::Request<Incoming>| {
        req.extensions_mut().insert(ConnectInfo(peer));
        app.clone().oneshot(req)
    });

    if let Err(e) = auto::Builder::new(TokioExecutor::new())
        .serve_connection_with_upgrades(TokioIo::new(io), service)
        .await
    {
        debug!("client {peer} connection ended: {e}");
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
