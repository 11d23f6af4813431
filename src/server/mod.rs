//! Listener wiring.
//!
//! One axum router is served over plain HTTP and, when a certificate is
//! configured, over HTTPS. Both listeners stop accepting on the same shutdown
//! signal.

mod tls;

pub use tls::acceptor_from_files;

use anyhow::{Context, Result};
use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tower::Service;
use tracing::{debug, error, info};

use crate::config::Config;

/// Bind the configured listeners and serve `router` until Ctrl-C or SIGTERM
pub async fn run(config: &Config, router: Router) -> Result<()> {
    let (trigger, shutdown) = watch::channel(false);

    let http_addr = format!("{}:{}", config.server.host, config.server.http_port);
    let listener = TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", http_addr))?;
    info!("HTTP server listening on http://{}", http_addr);
    let mut http = tokio::spawn(serve_http(listener, router.clone(), shutdown.clone()));

    let https = match config.tls.paths() {
        Some((cert_path, key_path)) => {
            let acceptor = acceptor_from_files(cert_path, key_path)?;
            let https_addr = format!("{}:{}", config.server.host, config.server.https_port);
            let listener = TcpListener::bind(&https_addr)
                .await
                .with_context(|| format!("Failed to bind HTTPS listener on {}", https_addr))?;
            info!("HTTPS server listening on https://{}", https_addr);
            Some(tokio::spawn(serve_https(listener, acceptor, router, shutdown)))
        }
        None => {
            info!("No TLS certificate configured, HTTPS listener disabled");
            None
        }
    };

    tokio::select! {
        _ = shutdown_signal() => {}
        result = &mut http => {
            result??;
            anyhow::bail!("HTTP server stopped unexpectedly");
        }
    }
    // Receivers may already be gone if a listener failed
    let _ = trigger.send(true);

    http.await??;
    if let Some(https) = https {
        https.await??;
    }

    info!("Server stopped");
    Ok(())
}

pub async fn serve_http(
    listener: TcpListener,
    router: Router,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown(shutdown))
        .await?;
    Ok(())
}

/// Accept TLS connections and serve each one with `router` over HTTP/1.1
pub async fn serve_https(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    loop {
        let (stream, remote_addr) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(connection) => connection,
                Err(e) => {
                    error!(error = %e, "Error accepting connection");
                    continue;
                }
            },
            _ = shutdown.wait_for(|stop| *stop) => break,
        };

        let acceptor = acceptor.clone();
        let router = router.clone();
        tokio::spawn(async move {
            let stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    debug!(remote = %remote_addr, error = %e, "TLS handshake failed");
                    return;
                }
            };

            let service = service_fn(move |request: Request<Incoming>| router.clone().call(request));
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!(remote = %remote_addr, error = %e, "Error serving TLS connection");
            }
        });
    }

    info!("HTTPS listener stopped");
    Ok(())
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
