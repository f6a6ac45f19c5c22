//! # Stub server assembly and serving
//!
//! [`StubServer`] ties the gRPC and HTTP branches together behind the protocol
//! router and drives the listener. Both branches are fully built, validated and
//! immutable before the first connection is accepted; any load failure aborts
//! startup.
//!
//! Each accepted connection is served on its own task through the hyper auto
//! connection builder, which speaks HTTP/1.1 and HTTP/2 on the same port,
//! including HTTP/2 without prior TLS negotiation. When a rustls config is
//! supplied the connection is wrapped in a TLS acceptor first.
use crate::BoxError;
use crate::grpc::{GrpcStub, GrpcStubError};
use crate::httpstub::{HttpStubError, HttpStubHandler};
use crate::router::StubRouter;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use std::path::Path;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

/// Builder for a [`StubServer`]. Branches left unconfigured answer 501.
#[derive(Default)]
pub struct StubServerBuilder {
    grpc: Option<GrpcStub>,
    http: Option<HttpStubHandler>,
}

impl StubServerBuilder {
    /// Configures the gRPC branch from a proto directory and an optional
    /// directory of gRPC stub files.
    pub fn with_proto(
        mut self,
        proto_dir: impl AsRef<Path>,
        stub_dir: Option<&Path>,
    ) -> Result<Self, GrpcStubError> {
        self.grpc = Some(GrpcStub::from_dirs(proto_dir.as_ref(), stub_dir)?);
        Ok(self)
    }

    /// Configures the HTTP branch from a directory of HTTP stub files.
    pub fn with_http(mut self, stub_dir: impl AsRef<Path>) -> Result<Self, HttpStubError> {
        self.http = Some(HttpStubHandler::from_dir(stub_dir)?);
        Ok(self)
    }

    pub fn build(self) -> StubServer {
        StubServer {
            router: StubRouter::new(self.grpc, self.http),
        }
    }
}

/// A fully assembled stub server, ready to serve connections.
pub struct StubServer {
    router: StubRouter,
}

impl StubServer {
    pub fn builder() -> StubServerBuilder {
        StubServerBuilder::default()
    }

    /// Returns the underlying router service, for embedding the server into an
    /// existing stack or driving it in-process.
    pub fn into_service(self) -> StubRouter {
        self.router
    }

    /// Serves connections until an accept error occurs.
    pub async fn serve(
        self,
        listener: TcpListener,
        tls: Option<rustls::ServerConfig>,
    ) -> std::io::Result<()> {
        self.serve_with_shutdown(listener, tls, std::future::pending())
            .await
    }

    /// Serves connections until `signal` resolves, then stops accepting.
    ///
    /// In-flight connections are dropped with the server; stubs are canned
    /// data, so there is nothing to flush on the way out.
    pub async fn serve_with_shutdown<F>(
        self,
        listener: TcpListener,
        tls: Option<rustls::ServerConfig>,
        signal: F,
    ) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let acceptor = tls.map(|config| TlsAcceptor::from(Arc::new(config)));
        tokio::pin!(signal);

        loop {
            let (stream, remote) = tokio::select! {
                _ = &mut signal => {
                    tracing::info!("closing server");
                    return Ok(());
                }
                accepted = listener.accept() => accepted?,
            };

            let router = self.router.clone();
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                if let Err(err) = serve_connection(stream, router, acceptor).await {
                    tracing::debug!(remote = %remote, error = %err, "connection closed with error");
                }
            });
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    router: StubRouter,
    acceptor: Option<TlsAcceptor>,
) -> Result<(), BoxError> {
    let service = TowerToHyperService::new(router);
    let builder = auto::Builder::new(TokioExecutor::new());
    match acceptor {
        Some(acceptor) => {
            let stream = acceptor.accept(stream).await?;
            builder
                .serve_connection_with_upgrades(TokioIo::new(stream), service)
                .await
        }
        None => {
            builder
                .serve_connection_with_upgrades(TokioIo::new(stream), service)
                .await
        }
    }
}
