//! # gRPC stub serving
//!
//! This module assembles the gRPC side of the stub server: the proto registry is
//! loaded from the proto directory, stub files are validated against the
//! discovered services, and the resulting [`DynamicRpcService`] is composed with
//! the server reflection services (v1 and v1alpha) fed from the same descriptor
//! pool.
pub mod codec;
pub mod dispatch;
pub mod repository;
pub mod stub;

use crate::registry::{ProtoRegistry, RegistryError};
use crate::{BoxError, BoxFuture};
use bytes::Bytes;
use dispatch::DynamicRpcService;
use http_body::Body as HttpBody;
use repository::StubRepository;
use std::convert::Infallible;
use std::path::Path;
use std::sync::Arc;
use std::task::{Context, Poll};
use stub::StubLoadError;
use tonic::body::Body;
use tower::util::BoxCloneService;
use tower::{Service, ServiceExt};

const REFLECTION_V1_PREFIX: &str = "/grpc.reflection.v1.ServerReflection/";
const REFLECTION_V1ALPHA_PREFIX: &str = "/grpc.reflection.v1alpha.ServerReflection/";

/// Errors that can occur while building the gRPC stub server. All fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum GrpcStubError {
    #[error("failed to load protos: {0}")]
    Registry(#[from] RegistryError),
    #[error("failed to load stubs: {0}")]
    Stub(#[from] StubLoadError),
    #[error("no service '{service}' registered")]
    UnknownService { service: String },
    #[error("failed to build reflection service: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),
}

type ReflectionService = BoxCloneService<http::Request<Body>, http::Response<Body>, Infallible>;

/// The gRPC branch of the stub server: dynamic method dispatch plus reflection.
#[derive(Clone)]
pub struct GrpcStub {
    dispatcher: DynamicRpcService,
    reflection_v1: ReflectionService,
    reflection_v1alpha: ReflectionService,
}

impl GrpcStub {
    /// Loads proto definitions from `proto_dir` and stub definitions from
    /// `stub_dir`, failing fast on any malformed file or on a stub referencing a
    /// service that no proto declares.
    pub fn from_dirs(proto_dir: &Path, stub_dir: Option<&Path>) -> Result<Self, GrpcStubError> {
        let mut registry = ProtoRegistry::new();
        registry.load_dir(proto_dir)?;

        let repository = Arc::new(StubRepository::new());
        if let Some(stub_dir) = stub_dir {
            for stub in stub::load_dir(stub_dir)? {
                if registry.service(&stub.service).is_none() {
                    return Err(GrpcStubError::UnknownService {
                        service: stub.service,
                    });
                }
                repository.add(stub);
            }
        }

        Self::new(&registry, repository)
    }

    /// Builds the gRPC branch from an already-populated registry and repository.
    pub fn new(
        registry: &ProtoRegistry,
        stubs: Arc<StubRepository>,
    ) -> Result<Self, GrpcStubError> {
        let dispatcher = DynamicRpcService::new(registry.services(), stubs);
        let descriptors = registry.file_descriptor_set();
        let reflection_v1 = tonic_reflection::server::Builder::configure()
            .register_file_descriptor_set(descriptors.clone())
            .build_v1()?;
        let reflection_v1alpha = tonic_reflection::server::Builder::configure()
            .register_file_descriptor_set(descriptors)
            .build_v1alpha()?;
        Ok(Self {
            dispatcher,
            reflection_v1: BoxCloneService::new(reflection_v1),
            reflection_v1alpha: BoxCloneService::new(reflection_v1alpha),
        })
    }
}

impl<B> Service<http::Request<B>> for GrpcStub
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError> + Send,
{
    type Response = http::Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let req = req.map(Body::new);
        let path = req.uri().path();
        if path.starts_with(REFLECTION_V1_PREFIX) {
            return Box::pin(self.reflection_v1.clone().oneshot(req));
        }
        if path.starts_with(REFLECTION_V1ALPHA_PREFIX) {
            return Box::pin(self.reflection_v1alpha.clone().oneshot(req));
        }
        let mut dispatcher = self.dispatcher.clone();
        Box::pin(async move { dispatcher.call(req).await })
    }
}
