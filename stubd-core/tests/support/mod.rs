//! Test support: a minimal dynamic gRPC client driving a server `Service`
//! fully in-process, no network involved.
#![allow(dead_code)]

use http::uri::PathAndQuery;
use prost_reflect::{DynamicMessage, MethodDescriptor};
use std::str::FromStr;
use std::task::{Context, Poll};
use stubd_core::grpc::codec::DynamicCodec;
use stubd_core::registry::ProtoRegistry;
use tonic::body::Body;
use tonic::client::{Grpc, GrpcService};
use tonic::{Request, Status, Streaming};
use tower::Service;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub const PROTO_DIR: &str = "tests/testdata/protos";
pub const STUB_DIR: &str = "tests/testdata/stubs";
pub const HTTP_STUB_DIR: &str = "tests/testdata/httpstubs";

/// Resolves a method descriptor from the test proto fixtures.
pub fn method(service: &str, name: &str) -> MethodDescriptor {
    let mut registry = ProtoRegistry::new();
    registry.load_dir(PROTO_DIR).expect("valid test protos");
    registry
        .service(service)
        .expect("service declared in test protos")
        .methods()
        .find(|method| method.name() == name)
        .expect("method declared in test protos")
}

pub fn to_json(message: &DynamicMessage) -> serde_json::Value {
    serde_json::to_value(message).expect("serializable message")
}

fn json_to_message(method: &MethodDescriptor, payload: serde_json::Value) -> DynamicMessage {
    DynamicMessage::deserialize(method.input(), payload).expect("payload matches input schema")
}

fn http_path(method: &MethodDescriptor) -> PathAndQuery {
    let path = format!("/{}/{}", method.parent_service().full_name(), method.name());
    PathAndQuery::from_str(&path).expect("valid gRPC path")
}

/// A dynamic gRPC client over any tower service, in the shape tonic's
/// generated clients take.
pub struct TestClient<S> {
    client: Grpc<S>,
}

impl<S> TestClient<S>
where
    S: GrpcService<Body>,
    S::Error: Into<BoxError>,
    S::ResponseBody: http_body::Body<Data = bytes::Bytes> + Send + 'static,
    <S::ResponseBody as http_body::Body>::Error: Into<BoxError> + Send,
{
    pub fn new(service: S) -> Self {
        Self {
            client: Grpc::new(service),
        }
    }

    pub async fn unary(
        &mut self,
        method: &MethodDescriptor,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, Status> {
        self.unary_with_path(http_path(method), method, payload).await
    }

    /// Like [`Self::unary`] but with an explicit request path, for calls the
    /// server is not expected to know.
    pub async fn unary_with_path(
        &mut self,
        path: PathAndQuery,
        method: &MethodDescriptor,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, Status> {
        self.ready().await;
        let codec = DynamicCodec::new(method.input(), method.output());
        let request = Request::new(json_to_message(method, payload));
        let response = self.client.unary(request, path, codec).await?;
        Ok(to_json(&response.into_inner()))
    }

    pub async fn server_streaming(
        &mut self,
        method: &MethodDescriptor,
        payload: serde_json::Value,
    ) -> Result<Streaming<DynamicMessage>, Status> {
        self.ready().await;
        let codec = DynamicCodec::new(method.input(), method.output());
        let request = Request::new(json_to_message(method, payload));
        let response = self
            .client
            .server_streaming(request, http_path(method), codec)
            .await?;
        Ok(response.into_inner())
    }

    pub async fn client_streaming(
        &mut self,
        method: &MethodDescriptor,
        payloads: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, Status> {
        self.ready().await;
        let codec = DynamicCodec::new(method.input(), method.output());
        let messages: Vec<DynamicMessage> = payloads
            .into_iter()
            .map(|payload| json_to_message(method, payload))
            .collect();
        let request = Request::new(tokio_stream::iter(messages));
        let response = self
            .client
            .client_streaming(request, http_path(method), codec)
            .await?;
        Ok(to_json(&response.into_inner()))
    }

    pub async fn bidirectional(
        &mut self,
        method: &MethodDescriptor,
        payloads: Vec<serde_json::Value>,
    ) -> Result<Streaming<DynamicMessage>, Status> {
        self.ready().await;
        let codec = DynamicCodec::new(method.input(), method.output());
        let messages: Vec<DynamicMessage> = payloads
            .into_iter()
            .map(|payload| json_to_message(method, payload))
            .collect();
        let request = Request::new(tokio_stream::iter(messages));
        let response = self
            .client
            .streaming(request, http_path(method), codec)
            .await?;
        Ok(response.into_inner())
    }

    async fn ready(&mut self) {
        if let Err(err) = self.client.ready().await {
            let err: BoxError = err.into();
            panic!("in-process service not ready: {err}");
        }
    }
}

/// Stamps HTTP/2 onto every request, the way a real gRPC transport would
/// before the router inspects it.
#[derive(Clone)]
pub struct ForceHttp2<S>(pub S);

impl<S, B> Service<http::Request<B>> for ForceHttp2<S>
where
    S: Service<http::Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.0.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<B>) -> Self::Future {
        *req.version_mut() = http::Version::HTTP_2;
        self.0.call(req)
    }
}
