//! # Dynamic RPC dispatch
//!
//! The bridge between descriptor-driven service definitions and tonic's generic
//! server machinery. For every service in the registry, and for every method of
//! that service, one route is resolved at registration time carrying the method
//! descriptor and its streaming shape; incoming calls are dispatched by their
//! HTTP/2 path against that table, decoded through [`DynamicCodec`], and answered
//! from the [`StubRepository`].
//!
//! Status code conventions:
//!
//! * unknown service or method, or no stub configured: `NOT_FOUND`
//! * bidirectional streaming methods: `UNIMPLEMENTED`
//! * undecodable caller input: `INVALID_ARGUMENT`
//! * stub data that does not match the output schema: `INTERNAL`
//! * stub with an explicit `code`: that code and message, verbatim
use super::codec::DynamicCodec;
use super::repository::StubRepository;
use super::stub::{Output, StreamOutput};
use crate::{BoxError, BoxFuture};
use bytes::Bytes;
use http_body::Body as HttpBody;
use prost_reflect::{DynamicMessage, MethodDescriptor, ServiceDescriptor};
use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::server::{ClientStreamingService, Grpc, ServerStreamingService, UnaryService};
use tonic::{Code, Request, Response, Status, Streaming};

/// Streaming shape of a method, resolved once at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Unary,
    ServerStreaming,
    ClientStreaming,
    /// Out of scope; calls fail with `UNIMPLEMENTED`.
    Bidirectional,
}

impl Cardinality {
    fn of(method: &MethodDescriptor) -> Self {
        match (method.is_client_streaming(), method.is_server_streaming()) {
            (false, false) => Self::Unary,
            (false, true) => Self::ServerStreaming,
            (true, false) => Self::ClientStreaming,
            (true, true) => Self::Bidirectional,
        }
    }
}

/// Everything needed to serve one method, resolved at registration time.
#[derive(Clone)]
struct MethodRoute {
    method: MethodDescriptor,
    cardinality: Cardinality,
    service: String,
    name: String,
}

/// A generic gRPC service answering every registered method from the stub table.
#[derive(Clone)]
pub struct DynamicRpcService {
    routes: Arc<HashMap<String, MethodRoute>>,
    stubs: Arc<StubRepository>,
}

impl DynamicRpcService {
    pub fn new(
        services: impl IntoIterator<Item = ServiceDescriptor>,
        stubs: Arc<StubRepository>,
    ) -> Self {
        let mut routes = HashMap::new();
        for service in services {
            for method in service.methods() {
                let path = format!("/{}/{}", service.full_name(), method.name());
                let route = MethodRoute {
                    cardinality: Cardinality::of(&method),
                    service: service.full_name().to_string(),
                    name: method.name().to_string(),
                    method,
                };
                routes.insert(path, route);
            }
        }
        Self {
            routes: Arc::new(routes),
            stubs,
        }
    }
}

impl<B> tower::Service<http::Request<B>> for DynamicRpcService
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError> + Send,
{
    type Response = http::Response<tonic::body::Body>;
    type Error = std::convert::Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let Some(route) = self.routes.get(req.uri().path()).cloned() else {
            let status = Status::not_found(format!(
                "no service or method registered for '{}'",
                req.uri().path()
            ));
            return Box::pin(std::future::ready(Ok(status_response(&status))));
        };
        let stubs = Arc::clone(&self.stubs);

        Box::pin(async move {
            let codec = DynamicCodec::new(route.method.output(), route.method.input());
            let mut grpc = Grpc::new(codec);
            let response = match route.cardinality {
                Cardinality::Unary => grpc.unary(UnaryStub { route, stubs }, req).await,
                Cardinality::ServerStreaming => {
                    grpc.server_streaming(ServerStreamStub { route, stubs }, req)
                        .await
                }
                Cardinality::ClientStreaming => {
                    grpc.client_streaming(ClientStreamStub { route, stubs }, req)
                        .await
                }
                Cardinality::Bidirectional => status_response(&Status::unimplemented(
                    "bidirectional streaming is not supported",
                )),
            };
            Ok(response)
        })
    }
}

/// A headers-only gRPC response carrying a status, as produced for calls that
/// never reach a codec.
fn status_response(status: &Status) -> http::Response<tonic::body::Body> {
    let mut response = http::Response::new(tonic::body::Body::empty());
    let headers = response.headers_mut();
    headers.insert("grpc-status", http::HeaderValue::from(status.code() as i32));
    if let Ok(message) = http::HeaderValue::from_str(status.message()) {
        headers.insert("grpc-message", message);
    }
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/grpc"),
    );
    response
}

fn no_stub_found(route: &MethodRoute) -> Status {
    Status::not_found(format!(
        "no stub found for '{}/{}'",
        route.service, route.name
    ))
}

/// Decodes a stored JSON message against the method's output descriptor.
fn decode_output(route: &MethodRoute, data: &serde_json::Value) -> Result<DynamicMessage, Status> {
    DynamicMessage::deserialize(route.method.output(), data.clone()).map_err(|err| {
        tracing::error!(
            service = %route.service,
            method = %route.name,
            error = %err,
            "failed to decode configured stub response"
        );
        Status::internal("failed to decode stub response")
    })
}

/// Answers with the stub's single `data` message, its configured status, or
/// `UNIMPLEMENTED` when the stub carries no unary-shaped output.
fn unary_reply(route: &MethodRoute, output: &Output) -> Result<Response<DynamicMessage>, Status> {
    if let Some(data) = &output.data {
        let message = decode_output(route, data)?;
        return Ok(Response::new(message));
    }
    if let Some(code) = output.code {
        return Err(Status::new(code.into(), output.error.clone()));
    }
    Err(Status::unimplemented(output.error.clone()))
}

struct UnaryStub {
    route: MethodRoute,
    stubs: Arc<StubRepository>,
}

impl UnaryService<DynamicMessage> for UnaryStub {
    type Response = DynamicMessage;
    type Future = BoxFuture<Response<DynamicMessage>, Status>;

    fn call(&mut self, request: Request<DynamicMessage>) -> Self::Future {
        let route = self.route.clone();
        let stubs = Arc::clone(&self.stubs);
        Box::pin(async move {
            let input = serde_json::to_value(request.get_ref()).unwrap_or_default();
            tracing::info!(
                service = %route.service,
                method = %route.name,
                input = %input,
                "received gRPC call"
            );

            let output = stubs
                .get(&route.service, &route.name, Some(&input))
                .ok_or_else(|| no_stub_found(&route))?;
            unary_reply(&route, &output)
        })
    }
}

struct ServerStreamStub {
    route: MethodRoute,
    stubs: Arc<StubRepository>,
}

impl ServerStreamingService<DynamicMessage> for ServerStreamStub {
    type Response = DynamicMessage;
    type ResponseStream = ReceiverStream<Result<DynamicMessage, Status>>;
    type Future = BoxFuture<Response<Self::ResponseStream>, Status>;

    fn call(&mut self, request: Request<DynamicMessage>) -> Self::Future {
        let route = self.route.clone();
        let stubs = Arc::clone(&self.stubs);
        Box::pin(async move {
            let input = serde_json::to_value(request.get_ref()).unwrap_or_default();
            tracing::info!(
                service = %route.service,
                method = %route.name,
                input = %input,
                "received server streaming gRPC call"
            );

            let output = stubs
                .get(&route.service, &route.name, Some(&input))
                .ok_or_else(|| no_stub_found(&route))?;

            let (tx, rx) = mpsc::channel(1);
            match output.stream {
                Some(stream) => {
                    tokio::spawn(send_stream(route, stream, tx));
                }
                None => {
                    if let Some(code) = output.code {
                        return Err(Status::new(code.into(), output.error));
                    }
                    if let Some(data) = &output.data {
                        // A single data message on a streaming method becomes a
                        // one-element stream.
                        let message = decode_output(&route, data)?;
                        let _ = tx.send(Ok(message)).await;
                    }
                }
            }
            Ok(Response::new(ReceiverStream::new(rx)))
        })
    }
}

/// Emits the stream's messages in array order, pausing `delay` between
/// consecutive messages. Each pause races against the receiver going away, so a
/// cancelled call never schedules further sends.
async fn send_stream(
    route: MethodRoute,
    stream: StreamOutput,
    tx: mpsc::Sender<Result<DynamicMessage, Status>>,
) {
    let delay = Duration::from_millis(stream.delay);
    for (index, item) in stream.data.iter().enumerate() {
        if index > 0 && !delay.is_zero() {
            tokio::select! {
                _ = tx.closed() => {
                    tracing::info!(
                        service = %route.service,
                        method = %route.name,
                        "stream cancelled by client"
                    );
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
        let message = match decode_output(&route, item) {
            Ok(message) => message,
            Err(status) => {
                let _ = tx.send(Err(status)).await;
                return;
            }
        };
        if tx.send(Ok(message)).await.is_err() {
            tracing::info!(
                service = %route.service,
                method = %route.name,
                "stream cancelled by client"
            );
            return;
        }
    }
    if let Some(code) = stream.code {
        let _ = tx
            .send(Err(Status::new(code.into(), stream.error.clone())))
            .await;
    } else if !stream.error.is_empty() {
        let _ = tx.send(Err(Status::unknown(stream.error.clone()))).await;
    }
}

struct ClientStreamStub {
    route: MethodRoute,
    stubs: Arc<StubRepository>,
}

impl ClientStreamingService<DynamicMessage> for ClientStreamStub {
    type Response = DynamicMessage;
    type Future = BoxFuture<Response<DynamicMessage>, Status>;

    fn call(&mut self, request: Request<Streaming<DynamicMessage>>) -> Self::Future {
        let route = self.route.clone();
        let stubs = Arc::clone(&self.stubs);
        Box::pin(async move {
            tracing::info!(
                service = %route.service,
                method = %route.name,
                "received client streaming gRPC call"
            );

            // Drain the inbound stream; received messages are not inspected for
            // matching, only their presence is consumed.
            let mut inbound = request.into_inner();
            loop {
                match inbound.message().await {
                    Ok(Some(message)) => {
                        let input = serde_json::to_value(&message).unwrap_or_default();
                        tracing::info!(
                            service = %route.service,
                            method = %route.name,
                            input = %input,
                            "received message"
                        );
                    }
                    Ok(None) => break,
                    Err(status)
                        if matches!(status.code(), Code::Cancelled | Code::DeadlineExceeded) =>
                    {
                        tracing::info!(
                            service = %route.service,
                            method = %route.name,
                            code = ?status.code(),
                            "stream closed by client"
                        );
                        return Err(status);
                    }
                    Err(status) => {
                        tracing::error!(
                            service = %route.service,
                            method = %route.name,
                            error = %status,
                            "failed to receive input message"
                        );
                        return Err(Status::invalid_argument("failed to receive input message"));
                    }
                }
            }

            let output = stubs
                .get(&route.service, &route.name, None)
                .ok_or_else(|| no_stub_found(&route))?;
            unary_reply(&route, &output)
        })
    }
}
