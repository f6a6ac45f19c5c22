//! # Protocol router
//!
//! The single point where gRPC and plain HTTP traffic share a port. Each inbound
//! request is inspected *before* any response bytes are written: HTTP/2 requests
//! whose content type carries the gRPC media type prefix go to the gRPC stub
//! server, everything else goes to the plain HTTP stub handler. A branch that
//! was never configured answers 501 instead of crashing.
use crate::grpc::GrpcStub;
use crate::httpstub::HttpStubHandler;
use crate::{BoxError, BoxFuture};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Request, Response, StatusCode, Version};
use http_body::Body as HttpBody;
use http_body_util::Full;
use std::convert::Infallible;
use std::future::ready;
use std::task::{Context, Poll};
use tonic::body::Body;
use tower::{Service, ServiceExt};

/// Media type prefix that marks a request as gRPC.
const GRPC_CONTENT_TYPE_PREFIX: &[u8] = b"application/grpc";

/// Routes inbound requests to the gRPC stub server or the HTTP stub handler.
#[derive(Clone)]
pub struct StubRouter {
    grpc: Option<GrpcStub>,
    http: Option<HttpStubHandler>,
}

impl StubRouter {
    pub(crate) fn new(grpc: Option<GrpcStub>, http: Option<HttpStubHandler>) -> Self {
        Self { grpc, http }
    }

    fn is_grpc_request<B>(req: &Request<B>) -> bool {
        req.version() == Version::HTTP_2
            && req
                .headers()
                .get(CONTENT_TYPE)
                .is_some_and(|value| value.as_bytes().starts_with(GRPC_CONTENT_TYPE_PREFIX))
    }
}

impl<B> Service<Request<B>> for StubRouter
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError> + Send,
{
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        if Self::is_grpc_request(&req) {
            return match self.grpc.clone() {
                Some(grpc) => Box::pin(grpc.oneshot(req)),
                None => Box::pin(ready(Ok(not_implemented(
                    "no gRPC stub server configured",
                )))),
            };
        }

        match self.http.clone() {
            Some(http) => Box::pin(async move {
                let response = http.oneshot(req).await?;
                Ok(response.map(Body::new))
            }),
            None => Box::pin(ready(Ok(not_implemented("no HTTP stub server configured")))),
        }
    }
}

fn not_implemented(message: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::new(Full::new(Bytes::from_static(message.as_bytes()))));
    *response.status_mut() = StatusCode::NOT_IMPLEMENTED;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
