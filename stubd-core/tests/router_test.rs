mod support;

use http::{Method, Request, StatusCode, Version, header::CONTENT_TYPE};
use http_body_util::BodyExt;
use serde_json::json;
use std::path::Path;
use stubd_core::router::StubRouter;
use stubd_core::server::StubServer;
use support::{ForceHttp2, TestClient};
use tonic::body::Body;
use tower::ServiceExt;

fn full_router() -> StubRouter {
    StubServer::builder()
        .with_proto(Path::new(support::PROTO_DIR), Some(Path::new(support::STUB_DIR)))
        .unwrap()
        .with_http(Path::new(support::HTTP_STUB_DIR))
        .unwrap()
        .build()
        .into_service()
}

async fn body_json(body: Body) -> serde_json::Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn http1_requests_are_routed_to_the_http_handler() {
    let router = full_router();

    let request = Request::builder()
        .method(Method::GET)
        .uri("/helloworld")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).unwrap(),
        "application/json"
    );
    assert_eq!(
        body_json(response.into_body()).await,
        json!({ "message": "Hello from http stub" })
    );
}

#[tokio::test]
async fn http2_grpc_requests_are_routed_to_the_grpc_server() {
    let router = full_router();

    // An unknown method still proves which branch answered: only the gRPC
    // side reports its status in the grpc-status header.
    let request = Request::builder()
        .method(Method::POST)
        .uri("/greet.Greeter/NoSuchMethod")
        .version(Version::HTTP_2)
        .header(CONTENT_TYPE, "application/grpc")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("grpc-status").unwrap(), "5");
}

#[tokio::test]
async fn http2_without_grpc_content_type_goes_to_the_http_handler() {
    let router = full_router();

    let request = Request::builder()
        .method(Method::GET)
        .uri("/helloworld")
        .version(Version::HTTP_2)
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn grpc_requests_without_a_grpc_branch_get_not_implemented() {
    let router = StubServer::builder()
        .with_http(Path::new(support::HTTP_STUB_DIR))
        .unwrap()
        .build()
        .into_service();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/greet.Greeter/SayHello")
        .version(Version::HTTP_2)
        .header(CONTENT_TYPE, "application/grpc")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn http_requests_without_an_http_branch_get_not_implemented() {
    let router = StubServer::builder()
        .with_proto(Path::new(support::PROTO_DIR), Some(Path::new(support::STUB_DIR)))
        .unwrap()
        .build()
        .into_service();

    let request = Request::builder()
        .method(Method::GET)
        .uri("/helloworld")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn unknown_http_paths_are_not_found() {
    let router = full_router();

    let request = Request::builder()
        .method(Method::GET)
        .uri("/nowhere")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn http_method_mismatches_are_rejected() {
    let router = full_router();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/helloworld")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn grpc_calls_work_end_to_end_through_the_router() {
    let method = support::method("greet.Greeter", "SayHello");
    let mut client = TestClient::new(ForceHttp2(full_router()));

    let reply = client
        .unary(&method, json!({ "name": "Jane" }))
        .await
        .unwrap();

    assert_eq!(reply, json!({ "message": "hello from stub" }));
}
