mod support;

use serde_json::json;
use std::path::Path;
use stubd_core::server::StubServer;
use support::TestClient;
use tokio::net::TcpListener;
use tonic::transport::Endpoint;

#[tokio::test]
async fn serves_grpc_over_a_real_listener() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = StubServer::builder()
        .with_proto(Path::new(support::PROTO_DIR), Some(Path::new(support::STUB_DIR)))
        .unwrap()
        .build();
    let handle = tokio::spawn(server.serve(listener, None));

    let channel = Endpoint::new(format!("http://{addr}"))
        .unwrap()
        .connect()
        .await
        .unwrap();
    let method = support::method("greet.Greeter", "SayHello");
    let mut client = TestClient::new(channel);

    let reply = client
        .unary(&method, json!({ "name": "Jane" }))
        .await
        .unwrap();
    assert_eq!(reply, json!({ "message": "hello from stub" }));

    handle.abort();
}
