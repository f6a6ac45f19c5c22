//! # Stubd Core
//!
//! `stubd-core` is the library powering the `stubd` mock server. It serves canned
//! responses for both gRPC and plain HTTP calls from a single listener, without any
//! compile-time knowledge of the Protobuf schemas involved.
//!
//! ## Key Components
//!
//! * **[`registry::ProtoRegistry`]:** Parses `.proto` sources at runtime, resolves
//!   `import` dependencies recursively and links everything into a per-instance
//!   descriptor pool. No `protoc`, no generated code.
//! * **[`grpc::GrpcStub`]:** A generic gRPC service that registers one handler per
//!   discovered method, chosen by its streaming shape (unary, server streaming,
//!   client streaming), and answers every call from a table of canned outputs.
//!   Server reflection is served alongside so clients can discover the schema.
//! * **[`httpstub::HttpStubHandler`]:** A plain HTTP handler answering from
//!   path-keyed stub files.
//! * **[`router::StubRouter`]:** Routes each inbound request to the gRPC or the
//!   HTTP side based on its protocol version and content type.
//! * **[`server::StubServer`]:** Ties the pieces together and drives the listener.
//!
//! ## Dynamic marshalling
//!
//! All payload encoding and decoding goes through `prost_reflect::DynamicMessage`
//! driven by descriptors discovered at runtime; stub files carry message bodies as
//! JSON, which is transcoded against the method's output descriptor. JSON is never
//! used on the wire.
//!
//! ## Re-exports
//!
//! This crate re-exports `prost_reflect` and `tonic` to ensure that consumers use
//! compatible versions of these underlying dependencies.
pub mod grpc;
pub mod httpstub;
pub mod registry;
pub mod router;
pub mod server;

// Re-exports
pub use prost_reflect;
pub use tonic;

/// Type alias for the standard boxed error used in generic bounds.
type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Type alias for the boxed futures returned by the tower service impls.
type BoxFuture<T, E> = std::pin::Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'static>>;
