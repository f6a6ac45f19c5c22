//! In-memory stub storage, keyed by service and method name.
use super::stub::{Output, ProtoStub};
use std::collections::HashMap;
use std::sync::Mutex;

/// Thread-safe table of canned outputs.
///
/// Writes only happen while stub files are loaded at startup; afterwards the
/// table is read-only. A single mutex keeps the load and serve phases from
/// overlapping, which is all the concurrency control a test-support tool needs.
#[derive(Debug, Default)]
pub struct StubRepository {
    // represents [service name][method name]
    stubs: Mutex<HashMap<String, HashMap<String, Output>>>,
}

impl StubRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a stub, replacing any previous entry for the same service and method.
    pub fn add(&self, stub: ProtoStub) {
        let mut stubs = self.stubs.lock().expect("stub repository lock poisoned");
        stubs
            .entry(stub.service)
            .or_default()
            .insert(stub.method, stub.output);
    }

    /// Looks up the output configured for a service and method.
    ///
    /// The decoded input is accepted to keep the signature aligned with the stub
    /// schema's reserved `matcher` field; it is never inspected.
    pub fn get(
        &self,
        service: &str,
        method: &str,
        _input: Option<&serde_json::Value>,
    ) -> Option<Output> {
        let stubs = self.stubs.lock().expect("stub repository lock poisoned");
        stubs.get(service)?.get(method).cloned()
    }
}
