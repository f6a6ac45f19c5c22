//! # HTTP stub handler
//!
//! The plain HTTP side of the stub server. Stub files are JSON documents keyed
//! by request path:
//!
//! ```json
//! {
//!   "path": "/helloworld",
//!   "method": "GET",
//!   "response": {
//!     "status": 200,
//!     "header": { "Content-Type": ["application/json"] },
//!     "body": { "message": "Hello from http stub" }
//!   }
//! }
//! ```
//!
//! Lookup is by exact path; when the stub pins a method, other methods get 405.
//! Headers and status are validated when the stubs are loaded, not per request.
use crate::{BoxError, BoxFuture};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode};
use http_body::Body as HttpBody;
use http_body_util::{BodyExt, Full};
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use walkdir::WalkDir;

/// Errors that can occur while loading HTTP stub files. All fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum HttpStubError {
    #[error("failed to read stub file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse stub file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid stub in '{path}': {reason}")]
    Invalid { path: PathBuf, reason: String },
    #[error("failed to read stub directory '{path}': {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
}

/// A predefined HTTP stub as found on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpStub {
    pub path: String,
    /// Restricts the stub to one HTTP method when non-empty.
    #[serde(default)]
    pub method: String,
    pub response: StubResponse,
}

/// The response section of an HTTP stub file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StubResponse {
    #[serde(default)]
    pub header: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    #[serde(default)]
    pub status: Option<u16>,
}

/// A stub with its response pre-validated into typed header/status values.
#[derive(Debug, Clone)]
struct PreparedStub {
    method: String,
    status: StatusCode,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl PreparedStub {
    fn prepare(stub: HttpStub) -> Result<(String, Self), String> {
        if stub.path.is_empty() {
            return Err(r#""path" field is required"#.to_string());
        }

        let status = match stub.response.status {
            Some(status) => StatusCode::from_u16(status)
                .map_err(|_| format!("invalid response status {status}"))?,
            None => StatusCode::OK,
        };

        let mut headers = HeaderMap::new();
        for (key, values) in &stub.response.header {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| format!("invalid header name '{key}'"))?;
            for value in values {
                let value = HeaderValue::from_str(value)
                    .map_err(|_| format!("invalid value for header '{key}'"))?;
                headers.append(name.clone(), value);
            }
        }

        let body = match &stub.response.body {
            Some(body) => Some(Bytes::from(
                serde_json::to_vec(body).map_err(|err| format!("invalid body: {err}"))?,
            )),
            None => None,
        };

        Ok((
            stub.path,
            Self {
                method: stub.method,
                status,
                headers,
                body,
            },
        ))
    }
}

/// An HTTP handler serving predefined responses, keyed by request path.
#[derive(Debug, Clone)]
pub struct HttpStubHandler {
    stubs: Arc<HashMap<String, PreparedStub>>,
}

impl HttpStubHandler {
    /// Loads every `.json` stub file under `dir`, recursively.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, HttpStubError> {
        let dir = dir.as_ref();
        let mut stubs = HashMap::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|source| HttpStubError::Walk {
                path: dir.to_path_buf(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension() != Some(OsStr::new("json")) {
                continue;
            }
            let (path, stub) = load_file(entry.path())?;
            stubs.insert(path, stub);
        }
        Ok(Self {
            stubs: Arc::new(stubs),
        })
    }
}

fn load_file(path: &Path) -> Result<(String, PreparedStub), HttpStubError> {
    let contents = fs::read_to_string(path).map_err(|source| HttpStubError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let stub: HttpStub = serde_json::from_str(&contents).map_err(|source| HttpStubError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    PreparedStub::prepare(stub).map_err(|reason| HttpStubError::Invalid {
        path: path.to_path_buf(),
        reason,
    })
}

impl<B> Service<Request<B>> for HttpStubHandler
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError> + Send,
{
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let stubs = Arc::clone(&self.stubs);
        Box::pin(async move {
            let (parts, body) = req.into_parts();
            tracing::info!(path = %parts.uri.path(), method = %parts.method, "received HTTP call");

            let Some(stub) = stubs.get(parts.uri.path()) else {
                tracing::error!(path = %parts.uri.path(), "unknown stub");
                return Ok(plain_response(StatusCode::NOT_FOUND, "unknown stub"));
            };

            if !stub.method.is_empty() && stub.method != parts.method.as_str() {
                tracing::error!(
                    expected = %stub.method,
                    got = %parts.method,
                    "method not allowed"
                );
                return Ok(plain_response(
                    StatusCode::METHOD_NOT_ALLOWED,
                    "method not allowed",
                ));
            }

            // Drain the request body before answering.
            if let Err(err) = body.collect().await {
                let err: BoxError = err.into();
                tracing::error!(error = %err, "error reading request body");
                return Ok(plain_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "error reading request body",
                ));
            }

            let mut response = Response::new(match &stub.body {
                Some(body) => Full::new(body.clone()),
                None => Full::new(Bytes::new()),
            });
            *response.status_mut() = stub.status;
            *response.headers_mut() = stub.headers.clone();
            Ok(response)
        })
    }
}

fn plain_response(status: StatusCode, message: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(message.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_header_names_at_load_time() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("bad.json"),
            r#"{"path": "/x", "response": {"header": {"bad header": ["v"]}}}"#,
        )
        .unwrap();

        let err = HttpStubHandler::from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, HttpStubError::Invalid { .. }));
    }

    #[test]
    fn rejects_invalid_status_codes_at_load_time() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("bad.json"),
            r#"{"path": "/x", "response": {"status": 99}}"#,
        )
        .unwrap();

        let err = HttpStubHandler::from_dir(dir.path()).unwrap_err();
        match err {
            HttpStubError::Invalid { reason, .. } => {
                assert_eq!(reason, "invalid response status 99");
            }
            other => panic!("expected invalid stub error, got {other}"),
        }
    }

    #[test]
    fn missing_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), r#"{"path": "", "response": {}}"#).unwrap();

        let err = HttpStubHandler::from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, HttpStubError::Invalid { .. }));
    }

    #[test]
    fn status_defaults_to_ok() {
        let (path, stub) = PreparedStub::prepare(HttpStub {
            path: "/x".to_string(),
            method: String::new(),
            response: StubResponse::default(),
        })
        .unwrap();

        assert_eq!(path, "/x");
        assert_eq!(stub.status, StatusCode::OK);
        assert!(stub.body.is_none());
    }
}
