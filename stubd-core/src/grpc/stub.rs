//! # gRPC stub definitions
//!
//! Stub files are JSON documents, one stub per file, describing the canned output
//! of a single `(service, method)` pair:
//!
//! ```json
//! {
//!   "service": "helloworld.Greeter",
//!   "method": "SayHello",
//!   "output": { "data": { "message": "Hello from proto stub" } }
//! }
//! ```
//!
//! An output carries exactly one of `data` (a single message), `code`/`error`
//! (a gRPC status) or `stream` (an ordered list of messages with an optional
//! per-message delay and terminal error). Files that populate none of these are
//! rejected at load time.
use serde::Deserialize;
use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Errors that can occur while loading stub files. All fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum StubLoadError {
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

/// A canned response definition for one `(service, method)` pair.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtoStub {
    /// Fully qualified service name (e.g. `my.pkg.Service`).
    pub service: String,
    /// Method name (e.g. `SayHello`).
    pub method: String,
    /// Reserved for content-based matching. Parsed but never evaluated;
    /// output selection is purely by service and method.
    #[serde(default)]
    pub matcher: String,
    pub output: Output,
}

impl ProtoStub {
    fn validate(&self) -> Result<(), String> {
        if self.service.is_empty() {
            return Err(r#""service" field is required"#.to_string());
        }
        if self.method.is_empty() {
            return Err(r#""method" field is required"#.to_string());
        }
        self.output.validate()
    }
}

/// The output of a stubbed method: a single message, an error status or a stream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Output {
    /// JSON-encoded response message, decoded against the method's output type.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    /// Status message accompanying `code`.
    #[serde(default)]
    pub error: String,
    /// gRPC status code to fail the call with.
    #[serde(default)]
    pub code: Option<ErrorCode>,
    /// Response stream for server streaming methods.
    #[serde(default)]
    pub stream: Option<StreamOutput>,
}

impl Output {
    fn validate(&self) -> Result<(), String> {
        if self.data.is_none() && self.code.is_none() && self.error.is_empty() && self.stream.is_none()
        {
            return Err("output can't be empty".to_string());
        }
        match &self.stream {
            Some(stream) => stream.validate(),
            None => Ok(()),
        }
    }
}

/// An ordered sequence of response messages for a server streaming method.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamOutput {
    /// Messages emitted in array order.
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
    /// Status message for the terminal error, if any.
    #[serde(default)]
    pub error: String,
    /// Terminal status code emitted after the last message.
    #[serde(default)]
    pub code: Option<ErrorCode>,
    /// Pause between consecutive messages, in milliseconds.
    #[serde(default)]
    pub delay: u64,
}

impl StreamOutput {
    fn validate(&self) -> Result<(), String> {
        if self.data.is_empty() && self.code.is_none() && self.error.is_empty() {
            return Err("stream can't be empty".to_string());
        }
        Ok(())
    }
}

/// A gRPC status code, deserializable from either its numeric value or its
/// canonical upper snake case name (`5` or `"NOT_FOUND"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(pub tonic::Code);

impl From<ErrorCode> for tonic::Code {
    fn from(code: ErrorCode) -> Self {
        code.0
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct CodeVisitor;

        impl serde::de::Visitor<'_> for CodeVisitor {
            type Value = ErrorCode;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a numeric gRPC status code or its upper snake case name")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let code = i32::try_from(value)
                    .map_err(|_| E::custom(format!("status code {value} out of range")))?;
                Ok(ErrorCode(tonic::Code::from(code)))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let code = i32::try_from(value)
                    .map_err(|_| E::custom(format!("status code {value} out of range")))?;
                Ok(ErrorCode(tonic::Code::from(code)))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                code_from_name(value)
                    .map(ErrorCode)
                    .ok_or_else(|| E::custom(format!("unknown status code name '{value}'")))
            }
        }

        deserializer.deserialize_any(CodeVisitor)
    }
}

fn code_from_name(name: &str) -> Option<tonic::Code> {
    use tonic::Code;

    let code = match name {
        "OK" => Code::Ok,
        "CANCELLED" => Code::Cancelled,
        "UNKNOWN" => Code::Unknown,
        "INVALID_ARGUMENT" => Code::InvalidArgument,
        "DEADLINE_EXCEEDED" => Code::DeadlineExceeded,
        "NOT_FOUND" => Code::NotFound,
        "ALREADY_EXISTS" => Code::AlreadyExists,
        "PERMISSION_DENIED" => Code::PermissionDenied,
        "RESOURCE_EXHAUSTED" => Code::ResourceExhausted,
        "FAILED_PRECONDITION" => Code::FailedPrecondition,
        "ABORTED" => Code::Aborted,
        "OUT_OF_RANGE" => Code::OutOfRange,
        "UNIMPLEMENTED" => Code::Unimplemented,
        "INTERNAL" => Code::Internal,
        "UNAVAILABLE" => Code::Unavailable,
        "DATA_LOSS" => Code::DataLoss,
        "UNAUTHENTICATED" => Code::Unauthenticated,
        _ => return None,
    };
    Some(code)
}

/// Loads every `.json` stub file under `dir`, recursively.
///
/// The walk is sorted by file name so that duplicated `(service, method)` keys
/// resolve deterministically (last loaded wins).
pub fn load_dir(dir: impl AsRef<Path>) -> Result<Vec<ProtoStub>, StubLoadError> {
    let dir = dir.as_ref();
    let mut stubs = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|source| StubLoadError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension() != Some(OsStr::new("json")) {
            continue;
        }
        stubs.push(load_file(entry.path())?);
    }
    Ok(stubs)
}

fn load_file(path: &Path) -> Result<ProtoStub, StubLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| StubLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let stub: ProtoStub =
        serde_json::from_str(&contents).map_err(|source| StubLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    stub.validate().map_err(|reason| StubLoadError::Invalid {
        path: path.to_path_buf(),
        reason,
    })?;
    Ok(stub)
}
