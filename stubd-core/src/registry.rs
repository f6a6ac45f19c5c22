//! # Proto Registry
//!
//! This module builds the descriptor universe of a stub server: every `.proto` file
//! found under the proto directory is parsed at runtime and linked into a single
//! [`DescriptorPool`], from which services, methods and message types are resolved.
//!
//! ## How it works
//!
//! 1. The proto directory is walked recursively; files without a `.proto` extension
//!    are skipped. A file's identity is its path relative to the proto root, which is
//!    also the path its importers use.
//! 2. Each file is parsed into a `FileDescriptorProto` with `protox_parse`.
//! 3. Declared dependencies are registered *before* the file itself: linking needs
//!    every imported type to be resolvable, so registration order is a topological
//!    order of the import graph regardless of discovery order.
//!
//! The pool starts out as a copy of the global pool, so the well-known types
//! (`google/protobuf/*.proto`) are importable without being present on disk. The
//! registry is owned by one server instance; independent servers in the same
//! process never share descriptor state.
use prost_reflect::{DescriptorPool, ServiceDescriptor};
use prost_types::FileDescriptorSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Errors that can occur while loading and linking `.proto` files.
///
/// All of them are fatal at startup: a partially loaded descriptor universe cannot
/// safely serve any RPC.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to read proto file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse proto file '{file}': {source}")]
    Parse {
        file: String,
        source: protox_parse::ParseError,
    },
    #[error("failed to register descriptors from '{file}': {source}")]
    Link {
        file: String,
        source: prost_reflect::DescriptorError,
    },
    #[error("import cycle detected: {chain}")]
    ImportCycle { chain: String },
    #[error("failed to read proto directory '{path}': {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
}

/// A registry holding every parsed `.proto` file and the services it declares.
#[derive(Debug, Clone)]
pub struct ProtoRegistry {
    pool: DescriptorPool,
    /// Files currently being registered, used to detect import cycles.
    registering: Vec<String>,
}

impl Default for ProtoRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtoRegistry {
    pub fn new() -> Self {
        Self {
            // Seeded with the well-known types so imports of
            // google/protobuf/*.proto resolve without disk files.
            pool: DescriptorPool::global(),
            registering: Vec::new(),
        }
    }

    /// Walks `root` recursively and registers every `.proto` file found.
    pub fn load_dir(&mut self, root: impl AsRef<Path>) -> Result<(), RegistryError> {
        let root = root.as_ref();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|source| RegistryError::Walk {
                path: root.to_path_buf(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension() != Some(OsStr::new("proto")) {
                continue;
            }
            let name = match entry.path().strip_prefix(root) {
                Ok(relative) => proto_file_name(relative),
                Err(_) => continue,
            };
            self.register_file(root, &name)?;
        }
        Ok(())
    }

    /// Registers a single file, identified by its path relative to `root`.
    ///
    /// Idempotent: returns immediately if the file is already present in the pool.
    /// Otherwise the file is parsed, its dependencies are registered first, and the
    /// file itself is linked last.
    pub fn register_file(&mut self, root: &Path, name: &str) -> Result<(), RegistryError> {
        if self.pool.get_file_by_name(name).is_some() {
            return Ok(());
        }
        if let Some(position) = self.registering.iter().position(|pending| pending == name) {
            let mut chain: Vec<&str> = self.registering[position..]
                .iter()
                .map(String::as_str)
                .collect();
            chain.push(name);
            return Err(RegistryError::ImportCycle {
                chain: chain.join(" -> "),
            });
        }

        let path = root.join(name);
        let source = fs::read_to_string(&path).map_err(|source| RegistryError::Read {
            path: path.clone(),
            source,
        })?;
        let descriptor =
            protox_parse::parse(name, &source).map_err(|source| RegistryError::Parse {
                file: name.to_string(),
                source,
            })?;

        self.registering.push(name.to_string());
        let dependencies = descriptor
            .dependency
            .iter()
            .try_for_each(|dependency| self.register_file(root, dependency));
        self.registering.pop();
        dependencies?;

        self.pool
            .add_file_descriptor_proto(descriptor)
            .map_err(|source| RegistryError::Link {
                file: name.to_string(),
                source,
            })?;
        Ok(())
    }

    /// Looks up a service by its fully qualified name (e.g. `my.pkg.Service`).
    pub fn service(&self, name: &str) -> Option<ServiceDescriptor> {
        self.pool.get_service_by_name(name)
    }

    /// All services declared across the registered files.
    pub fn services(&self) -> impl Iterator<Item = ServiceDescriptor> + '_ {
        self.pool.services()
    }

    pub fn descriptor_pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// A `FileDescriptorSet` covering the whole pool, as consumed by the
    /// server reflection service.
    pub fn file_descriptor_set(&self) -> FileDescriptorSet {
        FileDescriptorSet {
            file: self
                .pool
                .files()
                .map(|file| file.file_descriptor_proto().clone())
                .collect(),
        }
    }
}

/// Converts a relative filesystem path into a proto file name. Import paths
/// always use forward slashes, independent of the host platform.
fn proto_file_name(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
