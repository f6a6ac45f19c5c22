//! # CLI
//!
//! Command-line interface of `stubd`, defined with `clap`. All values are
//! handed to the core as plain parameters.
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "stubd",
    version,
    about = "Serve canned gRPC and HTTP responses from stub files"
)]
pub struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:50051")]
    pub address: String,

    /// Path to the directory containing .proto files
    #[arg(long)]
    pub proto: Option<PathBuf>,

    /// Path to the directory containing gRPC stub files
    #[arg(long, requires = "proto")]
    pub stubs: Option<PathBuf>,

    /// Path to the directory containing HTTP stub files
    #[arg(long)]
    pub http: Option<PathBuf>,

    /// Path to the TLS certificate
    #[arg(long, requires = "key")]
    pub cert: Option<PathBuf>,

    /// Path to the TLS certificate key
    #[arg(long, requires = "cert")]
    pub key: Option<PathBuf>,
}
