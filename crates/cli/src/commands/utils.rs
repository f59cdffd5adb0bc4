use std::fmt;

use serde_json::Value;
use tandem_core::{rpc::RpcError, HarnessError};

/// Command failures, grouped by what the user should look at.
#[derive(Debug)]
pub enum CliError {
    /// `tandem.toml`, a node's `liquid.conf`, or a template.
    Settings(String),
    /// Filesystem or process spawning.
    Io(String),
    /// A node answered badly or not at all.
    Rpc(String),
    UnknownNode(String),
    Other(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Settings(msg) => write!(f, "Settings error: {msg}"),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Rpc(msg) => write!(f, "RPC error: {msg}"),
            Self::UnknownNode(name) => write!(f, "No node named `{name}` in settings"),
            Self::Other(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(format!("cannot render result: {err}"))
    }
}

impl From<HarnessError> for CliError {
    fn from(error: HarnessError) -> Self {
        match error {
            HarnessError::Config(_)
            | HarnessError::Settings(_)
            | HarnessError::InvalidSettings(_) => Self::Settings(error.to_string()),
            HarnessError::Rpc(_) => Self::Rpc(error.to_string()),
            HarnessError::Io(_) | HarnessError::Spawn { .. } => Self::Io(error.to_string()),
            _ => Self::Other(error.to_string()),
        }
    }
}

impl From<RpcError> for CliError {
    fn from(error: RpcError) -> Self {
        Self::Rpc(error.to_string())
    }
}

pub type CliResult<T> = Result<T, CliError>;

pub fn print_success(message: &str) {
    println!("[SUCCESS] {message}");
}

pub fn print_error(message: &str) {
    eprintln!("[ERROR] {message}");
}

pub fn print_info(message: &str) {
    println!("[INFO] {message}");
}

/// Parses a command-line RPC parameter as JSON, falling back to a plain string.
///
/// `10` becomes a number and `true` a boolean, while `abc` (not valid JSON) is sent as
/// the string `"abc"`.
pub fn parse_param(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
