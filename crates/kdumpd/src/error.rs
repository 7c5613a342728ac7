//! Error types for kdumpd.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KdumpError>;

#[derive(Error, Debug)]
pub enum KdumpError {
    /// Malformed or out-of-range desired value
    #[error("configuration error: {0}")]
    Config(String),

    /// Crash dump index outside the current ordering
    #[error("index ({index}) out of range [{min}..{max}]")]
    Range { index: i32, min: i64, max: i64 },

    /// Several indices outside the current ordering
    #[error("bad crash dump indices {0:?}")]
    BadIndices(Vec<i32>),

    /// Service manager reported a non-success job result
    #[error("failed to {action} unit {unit}: result={result}")]
    Service {
        action: &'static str,
        unit: String,
        result: String,
    },

    /// External tool could not be run or exited non-zero
    #[error("{program} failed: {detail}")]
    Command { program: String, detail: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: no such file", .0.display())]
    NotFound(PathBuf),

    #[error("{}: not a regular file", .0.display())]
    NotRegular(PathBuf),

    #[error("{}: zero sized file", .0.display())]
    Empty(PathBuf),

    #[error("cache error: {0}")]
    Cache(#[from] serde_json::Error),

    /// Independent failures collected during one reconciliation
    #[error("{}", Causes(.0))]
    Combined(Vec<KdumpError>),
}

impl KdumpError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        KdumpError::Io {
            context: context.into(),
            source,
        }
    }

    /// JSON-RPC error code reported to callers
    pub fn code(&self) -> i32 {
        match self {
            KdumpError::Config(_) => -32010,
            KdumpError::Range { .. } | KdumpError::BadIndices(_) => -32011,
            KdumpError::Service { .. } => -32012,
            KdumpError::Command { .. } => -32013,
            KdumpError::Io { .. } => -32014,
            KdumpError::NotFound(_) | KdumpError::NotRegular(_) | KdumpError::Empty(_) => -32015,
            KdumpError::Cache(_) => -32016,
            KdumpError::Combined(_) => -32017,
        }
    }

    /// Fold collected failures: none is success, one is returned as is
    pub fn combine(mut errors: Vec<KdumpError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(KdumpError::Combined(errors)),
        }
    }
}

struct Causes<'a>(&'a [KdumpError]);

impl fmt::Display for Causes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}
