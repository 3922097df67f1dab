use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the tuning engine.
///
/// Configuration variants abort before any generation starts; evaluation
/// variants abort the whole search (no per-candidate retry policy exists);
/// persistence variants leave the previous leaderboard intact thanks to the
/// temp-file + rename rewrite.
#[derive(Debug, Error)]
pub enum TuneError {
    /// Configuration is invalid or inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The testcase directory holds no usable sample files.
    #[error("no testcases found in {dir}")]
    NoTestcases {
        /// Directory that was scanned
        dir: PathBuf,
    },

    /// A testcase file holds fewer samples than the configured length.
    #[error("testcase {name} holds {got} samples, {need} required")]
    ShortTestcase {
        /// Testcase source identifier
        name: String,
        /// Samples present in the file
        got: usize,
        /// Samples required by the configuration
        need: usize,
    },

    /// The filter could not process a candidate's parameters.
    #[error("filter rejected parameters: {0}")]
    Filter(String),

    /// An external collaborator could not be started.
    #[error("failed to spawn {command}: {source}")]
    CollaboratorSpawn {
        /// Collaborator program name
        command: String,
        /// Underlying spawn failure
        #[source]
        source: std::io::Error,
    },

    /// An external collaborator terminated with a non-zero status.
    #[error("{command} exited with code {code}")]
    CollaboratorFailed {
        /// Collaborator program name
        command: String,
        /// Exit code, or -1 when killed by a signal
        code: i32,
    },

    /// The decoder diagnostics did not contain all six stage counters.
    #[error("decoder diagnostics held {found} of 6 expected counters")]
    MalformedStats {
        /// Counters that were successfully parsed
        found: usize,
    },

    /// A leaderboard record could not be parsed.
    #[error("unreadable leaderboard record: {0}")]
    Record(#[from] serde_json::Error),

    /// An I/O operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` for tuning operations.
pub type Result<T> = std::result::Result<T, TuneError>;
