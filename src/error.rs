//! Error types.
//!
//! Errors are layered the way a run is: a command reports a [`CommandError`],
//! the engine turns that into an [`ExecError`] naming the line, and the file
//! runner wraps that into a [`FileError`] naming the file.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Boxed error used at the user-supplied seams (Setup hooks, opaque command errors).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A malformed test file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{}: {source}", file.display())]
    Io {
        file: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}:{line}: bad line {text:?} (should begin with '#')", file.display())]
    BadLine {
        file: PathBuf,
        line: usize,
        text: String,
    },
}

/// A bad ` --> FAIL` annotation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandLineError {
    #[error("invalid FAIL exit code {0:?}")]
    InvalidExitCode(String),
    #[error("cannot use 0 as a FAIL exit code")]
    ZeroExitCode,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpandError {
    #[error("variable {name:?} not found")]
    Undefined { name: String },
}

/// An error a command can return to report an explicit exit code.
///
/// Only needed by commands whose failures don't already carry one. Errors
/// from spawned processes and from OS calls such as `chdir` have their own
/// codes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{msg} (code {code})")]
pub struct ExitCodeError {
    pub msg: String,
    pub code: i32,
}

/// Failure reported by a command implementation.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A spawned program exited unsuccessfully.
    #[error("{program} failed: {status}")]
    Exited { program: String, status: ExitStatus },

    /// An OS call on a path failed.
    #[error("{op} {}: {source}", path.display())]
    Os {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    ExitCode(#[from] ExitCodeError),

    /// The command was called incorrectly.
    #[error("{0}")]
    Usage(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<CommandError>,
    },

    #[error(transparent)]
    Other(BoxError),
}

impl CommandError {
    pub fn usage(msg: impl Into<String>) -> Self {
        CommandError::Usage(msg.into())
    }

    /// Wrap this error with a message, keeping its exit code reachable.
    pub fn context(self, context: impl Into<String>) -> Self {
        CommandError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Extract a numeric exit code, if the error carries one.
    ///
    /// Sources are tried in a fixed order: process exit status, OS error
    /// number, then [`ExitCodeError`].
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CommandError::Exited { status, .. } => status.code(),
            CommandError::Os { source, .. } | CommandError::Io(source) => source.raw_os_error(),
            CommandError::ExitCode(e) => Some(e.code),
            CommandError::Usage(_) => None,
            CommandError::Context { source, .. } => source.exit_code(),
            CommandError::Other(err) => exit_code_in_chain(err.as_ref()),
        }
    }
}

fn exit_code_in_chain(err: &(dyn std::error::Error + 'static)) -> Option<i32> {
    let chain = || std::iter::successors(Some(err), |e| e.source());
    if let Some(code) = chain()
        .filter_map(|e| e.downcast_ref::<io::Error>())
        .find_map(io::Error::raw_os_error)
    {
        return Some(code);
    }
    chain()
        .find_map(|e| e.downcast_ref::<ExitCodeError>())
        .map(|e| e.code)
}

/// A test case that did not run as its annotations said it would.
///
/// `line` is the 1-based line of the offending command.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{line}: {source}")]
    CommandLine {
        line: usize,
        #[source]
        source: CommandLineError,
    },
    #[error("{line}: {source}")]
    Expand {
        line: usize,
        #[source]
        source: ExpandError,
    },
    #[error("{line}: empty command")]
    EmptyCommand { line: usize },
    #[error("{line}: input file {name:?} must be in the current directory")]
    InputFile { line: usize, name: String },
    #[error("{line}: no such command {name:?}")]
    NoSuchCommand { line: usize, name: String },
    #[error("{line}: {command:?} succeeded, but it was expected to fail")]
    UnexpectedSuccess { line: usize, command: String },
    #[error("{line}: {command:?} failed with {source}")]
    UnexpectedFailure {
        line: usize,
        command: String,
        #[source]
        source: CommandError,
    },
    #[error("{line}: {command:?} failed without an exit code, but one was expected")]
    MissingExitCode { line: usize, command: String },
    #[error("{line}: {command:?} failed with exit code {got}, but {want} was expected")]
    ExitCodeMismatch {
        line: usize,
        command: String,
        got: i32,
        want: i32,
    },
}

/// Failure running or rewriting one test file.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("{}: {context}: {source}", file.display())]
    Io {
        file: PathBuf,
        context: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("{}: copying test files: {source}", file.display())]
    Fixtures {
        file: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}: calling Setup: {source}", file.display())]
    Setup {
        file: PathBuf,
        #[source]
        source: BoxError,
    },
    #[error(
        "{}:{line}: output line {text:?} starts with '$' and would read back as a command",
        file.display()
    )]
    OutputLooksLikeCommand {
        file: PathBuf,
        line: usize,
        text: String,
    },
    // No space after the colon: the case error starts with its line number.
    #[error("{}:{source}", file.display())]
    Case {
        file: PathBuf,
        #[source]
        source: ExecError,
    },
}

/// Failure loading a suite directory or its configuration.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("invalid YAML in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid TOML in {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
