//! Error kinds for schema construction, compilation, and (de)serialization.

use std::fmt;

use thiserror::Error;

/// One element of the traversal path attached to an error as it propagates
/// out of nested `decode`/`encode` calls.
#[derive(Debug, Clone)]
pub enum PathElem {
    Field(String),
    Index(usize),
    Program(&'static str),
}

impl fmt::Display for PathElem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElem::Field(name) => write!(f, ".{name}"),
            PathElem::Index(i) => write!(f, "[{i}]"),
            PathElem::Program(hook) => write!(f, "<{hook}>"),
        }
    }
}

fn fmt_path(path: &[PathElem]) -> String {
    if path.is_empty() {
        return String::new();
    }
    let mut s = String::from(" while coding ");
    for elem in path.iter().rev() {
        use std::fmt::Write;
        let _ = write!(s, "{elem}");
    }
    s
}

/// Errors produced by schema construction, field program compilation and
/// execution, and the decode/encode state machines.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A schema violated one of its structural invariants.
    #[error("invalid schema: {message}")]
    SchemaInvariant { message: String },

    /// The underlying stream failed.
    #[error("io error{}: {source}", fmt_path(.path))]
    Io {
        #[source]
        source: std::io::Error,
        path: Vec<PathElem>,
    },

    /// A field program failed to parse or compile.
    #[error("program compile error: {message}")]
    ProgramCompile { message: String },

    /// A field program failed during execution.
    #[error("program runtime error{}: {message}", fmt_path(.path))]
    ProgramRuntime { message: String, path: Vec<PathElem> },

    /// A `type` program resolved to a name absent from the `Types` registry.
    #[error("unknown type {name:?}{}", fmt_path(.path))]
    TypeResolution { name: String, path: Vec<PathElem> },

    /// The dispatcher reached a kind it cannot handle.
    #[error("unsupported kind{}: {message}", fmt_path(.path))]
    Unsupported { message: String, path: Vec<PathElem> },
}

impl CodecError {
    pub fn schema_invariant(message: impl Into<String>) -> Self {
        CodecError::SchemaInvariant { message: message.into() }
    }

    pub fn program_compile(message: impl Into<String>) -> Self {
        CodecError::ProgramCompile { message: message.into() }
    }

    pub fn program_runtime(message: impl Into<String>) -> Self {
        CodecError::ProgramRuntime { message: message.into(), path: Vec::new() }
    }

    pub fn type_resolution(name: impl Into<String>) -> Self {
        CodecError::TypeResolution { name: name.into(), path: Vec::new() }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        CodecError::Unsupported { message: message.into(), path: Vec::new() }
    }

    /// Returns true if this is an IO error whose cause is end-of-file.
    ///
    /// `Slice`-mode `EOF` catches exactly this to terminate a growing slice.
    pub fn is_eof(&self) -> bool {
        matches!(
            self,
            CodecError::Io { source, .. } if source.kind() == std::io::ErrorKind::UnexpectedEof
        )
    }

    /// Push a path element onto an error as it unwinds out of a nested
    /// decode/encode call, so the caller sees the full traversal path.
    pub fn with_context(mut self, elem: PathElem) -> Self {
        match &mut self {
            CodecError::Io { path, .. }
            | CodecError::ProgramRuntime { path, .. }
            | CodecError::TypeResolution { path, .. }
            | CodecError::Unsupported { path, .. } => path.push(elem),
            CodecError::SchemaInvariant { .. } | CodecError::ProgramCompile { .. } => {}
        }
        self
    }
}

impl From<std::io::Error> for CodecError {
    fn from(source: std::io::Error) -> Self {
        CodecError::Io { source, path: Vec::new() }
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Attach a path element to any error a fallible expression produces.
macro_rules! ctx {
    ($expr:expr, $elem:expr) => {
        ($expr).map_err(|e: $crate::error::CodecError| e.with_context($elem))
    };
}
pub(crate) use ctx;

macro_rules! bail {
    (schema, $($t:tt)*) => {
        return Err($crate::error::CodecError::schema_invariant(format!($($t)*)))
    };
    (compile, $($t:tt)*) => {
        return Err($crate::error::CodecError::program_compile(format!($($t)*)))
    };
    (runtime, $($t:tt)*) => {
        return Err($crate::error::CodecError::program_runtime(format!($($t)*)))
    };
    (unsupported, $($t:tt)*) => {
        return Err($crate::error::CodecError::unsupported(format!($($t)*)))
    };
}
pub(crate) use bail;

macro_rules! ensure {
    ($cond:expr, $kind:ident, $($t:tt)*) => {
        if !($cond) {
            $crate::error::bail!($kind, $($t)*);
        }
    };
}
pub(crate) use ensure;
