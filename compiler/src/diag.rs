// diag.rs — Error taxonomy for the MRO front end
//
// Every failure the front end can report, each with a stable diagnostic code.
// Parsing is all-or-nothing: the first error aborts and no partial AST is
// returned.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0001`).
///
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    pub const LEX: DiagCode = DiagCode("E0001");
    pub const PARSE: DiagCode = DiagCode("E0002");
    pub const DUPLICATE_IDENTIFIER: DiagCode = DiagCode("E0100");
    pub const CYCLIC_INCLUDE: DiagCode = DiagCode("E0200");
    pub const INCLUDE_NOT_FOUND: DiagCode = DiagCode("E0201");
    pub const UNRESOLVED_REFERENCE: DiagCode = DiagCode("E0300");
    pub const IO: DiagCode = DiagCode("E0900");
    pub const REWRITE: DiagCode = DiagCode("E0901");
}

// ── Error ────────────────────────────────────────────────────────────────

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid character or unterminated literal.
    #[error("{file}:{line}: {message}")]
    Lex {
        file: String,
        line: u32,
        message: String,
    },

    /// Grammar violation. Only the first one is ever reported.
    #[error("{file}:{line}: unexpected {found}, expected {expected}")]
    Parse {
        file: String,
        line: u32,
        expected: String,
        found: String,
    },

    /// Two callables, calls, parameters or bindings share an identifier.
    #[error("{file}:{line}: duplicate {kind} '{id}'")]
    DuplicateIdentifier {
        file: String,
        line: u32,
        kind: &'static str,
        id: String,
    },

    /// A file transitively includes itself. `chain` starts and ends with it.
    #[error("{file}:{line}: include cycle: {}", .chain.join(" -> "))]
    CyclicInclude {
        file: String,
        line: u32,
        chain: Vec<String>,
    },

    #[error("{file}:{line}: cannot find include '{include}' (searched {})", display_paths(.searched))]
    IncludeNotFound {
        file: String,
        line: u32,
        include: String,
        searched: Vec<PathBuf>,
    },

    /// A reference names a call, input, output or callable not in scope.
    #[error("{file}:{line}: unresolved reference '{reference}'")]
    UnresolvedReference {
        file: String,
        line: u32,
        reference: String,
    },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failure reported by an include-path rewrite collaborator.
    #[error("include rewrite failed: {0}")]
    Rewrite(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Stable code for this error.
    pub fn code(&self) -> DiagCode {
        match self {
            Error::Lex { .. } => codes::LEX,
            Error::Parse { .. } => codes::PARSE,
            Error::DuplicateIdentifier { .. } => codes::DUPLICATE_IDENTIFIER,
            Error::CyclicInclude { .. } => codes::CYCLIC_INCLUDE,
            Error::IncludeNotFound { .. } => codes::INCLUDE_NOT_FOUND,
            Error::UnresolvedReference { .. } => codes::UNRESOLVED_REFERENCE,
            Error::Io { .. } => codes::IO,
            Error::Rewrite(_) => codes::REWRITE,
        }
    }

    /// Line the error points at, when it has one.
    pub fn line(&self) -> Option<u32> {
        match self {
            Error::Lex { line, .. }
            | Error::Parse { line, .. }
            | Error::DuplicateIdentifier { line, .. }
            | Error::CyclicInclude { line, .. }
            | Error::IncludeNotFound { line, .. }
            | Error::UnresolvedReference { line, .. } => Some(*line),
            Error::Io { .. } | Error::Rewrite(_) => None,
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "nothing".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display() {
        let e = Error::Parse {
            file: "p.mro".into(),
            line: 3,
            expected: "'('".into(),
            found: "'{'".into(),
        };
        assert_eq!(e.to_string(), "p.mro:3: unexpected '{', expected '('");
        assert_eq!(e.code(), codes::PARSE);
        assert_eq!(e.line(), Some(3));
    }

    #[test]
    fn cyclic_include_display() {
        let e = Error::CyclicInclude {
            file: "a.mro".into(),
            line: 1,
            chain: vec!["a.mro".into(), "b.mro".into(), "a.mro".into()],
        };
        assert_eq!(
            e.to_string(),
            "a.mro:1: include cycle: a.mro -> b.mro -> a.mro"
        );
    }

    #[test]
    fn io_error_has_no_line() {
        let e = Error::Io {
            path: PathBuf::from("/nope.mro"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert_eq!(e.line(), None);
        assert_eq!(e.code(), DiagCode("E0900"));
        assert!(e.to_string().starts_with("/nope.mro: "));
    }
}
