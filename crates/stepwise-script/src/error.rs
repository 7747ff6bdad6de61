use std::fmt;

use thiserror::Error;

use crate::parser::Directive;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure reported by a [`ScriptTarget`](crate::ScriptTarget).
///
/// `offset` is the byte offset of the problem inside the statement text,
/// when the store reports one.
#[derive(Debug)]
pub struct TargetError {
    source: BoxError,
    offset: Option<usize>,
}

impl TargetError {
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self {
            source: source.into(),
            offset: None,
        }
    }

    pub fn at_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn offset(&self) -> Option<usize> {
        self.offset
    }
}

impl fmt::Display for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.source.fmt(f)
    }
}

impl std::error::Error for TargetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("unexpected `-- {directive}` at line {line}")]
    UnexpectedDirective { directive: Directive, line: usize },

    #[error("`-- NOTX` at line {line} must come before the first statement")]
    NotxAfterStatement { line: usize },

    #[error("`-- TXBEGIN` at line {begin} has no matching `-- TXEND`")]
    Unterminated { begin: usize },

    #[error("failed to exec statement at line {line}: {source}\n{statement}")]
    Statement {
        line: usize,
        statement: String,
        #[source]
        source: TargetError,
    },

    /// Like `Statement`, with the position the store pointed at.
    #[error("failed to exec statement at line {line}, column {column}: {source}\n\n{excerpt}")]
    StatementAt {
        line: usize,
        column: usize,
        excerpt: String,
        #[source]
        source: TargetError,
    },

    #[error("transaction at lines {begin}-{end} rolled back: {source}")]
    Block {
        begin: usize,
        end: usize,
        #[source]
        source: Box<ScriptError>,
    },

    #[error("failed to begin transaction: {0}")]
    Begin(#[source] TargetError),

    #[error("failed to finalize script: {0}")]
    Finalize(#[source] TargetError),

    #[error("failed to commit script: {0}")]
    Commit(#[source] TargetError),

    #[error("failed to commit lines {begin}-{end}: {source}")]
    CommitBlock {
        begin: usize,
        end: usize,
        #[source]
        source: TargetError,
    },
}

impl ScriptError {
    /// 1-based script line the error points at, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::UnexpectedDirective { line, .. }
            | Self::NotxAfterStatement { line }
            | Self::Statement { line, .. }
            | Self::StatementAt { line, .. } => Some(*line),
            Self::Unterminated { begin } => Some(*begin),
            Self::Block { source, .. } => source.line(),
            Self::CommitBlock { begin, .. } => Some(*begin),
            Self::Begin(_) | Self::Finalize(_) | Self::Commit(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_error_displays_its_source() {
        let e = TargetError::new("near \"CREAT\": syntax error").at_offset(4);
        assert_eq!(e.to_string(), "near \"CREAT\": syntax error");
        assert_eq!(e.offset(), Some(4));
    }

    #[test]
    fn block_error_reports_the_failing_line() {
        let e = ScriptError::Block {
            begin: 3,
            end: 7,
            source: Box::new(ScriptError::Statement {
                line: 5,
                statement: "INSERT INTO t VALUES (1);".into(),
                source: TargetError::new("constraint failed"),
            }),
        };
        assert_eq!(e.line(), Some(5));
        assert_eq!(
            e.to_string(),
            "transaction at lines 3-7 rolled back: failed to exec statement at line 5: constraint failed\nINSERT INTO t VALUES (1);"
        );
    }
}
