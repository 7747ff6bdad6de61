use std::fmt;

use crate::error::ScriptError;

/// Transaction directive written as a `-- NAME` comment line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    NoTx,
    TxBegin,
    TxEnd,
}

impl Directive {
    fn parse(line: &str) -> Option<Self> {
        let rest = line.trim().strip_prefix("--")?.trim();
        match rest {
            "NOTX" => Some(Self::NoTx),
            "TXBEGIN" => Some(Self::TxBegin),
            "TXEND" => Some(Self::TxEnd),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoTx => "NOTX",
            Self::TxBegin => "TXBEGIN",
            Self::TxEnd => "TXEND",
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// 1-based line of the statement's first line.
    pub line: usize,
    /// Byte offset of that line in the script.
    pub offset: usize,
    pub text: String,
}

/// Lines of the `TXBEGIN` and `TXEND` directives around a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub begin: usize,
    pub end: usize,
}

/// A run of statements: an explicit transaction block, or statements
/// outside any block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub block: Option<Block>,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    source: String,
    no_tx: bool,
    segments: Vec<Segment>,
}

impl Script {
    pub fn parse(source: &str) -> Result<Self, ScriptError> {
        Parser::default().run(source)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the default whole-script transaction is disabled.
    pub fn no_tx(&self) -> bool {
        self.no_tx
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn statements(&self) -> impl Iterator<Item = &Statement> {
        self.segments.iter().flat_map(|s| s.statements.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.statements().next().is_none()
    }
}

#[derive(Default)]
struct Parser {
    no_tx: bool,
    seen_statement: bool,
    segments: Vec<Segment>,
    /// Line of the open `TXBEGIN` and the statements collected so far.
    block: Option<(usize, Vec<Statement>)>,
    current: Option<Statement>,
}

impl Parser {
    fn run(mut self, source: &str) -> Result<Script, ScriptError> {
        let mut offset = 0;
        for (idx, raw) in source.split('\n').enumerate() {
            self.line(idx + 1, offset, raw)?;
            offset += raw.len() + 1;
        }

        if let Some(statement) = self.current.take() {
            self.push(statement);
        }
        if let Some((begin, _)) = self.block {
            return Err(ScriptError::Unterminated { begin });
        }

        Ok(Script {
            source: source.to_string(),
            no_tx: self.no_tx,
            segments: self.segments,
        })
    }

    fn line(&mut self, line: usize, offset: usize, raw: &str) -> Result<(), ScriptError> {
        let text = raw.strip_suffix('\r').unwrap_or(raw);

        if let Some(statement) = self.current.as_mut() {
            statement.text.push('\n');
            statement.text.push_str(text);
            if text.trim_end().ends_with(';') {
                if let Some(done) = self.current.take() {
                    self.push(done);
                }
            }
            return Ok(());
        }

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(());
        }

        if let Some(directive) = Directive::parse(trimmed) {
            return self.directive(directive, line);
        }
        if trimmed.starts_with("--") {
            return Ok(());
        }

        self.seen_statement = true;
        let statement = Statement {
            line,
            offset,
            text: text.to_string(),
        };
        if text.trim_end().ends_with(';') {
            self.push(statement);
        } else {
            self.current = Some(statement);
        }
        Ok(())
    }

    fn directive(&mut self, directive: Directive, line: usize) -> Result<(), ScriptError> {
        match directive {
            Directive::NoTx if self.block.is_some() => {
                Err(ScriptError::UnexpectedDirective { directive, line })
            }
            Directive::NoTx if self.seen_statement => {
                Err(ScriptError::NotxAfterStatement { line })
            }
            Directive::NoTx => {
                self.no_tx = true;
                Ok(())
            }
            Directive::TxBegin if self.block.is_some() => {
                Err(ScriptError::UnexpectedDirective { directive, line })
            }
            Directive::TxBegin => {
                self.no_tx = true;
                self.block = Some((line, Vec::new()));
                Ok(())
            }
            Directive::TxEnd => {
                let (begin, statements) = self
                    .block
                    .take()
                    .ok_or(ScriptError::UnexpectedDirective { directive, line })?;
                self.segments.push(Segment {
                    block: Some(Block { begin, end: line }),
                    statements,
                });
                Ok(())
            }
        }
    }

    fn push(&mut self, statement: Statement) {
        if let Some((_, statements)) = self.block.as_mut() {
            statements.push(statement);
            return;
        }
        match self.segments.last_mut() {
            Some(segment) if segment.block.is_none() => segment.statements.push(statement),
            _ => self.segments.push(Segment {
                block: None,
                statements: vec![statement],
            }),
        }
    }
}
