use tracing::{debug, warn};

use crate::diagnostics::{line_column_from_offset, lines_around};
use crate::error::{ScriptError, TargetError};
use crate::parser::{Block, Script, Statement};

/// Lines of context shown on each side of a pinpointed failure.
const CONTEXT_LINES: usize = 5;

/// Connection a script runs against.
pub trait ScriptTarget {
    fn begin(&mut self) -> Result<(), TargetError>;

    fn execute(&mut self, statement: &str) -> Result<(), TargetError>;

    fn commit(&mut self) -> Result<(), TargetError>;

    fn rollback(&mut self) -> Result<(), TargetError>;

    /// Runs inside the whole-script transaction after the last statement.
    /// Not called when the script disables that transaction.
    fn before_commit(&mut self) -> Result<(), TargetError> {
        Ok(())
    }
}

impl Script {
    /// Run every statement against `target`.
    ///
    /// By default the whole script is one transaction. With `-- NOTX` each
    /// `TXBEGIN`/`TXEND` block commits on its own and statements outside
    /// blocks run without a transaction. Earlier blocks stay committed when
    /// a later one fails.
    pub fn execute<T: ScriptTarget + ?Sized>(&self, target: &mut T) -> Result<(), ScriptError> {
        if self.is_empty() {
            return Ok(());
        }
        if self.no_tx() {
            self.execute_segments(target)
        } else {
            self.execute_whole(target)
        }
    }

    fn execute_whole<T: ScriptTarget + ?Sized>(&self, target: &mut T) -> Result<(), ScriptError> {
        target.begin().map_err(ScriptError::Begin)?;
        for statement in self.statements() {
            if let Err(e) = target.execute(&statement.text) {
                roll_back(target);
                return Err(self.statement_error(statement, e));
            }
        }
        if let Err(e) = target.before_commit() {
            roll_back(target);
            return Err(ScriptError::Finalize(e));
        }
        if let Err(e) = target.commit() {
            // A failed COMMIT can leave the transaction open.
            roll_back(target);
            return Err(ScriptError::Commit(e));
        }
        Ok(())
    }

    fn execute_segments<T: ScriptTarget + ?Sized>(
        &self,
        target: &mut T,
    ) -> Result<(), ScriptError> {
        for segment in self.segments() {
            match segment.block {
                Some(block) => self.execute_block(target, block, &segment.statements)?,
                None => {
                    for statement in &segment.statements {
                        target
                            .execute(&statement.text)
                            .map_err(|e| self.statement_error(statement, e))?;
                    }
                }
            }
        }
        Ok(())
    }

    fn execute_block<T: ScriptTarget + ?Sized>(
        &self,
        target: &mut T,
        block: Block,
        statements: &[Statement],
    ) -> Result<(), ScriptError> {
        let Block { begin, end } = block;
        target.begin().map_err(ScriptError::Begin)?;
        for statement in statements {
            if let Err(e) = target.execute(&statement.text) {
                roll_back(target);
                return Err(ScriptError::Block {
                    begin,
                    end,
                    source: Box::new(self.statement_error(statement, e)),
                });
            }
        }
        if let Err(source) = target.commit() {
            roll_back(target);
            return Err(ScriptError::CommitBlock { begin, end, source });
        }
        debug!("committed lines {begin}-{end}");
        Ok(())
    }

    fn statement_error(&self, statement: &Statement, source: TargetError) -> ScriptError {
        let Some(offset) = source.offset() else {
            return ScriptError::Statement {
                line: statement.line,
                statement: statement.text.clone(),
                source,
            };
        };
        // The offset is into the statement text, which has no `\r`.
        let (within, column) = line_column_from_offset(&statement.text, offset);
        let line = statement.line + within - 1;
        ScriptError::StatementAt {
            line,
            column,
            excerpt: lines_around(self.source(), line, CONTEXT_LINES, CONTEXT_LINES, true),
            source,
        }
    }
}

fn roll_back<T: ScriptTarget + ?Sized>(target: &mut T) {
    if let Err(e) = target.rollback() {
        warn!("rollback failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records calls and fails statements containing a marker.
    #[derive(Default)]
    struct Recording {
        events: Vec<String>,
        fail_commit: bool,
        fail_offset: Option<usize>,
    }

    impl ScriptTarget for Recording {
        fn begin(&mut self) -> Result<(), TargetError> {
            self.events.push("begin".into());
            Ok(())
        }

        fn execute(&mut self, statement: &str) -> Result<(), TargetError> {
            if statement.contains("FAIL") {
                self.events.push("fail".into());
                let err = TargetError::new("no such table: missing");
                return Err(match self.fail_offset {
                    Some(offset) => err.at_offset(offset),
                    None => err,
                });
            }
            self.events.push(statement.to_string());
            Ok(())
        }

        fn commit(&mut self) -> Result<(), TargetError> {
            if self.fail_commit {
                return Err(TargetError::new("database is locked"));
            }
            self.events.push("commit".into());
            Ok(())
        }

        fn rollback(&mut self) -> Result<(), TargetError> {
            self.events.push("rollback".into());
            Ok(())
        }

        fn before_commit(&mut self) -> Result<(), TargetError> {
            self.events.push("record".into());
            Ok(())
        }
    }

    #[test]
    fn default_mode_wraps_everything_in_one_transaction() {
        let script = Script::parse("A;\nB;\n").unwrap();
        let mut target = Recording::default();
        script.execute(&mut target).unwrap();
        assert_eq!(target.events, vec!["begin", "A;", "B;", "record", "commit"]);
    }

    #[test]
    fn default_mode_failure_rolls_back_everything() {
        let script = Script::parse("A;\n\nFAIL;\nB;\n").unwrap();
        let mut target = Recording::default();
        let err = script.execute(&mut target).unwrap_err();
        assert_eq!(target.events, vec!["begin", "A;", "fail", "rollback"]);
        assert!(matches!(err, ScriptError::Statement { line: 3, .. }));
        assert_eq!(
            err.to_string(),
            "failed to exec statement at line 3: no such table: missing\nFAIL;"
        );
    }

    #[test]
    fn notx_failure_in_second_block_keeps_the_first() {
        let source = "\
-- TXBEGIN
A;
-- TXEND
-- TXBEGIN
B;
FAIL;
-- TXEND
C;
";
        let script = Script::parse(source).unwrap();
        let mut target = Recording::default();
        let err = script.execute(&mut target).unwrap_err();
        assert_eq!(
            target.events,
            vec!["begin", "A;", "commit", "begin", "B;", "fail", "rollback"]
        );
        match err {
            ScriptError::Block { begin, end, source } => {
                assert_eq!((begin, end), (4, 7));
                assert!(matches!(*source, ScriptError::Statement { line: 6, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn notx_runs_ungrouped_statements_without_transaction() {
        let script = Script::parse("-- NOTX\nA;\n-- TXBEGIN\nB;\n-- TXEND\nC;\n").unwrap();
        let mut target = Recording::default();
        script.execute(&mut target).unwrap();
        assert_eq!(
            target.events,
            vec!["A;", "begin", "B;", "commit", "C;"]
        );
    }

    #[test]
    fn notx_ungrouped_failure_reports_the_line() {
        let script = Script::parse("-- NOTX\nA;\nFAIL;\n").unwrap();
        let mut target = Recording::default();
        let err = script.execute(&mut target).unwrap_err();
        assert_eq!(err.line(), Some(3));
        assert_eq!(target.events, vec!["A;", "fail"]);
    }

    #[test]
    fn block_commit_failure_names_the_range() {
        let script = Script::parse("-- TXBEGIN\nA;\n-- TXEND\n").unwrap();
        let mut target = Recording {
            fail_commit: true,
            ..Default::default()
        };
        let err = script.execute(&mut target).unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to commit lines 1-3: database is locked"
        );
        assert_eq!(target.events, vec!["begin", "A;", "rollback"]);
    }

    #[test]
    fn whole_script_commit_failure_rolls_back() {
        let script = Script::parse("A;\nB;\n").unwrap();
        let mut target = Recording {
            fail_commit: true,
            ..Default::default()
        };
        let err = script.execute(&mut target).unwrap_err();
        assert!(matches!(err, ScriptError::Commit(_)));
        assert_eq!(target.events, vec!["begin", "A;", "B;", "record", "rollback"]);
    }

    #[test]
    fn reported_offset_becomes_line_and_column() {
        let script = Script::parse("A;\nSELECT *\nFROM FAIL;\n").unwrap();
        let mut target = Recording {
            fail_offset: Some(14),
            ..Default::default()
        };
        let err = script.execute(&mut target).unwrap_err();
        match err {
            ScriptError::StatementAt {
                line,
                column,
                excerpt,
                ..
            } => {
                assert_eq!((line, column), (3, 6));
                assert_eq!(excerpt, "1: A;\n2: SELECT *\n3: FROM FAIL;");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn reported_offset_ignores_crlf_line_endings() {
        let script = Script::parse("A;\r\nSELECT *\r\nFROM FAIL;\r\n").unwrap();
        let mut target = Recording {
            fail_offset: Some(14),
            ..Default::default()
        };
        match script.execute(&mut target).unwrap_err() {
            ScriptError::StatementAt { line, column, .. } => assert_eq!((line, column), (3, 6)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_script_touches_nothing() {
        let script = Script::parse("-- only comments\n").unwrap();
        let mut target = Recording::default();
        script.execute(&mut target).unwrap();
        assert!(target.events.is_empty());
    }
}
