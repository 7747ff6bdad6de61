//! Line-oriented migration scripts with transaction directives.
//!
//! A script is split into `;`-terminated statements. Comment directives
//! control transactions:
//!
//! * `-- NOTX` before the first statement runs the file without the
//!   default whole-file transaction;
//! * `-- TXBEGIN` / `-- TXEND` wrap a block in its own transaction and imply
//!   `-- NOTX` for everything outside the blocks.

pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod parser;

pub use diagnostics::{line_column_from_offset, lines_around};
pub use error::{ScriptError, TargetError};
pub use executor::ScriptTarget;
pub use parser::{Block, Directive, Script, Segment, Statement};
