//! Surface syntax: text to tree and back.

pub mod lines;
pub mod parser;
pub mod unparse;

pub use parser::{parse_expr, parse_module, parse_statement};
pub use unparse::{unparse_expr, unparse_module, unparse_stmt, unparse_stmts};
