//! The embedded scripting language: lexer, expression evaluator, directive
//! tree, executor, and hook table.
//!
//! A macro is a buffer of source lines. On first execution the lines parse
//! into a [`parser::Program`] tree (`If`/`Loop`/`Break`/`Return` nodes with
//! pre-resolved structure); the tree is cached against the buffer's edit
//! version so later executions skip the compile. The executor evaluates
//! statements over [`core_datum::Datum`] values and reaches back into the
//! editor through the [`CommandHost`] trait for every command, function, or
//! macro call.

pub mod exec;
pub mod hooks;
pub mod lexer;
pub mod parser;

pub use exec::{CommandHost, Frame, Interp};
pub use hooks::{HOOK_COUNT, HookKind, HookTable};
pub use parser::{Expr, LoopKind, Program, Stmt, parse_expr_line, parse_program};
