// mro — Martian pipeline language front end
//
// Library root. Parses MRO source into an `Ast` and prints it back in
// canonical form.

pub mod ast;
pub mod check;
pub mod comments;
pub mod diag;
pub mod export;
pub mod format;
pub mod frontend;
pub mod intern;
pub mod lexer;
pub mod literal;
pub mod parser;
pub mod registry;
pub mod source;
pub mod toposort;
pub mod validate;

pub use diag::{Error, Result};
