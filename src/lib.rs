//! Front-end for the jlang expression language: lexing, parsing and code
//! generation against a pluggable backend.

pub mod ast;
pub mod backend;
pub mod codegen;
pub mod driver;
pub mod lexer;
pub mod parser;
