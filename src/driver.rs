//! The read loop: parse one top-level form at a time, generate it, report.

use std::io::{self, BufRead, Write};

use tracing::{debug, error};

use crate::ast::ASTNode;
use crate::backend::Backend;
use crate::codegen::Codegen;
use crate::lexer::Token;
use crate::parser::Parser;

/// Characters of a buffered reader, pulled a line at a time so an
/// interactive session is lexed as it is typed.
pub struct ReaderChars<R> {
    reader: R,
    buffer: std::vec::IntoIter<char>,
}

impl<R: BufRead> ReaderChars<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::new().into_iter(),
        }
    }
}

impl<R: BufRead> Iterator for ReaderChars<R> {
    type Item = char;

    fn next(&mut self) -> Option<char> {
        loop {
            if let Some(c) = self.buffer.next() {
                return Some(c);
            }

            let mut line = String::new();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => self.buffer = line.chars().collect::<Vec<_>>().into_iter(),
                Err(err) => {
                    error!("failed to read input: {}", err);
                    return None;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DriverOptions {
    /// print `ready> ` before each form
    pub prompt: bool,
    /// print the parsed AST instead of generating code
    pub dump_ast: bool,
}

/// Counts of top-level forms handled by a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Report {
    pub generated: usize,
    pub failed: usize,
}

pub struct Driver<I: Iterator<Item = char>, B: Backend> {
    pub parser: Parser<I>,
    pub codegen: Codegen<B>,
    options: DriverOptions,
}

impl<I: Iterator<Item = char>, B: Backend> Driver<I, B> {
    pub fn new(parser: Parser<I>, codegen: Codegen<B>, options: DriverOptions) -> Self {
        Self {
            parser,
            codegen,
            options,
        }
    }

    /// Runs until the end of input, then writes the whole module.
    pub fn run<W: Write>(&mut self, out: &mut W) -> io::Result<Report> {
        let mut report = Report::default();

        loop {
            if self.options.prompt {
                write!(out, "ready> ")?;
                out.flush()?;
            }

            match self.parser.parse_top_level() {
                Some(Ok(node)) => {
                    if self.handle(&node, out)? {
                        report.generated += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Some(Err(err)) => {
                    error!("{}", err);
                    report.failed += 1;
                    debug!(token = %self.parser.current(), "skipping token");
                    self.parser.advance();
                }
                None if *self.parser.current() == Token::Eof => break,
                None => {
                    self.parser.advance();
                }
            }
        }

        if self.options.prompt {
            writeln!(out)?;
        }
        if !self.options.dump_ast {
            write!(out, "{}", self.codegen.backend.print_module())?;
        }
        Ok(report)
    }

    fn handle<W: Write>(&mut self, node: &ASTNode, out: &mut W) -> io::Result<bool> {
        if self.options.dump_ast {
            writeln!(out, "{}", node)?;
            return Ok(true);
        }

        match self.codegen.codegen(node) {
            Ok(func) => {
                let label = match node {
                    ASTNode::Extern(_) => "Parsed an extern.",
                    ASTNode::Function(func) if func.is_anonymous() => {
                        "Parsed a top-level expression."
                    }
                    ASTNode::Function(_) => "Parsed a function definition.",
                };
                writeln!(out, "{}", label)?;
                write!(out, "{}", self.codegen.backend.print_function(func))?;
                Ok(true)
            }
            Err(err) => {
                error!("{}", err);
                Ok(false)
            }
        }
    }
}
