use std::collections::HashMap;

use tracing::trace;

use crate::ast::{ASTNode, Expression, Function, Prototype};
use crate::lexer::{Lexer, Token};

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum ParserError {
    #[error("unknown token {0} when expecting an expression")]
    ExpectedExpression(Token),
    #[error("expected ')' but found {0}")]
    ExpectedCloseParen(Token),
    #[error("expected ')' or ',' in argument list but found {0}")]
    ExpectedArgumentSeparator(Token),
    #[error("expected function name in prototype but found {0}")]
    ExpectedFunctionName(Token),
    #[error("expected '(' in prototype but found {0}")]
    ExpectedPrototypeOpenParen(Token),
    #[error("expected ')' in prototype but found {0}")]
    ExpectedPrototypeCloseParen(Token),
}

pub type ParseResult<T> = Result<T, ParserError>;

pub type PartialParseResult = ParseResult<Expression>;

/// Recursive descent parser with one token of lookahead.
pub struct Parser<I: Iterator<Item = char>> {
    lexer: Lexer<I>,
    current: Token,
    pub operator_precedence: HashMap<char, i32>,
}

impl<'a> Parser<std::str::Chars<'a>> {
    pub fn from_source(source: &'a str) -> Self {
        Self::new(Lexer::new(source.chars()))
    }
}

impl<I: Iterator<Item = char>> Parser<I> {
    /// Builds a parser with the default operator table and reads the first
    /// token.
    pub fn new(lexer: Lexer<I>) -> Self {
        let mut operator_precedence = HashMap::new();
        operator_precedence.insert('<', 10);
        operator_precedence.insert('+', 20);
        operator_precedence.insert('-', 20);
        operator_precedence.insert('*', 40);

        let mut parser = Self {
            lexer,
            current: Token::Eof,
            operator_precedence,
        };
        parser.advance();
        parser
    }

    pub fn with_operator(mut self, op: char, precedence: i32) -> Self {
        self.operator_precedence.insert(op, precedence);
        self
    }

    pub fn current(&self) -> &Token {
        &self.current
    }

    pub fn advance(&mut self) -> &Token {
        self.current = self.lexer.next_token();
        trace!(token = %self.current, "advanced");
        &self.current
    }

    /// the current token as a binary operator with its precedence
    fn binary_operator(&self) -> Option<(char, i32)> {
        match self.current {
            Token::Char(op) if op.is_ascii() => match self.operator_precedence.get(&op) {
                Some(&precedence) if precedence > 0 => Some((op, precedence)),
                _ => None,
            },
            _ => None,
        }
    }

    fn token_precedence(&self) -> i32 {
        self.binary_operator().map_or(-1, |(_, precedence)| precedence)
    }

    fn parse_number(&mut self, value: f64) -> PartialParseResult {
        self.advance();
        Ok(Expression::Number(value))
    }

    fn parse_nested(&mut self) -> PartialParseResult {
        self.advance();
        let res = self.parse_expression()?;
        if self.current != Token::Char(')') {
            return Err(ParserError::ExpectedCloseParen(self.current.clone()));
        }
        self.advance();
        Ok(res)
    }

    fn parse_identifier(&mut self, ident: String) -> PartialParseResult {
        self.advance();
        if self.current != Token::Char('(') {
            return Ok(Expression::Variable(ident));
        }
        self.advance();

        let mut args = Vec::new();
        if self.current != Token::Char(')') {
            loop {
                args.push(self.parse_expression()?);

                match self.current {
                    Token::Char(')') => break,
                    Token::Char(',') => {
                        self.advance();
                    }
                    _ => {
                        return Err(ParserError::ExpectedArgumentSeparator(
                            self.current.clone(),
                        ))
                    }
                }
            }
        }
        self.advance();

        Ok(Expression::Call {
            callee: ident,
            args,
        })
    }

    fn parse_primary(&mut self) -> PartialParseResult {
        match self.current.clone() {
            Token::Number(value) => self.parse_number(value),
            Token::Ident(ident) => self.parse_identifier(ident),
            Token::Char('(') => self.parse_nested(),
            tok => Err(ParserError::ExpectedExpression(tok)),
        }
    }

    /// Folds `(op primary)*` onto `lhs` while the operators bind at least as
    /// tightly as `expr_precedence`.
    pub fn parse_binary_rhs(&mut self, expr_precedence: i32, lhs: Expression) -> PartialParseResult {
        let mut result = lhs;

        loop {
            let (op, precedence) = match self.binary_operator() {
                Some((op, precedence)) if precedence >= expr_precedence => (op, precedence),
                _ => return Ok(result),
            };
            self.advance();

            let mut rhs = self.parse_primary()?;

            if precedence < self.token_precedence() {
                rhs = self.parse_binary_rhs(precedence + 1, rhs)?;
            }

            result = Expression::binary(op, result, rhs);
        }
    }

    pub fn parse_expression(&mut self) -> PartialParseResult {
        let lhs = self.parse_primary()?;
        self.parse_binary_rhs(0, lhs)
    }

    /// `name ( arg* )`, arguments separated by whitespace only
    pub fn parse_prototype(&mut self) -> ParseResult<Prototype> {
        let name = match &self.current {
            Token::Ident(name) => name.clone(),
            tok => return Err(ParserError::ExpectedFunctionName(tok.clone())),
        };

        if *self.advance() != Token::Char('(') {
            return Err(ParserError::ExpectedPrototypeOpenParen(self.current.clone()));
        }

        let mut args = Vec::new();
        while let Token::Ident(arg) = self.advance() {
            args.push(arg.clone());
        }

        if self.current != Token::Char(')') {
            return Err(ParserError::ExpectedPrototypeCloseParen(self.current.clone()));
        }
        self.advance();

        Ok(Prototype { name, args })
    }

    pub fn parse_definition(&mut self) -> ParseResult<Function> {
        self.advance();
        let prototype = self.parse_prototype()?;
        let body = self.parse_expression()?;
        Ok(Function { prototype, body })
    }

    pub fn parse_extern(&mut self) -> ParseResult<Prototype> {
        self.advance();
        self.parse_prototype()
    }

    pub fn parse_top_level_expression(&mut self) -> ParseResult<Function> {
        let body = self.parse_expression()?;
        Ok(Function::anonymous(body))
    }

    /// Parses the top-level form starting at the current token, or `None`
    /// at a separator or the end of input.
    pub fn parse_top_level(&mut self) -> Option<ParseResult<ASTNode>> {
        let node = match self.current {
            Token::Eof | Token::Char(';') => return None,
            Token::Def => self.parse_definition().map(ASTNode::Function),
            Token::Extern => self.parse_extern().map(ASTNode::Extern),
            _ => self.parse_top_level_expression().map(ASTNode::Function),
        };
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn var(name: &str) -> Expression {
        Expression::Variable(name.to_string())
    }

    fn parse_expr(input: &str) -> PartialParseResult {
        Parser::from_source(input).parse_expression()
    }

    #[test]
    fn parse_expr_works() {
        let res = parse_expr("x + 1 * (2 - 3)").unwrap();
        let target = Expression::binary(
            '+',
            var("x"),
            Expression::binary(
                '*',
                Expression::Number(1.0),
                Expression::binary('-', Expression::Number(2.0), Expression::Number(3.0)),
            ),
        );
        assert_eq!(res, target);
    }

    #[test]
    fn equal_precedence_associates_left() {
        let res = parse_expr("a - b - c").unwrap();
        let target = Expression::binary('-', Expression::binary('-', var("a"), var("b")), var("c"));
        assert_eq!(res, target);
        assert_eq!(parse_expr("a + b - c + d").unwrap().to_string(), "(((a + b) - c) + d)");
    }

    #[test]
    fn multiplication_binds_tighter() {
        assert_eq!(parse_expr("a + b * c").unwrap().to_string(), "(a + (b * c))");
        assert_eq!(parse_expr("a * b + c").unwrap().to_string(), "((a * b) + c)");
        assert_eq!(
            parse_expr("a < b + c * d - e").unwrap().to_string(),
            "(a < ((b + (c * d)) - e))"
        );
    }

    #[test]
    fn parentheses_override_precedence() {
        let res = parse_expr("(a + b) * c").unwrap();
        let target = Expression::binary('*', Expression::binary('+', var("a"), var("b")), var("c"));
        assert_eq!(res, target);
    }

    #[test]
    fn calls_parse_arguments() {
        assert_eq!(
            parse_expr("f(1, x + 2, g())").unwrap(),
            Expression::Call {
                callee: "f".to_string(),
                args: vec![
                    Expression::Number(1.0),
                    Expression::binary('+', var("x"), Expression::Number(2.0)),
                    Expression::Call {
                        callee: "g".to_string(),
                        args: vec![],
                    },
                ],
            }
        );
    }

    #[test]
    fn call_argument_errors() {
        assert_eq!(
            parse_expr("f(1,)"),
            Err(ParserError::ExpectedExpression(Token::Char(')')))
        );
        assert_eq!(
            parse_expr("f(1 2)"),
            Err(ParserError::ExpectedArgumentSeparator(Token::Number(2.0)))
        );
        assert_eq!(parse_expr("(1 + 2"), Err(ParserError::ExpectedCloseParen(Token::Eof)));
    }

    #[test]
    fn truncated_expression_fails() {
        assert_eq!(parse_expr("1 + "), Err(ParserError::ExpectedExpression(Token::Eof)));
    }

    #[test]
    fn unknown_operators_stop_the_climb() {
        let mut parser = Parser::from_source("a / b");
        assert_eq!(parser.parse_expression().unwrap(), var("a"));
        assert_eq!(parser.current(), &Token::Char('/'));
    }

    #[test]
    fn installed_operators_take_part() {
        let mut parser = Parser::from_source("a + b / c").with_operator('/', 40);
        assert_eq!(parser.parse_expression().unwrap().to_string(), "(a + (b / c))");

        let mut disabled = Parser::from_source("a + b").with_operator('+', 0);
        assert_eq!(disabled.parse_expression().unwrap(), var("a"));
    }

    #[test]
    fn parse_definition_works() {
        let mut parser = Parser::from_source("def add(a b) a+b;");
        assert_eq!(
            parser.parse_top_level(),
            Some(Ok(ASTNode::Function(Function {
                prototype: Prototype::new("add", vec!["a".to_string(), "b".to_string()]),
                body: Expression::binary('+', var("a"), var("b")),
            })))
        );
        assert_eq!(parser.current(), &Token::Char(';'));
        assert_eq!(parser.parse_top_level(), None);
    }

    #[test]
    fn parse_extern_works() {
        let mut parser = Parser::from_source("extern sin(x);");
        assert_eq!(
            parser.parse_top_level(),
            Some(Ok(ASTNode::Extern(Prototype::new("sin", vec!["x".to_string()]))))
        );

        let mut parser = Parser::from_source("extern now()");
        assert_eq!(parser.parse_extern(), Ok(Prototype::new("now", vec![])));
    }

    #[test]
    fn prototype_errors() {
        assert_eq!(
            Parser::from_source("def 1(a) a").parse_definition(),
            Err(ParserError::ExpectedFunctionName(Token::Number(1.0)))
        );
        assert_eq!(
            Parser::from_source("extern f a)").parse_extern(),
            Err(ParserError::ExpectedPrototypeOpenParen(Token::Ident("a".to_string())))
        );
        assert_eq!(
            Parser::from_source("extern f(a, b)").parse_extern(),
            Err(ParserError::ExpectedPrototypeCloseParen(Token::Char(',')))
        );
    }

    #[test]
    fn duplicate_parameters_are_left_to_codegen() {
        assert_eq!(
            Parser::from_source("extern f(a a)").parse_extern(),
            Ok(Prototype::new("f", vec!["a".to_string(), "a".to_string()]))
        );
    }

    #[test]
    fn top_level_expressions_are_anonymous() {
        let mut parser = Parser::from_source("add(1, 2)");
        let func = parser.parse_top_level_expression().unwrap();
        assert!(func.is_anonymous());
        assert!(func.prototype.args.is_empty());
        assert_eq!(func.body.to_string(), "add(1, 2)");
    }
}
