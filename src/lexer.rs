use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Eof,
    Def,
    Extern,
    Ident(String),
    Number(f64),
    /// any other single character: operators, parens, comma, semicolon
    Char(char),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Eof => write!(f, "end of input"),
            Token::Def => write!(f, "'def'"),
            Token::Extern => write!(f, "'extern'"),
            Token::Ident(name) => write!(f, "identifier '{}'", name),
            Token::Number(value) => write!(f, "number {}", value),
            Token::Char(c) => write!(f, "'{}'", c),
        }
    }
}

lazy_static! {
    // the longest prefix strtod would accept from a run of digits and dots
    static ref NUMERAL_RE: Regex = Regex::new(r"^(\d+\.?\d*|\.\d+)").unwrap();
}

/// Converts a buffer of digits and dots to a number, stopping at the first
/// suffix that is not part of a numeral (so `1.2.3` reads as `1.2`).
fn parse_numeral(text: &str) -> f64 {
    NUMERAL_RE
        .find(text)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0.0)
}

fn is_numeral_char(c: char) -> bool {
    c.is_ascii_digit() || c == '.'
}

/// Pulls tokens out of a character source one at a time.
///
/// `last_char` is the character read but not yet consumed into a token,
/// `None` once the source is exhausted.
pub struct Lexer<I: Iterator<Item = char>> {
    source: I,
    last_char: Option<char>,
}

impl<I: Iterator<Item = char>> Lexer<I> {
    pub fn new(source: I) -> Self {
        Self {
            source,
            last_char: Some(' '),
        }
    }

    fn bump(&mut self) -> Option<char> {
        self.last_char = self.source.next();
        self.last_char
    }

    pub fn next_token(&mut self) -> Token {
        loop {
            while matches!(self.last_char, Some(c) if c.is_whitespace()) {
                self.bump();
            }

            let current = match self.last_char {
                Some(c) => c,
                None => return Token::Eof,
            };

            if current.is_alphabetic() {
                let mut ident = String::new();
                ident.push(current);
                while let Some(c) = self.bump().filter(|c| c.is_alphanumeric()) {
                    ident.push(c);
                }

                return match ident.as_str() {
                    "def" => Token::Def,
                    "extern" => Token::Extern,
                    _ => Token::Ident(ident),
                };
            }

            if is_numeral_char(current) {
                let mut numeral = String::new();
                numeral.push(current);
                while let Some(c) = self.bump().filter(|&c| is_numeral_char(c)) {
                    numeral.push(c);
                }

                return Token::Number(parse_numeral(&numeral));
            }

            if current == '#' {
                while !matches!(self.bump(), None | Some('\n') | Some('\r')) {}
                continue;
            }

            self.bump();
            return Token::Char(current);
        }
    }
}

impl<I: Iterator<Item = char>> Iterator for Lexer<I> {
    type Item = Token;

    /// yields every token before the end of input
    fn next(&mut self) -> Option<Token> {
        match self.next_token() {
            Token::Eof => None,
            tok => Some(tok),
        }
    }
}

/// lex the whole input string, ending with `Token::Eof`
pub fn lex(input: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(input.chars());
    let mut res: Vec<Token> = lexer.by_ref().collect();
    res.push(Token::Eof);
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lex_works() {
        let input = "def add(x y) x+1.0;";
        let tokenized = [
            Token::Def,
            Token::Ident("add".to_string()),
            Token::Char('('),
            Token::Ident("x".to_string()),
            Token::Ident("y".to_string()),
            Token::Char(')'),
            Token::Ident("x".to_string()),
            Token::Char('+'),
            Token::Number(1.0),
            Token::Char(';'),
            Token::Eof,
        ];
        assert_eq!(lex(input), tokenized);
    }

    #[test]
    fn keywords_need_exact_match() {
        assert_eq!(
            lex("extern externs define def"),
            [
                Token::Extern,
                Token::Ident("externs".to_string()),
                Token::Ident("define".to_string()),
                Token::Def,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn identifiers_take_trailing_digits() {
        assert_eq!(
            lex("x1 2x"),
            [
                Token::Ident("x1".to_string()),
                Token::Number(2.0),
                Token::Ident("x".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_transparent() {
        assert_eq!(
            lex("# somebody \na # trailing"),
            [Token::Ident("a".to_string()), Token::Eof]
        );
        assert_eq!(lex("1\r# x\r2"), [Token::Number(1.0), Token::Number(2.0), Token::Eof]);
        assert_eq!(lex("#only a comment"), [Token::Eof]);
    }

    #[test]
    fn numbers_round_trip() {
        for text in ["0", "1", "42", "3.25", "0.5", "1234.5678", "1e0"] {
            let value: f64 = text.parse().unwrap();
            match lex(&value.to_string()).first() {
                Some(Token::Number(lexed)) => assert_eq!(*lexed, value),
                other => panic!("expected number for {}, got {:?}", text, other),
            }
        }
    }

    #[test]
    fn malformed_numerals_are_truncated() {
        assert_eq!(lex("1.2.3"), [Token::Number(1.2), Token::Eof]);
        assert_eq!(lex(".5"), [Token::Number(0.5), Token::Eof]);
        assert_eq!(lex("."), [Token::Number(0.0), Token::Eof]);
        assert_eq!(lex("7."), [Token::Number(7.0), Token::Eof]);
    }

    #[test]
    fn operators_are_single_chars() {
        assert_eq!(
            lex("a<b*(c-d),;"),
            [
                Token::Ident("a".to_string()),
                Token::Char('<'),
                Token::Ident("b".to_string()),
                Token::Char('*'),
                Token::Char('('),
                Token::Ident("c".to_string()),
                Token::Char('-'),
                Token::Ident("d".to_string()),
                Token::Char(')'),
                Token::Char(','),
                Token::Char(';'),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn eof_is_sticky() {
        let mut lexer = Lexer::new("x".chars());
        assert_eq!(lexer.next_token(), Token::Ident("x".to_string()));
        assert_eq!(lexer.next_token(), Token::Eof);
        assert_eq!(lexer.next_token(), Token::Eof);
    }
}
