//! Rule language lexer.
//!
//! Tokenizes `.lift` rule text like `match FuncDecl { name: $Name }`.
//! Comments and whitespace are elided; every token carries the position it
//! started at. Quote and backtick delimiters are stripped at lex time, so
//! downstream stages never see them.

use std::fmt;

use crate::error::Error;

/// Line/column position of a token within a rule file (both 1-indexed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// `[A-Za-z_][A-Za-z0-9_]*`
    Ident(String),
    /// `"…"` with the quotes stripped. No escape sequences.
    Str(String),
    /// `` `…` `` with the backticks stripped; may span lines.
    RawStr(String),
    Int(i64),
    /// `...`
    Spread,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Colon,
    Comma,
    Dot,
    Dollar,
    Pipe,
    Star,
    At,
    Bang,
    Assign,   // =
    Lt,       // <
    Gt,       // >
    Le,       // <=
    Ge,       // >=
    EqEq,     // ==
    NotEq,    // !=
}

impl TokenKind {
    /// Human-readable token description for error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier `{name}`"),
            TokenKind::Str(s) => format!("string \"{s}\""),
            TokenKind::RawStr(_) => "raw string".to_string(),
            TokenKind::Int(n) => format!("integer {n}"),
            TokenKind::Spread => "`...`".to_string(),
            TokenKind::LBrace => "`{`".to_string(),
            TokenKind::RBrace => "`}`".to_string(),
            TokenKind::LBracket => "`[`".to_string(),
            TokenKind::RBracket => "`]`".to_string(),
            TokenKind::LParen => "`(`".to_string(),
            TokenKind::RParen => "`)`".to_string(),
            TokenKind::Colon => "`:`".to_string(),
            TokenKind::Comma => "`,`".to_string(),
            TokenKind::Dot => "`.`".to_string(),
            TokenKind::Dollar => "`$`".to_string(),
            TokenKind::Pipe => "`|`".to_string(),
            TokenKind::Star => "`*`".to_string(),
            TokenKind::At => "`@`".to_string(),
            TokenKind::Bang => "`!`".to_string(),
            TokenKind::Assign => "`=`".to_string(),
            TokenKind::Lt => "`<`".to_string(),
            TokenKind::Gt => "`>`".to_string(),
            TokenKind::Le => "`<=`".to_string(),
            TokenKind::Ge => "`>=`".to_string(),
            TokenKind::EqEq => "`==`".to_string(),
            TokenKind::NotEq => "`!=`".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
}

pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.input.get(self.pos).copied()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn here(&self) -> Pos {
        Pos {
            line: self.line,
            column: self.column,
        }
    }

    fn read_while(&mut self, pred: impl Fn(u8) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.advance();
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn is_ident_start(ch: u8) -> bool {
        ch.is_ascii_alphabetic() || ch == b'_'
    }

    fn is_ident_char(ch: u8) -> bool {
        ch.is_ascii_alphanumeric() || ch == b'_'
    }

    /// Tokenize the whole input. Stops at the first unknown character with a
    /// positioned error.
    pub fn tokenize(&mut self) -> Result<Vec<Token>, Error> {
        let mut tokens = Vec::new();

        loop {
            while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
                self.advance();
            }
            let pos = self.here();
            let Some(ch) = self.peek() else { break };

            let kind = match ch {
                b'/' if self.peek_at(1) == Some(b'/') => {
                    while self.peek().is_some_and(|c| c != b'\n') {
                        self.advance();
                    }
                    continue;
                }
                b'`' => {
                    self.advance();
                    let text = self.read_while(|c| c != b'`');
                    if self.advance().is_none() {
                        return Err(Error::lex(pos, "unterminated raw string"));
                    }
                    TokenKind::RawStr(text)
                }
                b'"' => {
                    self.advance();
                    let text = self.read_while(|c| c != b'"');
                    if self.advance().is_none() {
                        return Err(Error::lex(pos, "unterminated string"));
                    }
                    TokenKind::Str(text)
                }
                b'.' if self.peek_at(1) == Some(b'.') && self.peek_at(2) == Some(b'.') => {
                    self.advance();
                    self.advance();
                    self.advance();
                    TokenKind::Spread
                }
                b'>' if self.peek_at(1) == Some(b'=') => {
                    self.advance();
                    self.advance();
                    TokenKind::Ge
                }
                b'<' if self.peek_at(1) == Some(b'=') => {
                    self.advance();
                    self.advance();
                    TokenKind::Le
                }
                b'!' if self.peek_at(1) == Some(b'=') => {
                    self.advance();
                    self.advance();
                    TokenKind::NotEq
                }
                b'=' if self.peek_at(1) == Some(b'=') => {
                    self.advance();
                    self.advance();
                    TokenKind::EqEq
                }
                b'{' => {
                    self.advance();
                    TokenKind::LBrace
                }
                b'}' => {
                    self.advance();
                    TokenKind::RBrace
                }
                b'[' => {
                    self.advance();
                    TokenKind::LBracket
                }
                b']' => {
                    self.advance();
                    TokenKind::RBracket
                }
                b'(' => {
                    self.advance();
                    TokenKind::LParen
                }
                b')' => {
                    self.advance();
                    TokenKind::RParen
                }
                b':' => {
                    self.advance();
                    TokenKind::Colon
                }
                b',' => {
                    self.advance();
                    TokenKind::Comma
                }
                b'.' => {
                    self.advance();
                    TokenKind::Dot
                }
                b'$' => {
                    self.advance();
                    TokenKind::Dollar
                }
                b'|' => {
                    self.advance();
                    TokenKind::Pipe
                }
                b'*' => {
                    self.advance();
                    TokenKind::Star
                }
                b'@' => {
                    self.advance();
                    TokenKind::At
                }
                b'!' => {
                    self.advance();
                    TokenKind::Bang
                }
                b'=' => {
                    self.advance();
                    TokenKind::Assign
                }
                b'<' => {
                    self.advance();
                    TokenKind::Lt
                }
                b'>' => {
                    self.advance();
                    TokenKind::Gt
                }
                _ if ch.is_ascii_digit() => {
                    let digits = self.read_while(|c| c.is_ascii_digit());
                    let n = digits
                        .parse::<i64>()
                        .map_err(|_| Error::lex(pos, format!("integer out of range: {digits}")))?;
                    TokenKind::Int(n)
                }
                _ if Self::is_ident_start(ch) => {
                    let word = self.read_while(Self::is_ident_char);
                    TokenKind::Ident(word)
                }
                _ => {
                    return Err(Error::lex(
                        pos,
                        format!("unexpected character `{}`", ch as char),
                    ));
                }
            };

            tokens.push(Token { kind, pos });
        }

        Ok(tokens)
    }
}
