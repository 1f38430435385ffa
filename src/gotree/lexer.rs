//! Go scanner.
//!
//! Produces the token stream the `gotree` parser consumes. Follows Go's
//! automatic semicolon insertion rule: a newline after an identifier, a
//! literal, one of `break`/`continue`/`fallthrough`/`return`, or one of
//! `++ -- ) ] }` yields a `;` token. Comments are elided.

use crate::error::Error;
use crate::gotree::Pos;

#[derive(Debug, Clone, PartialEq)]
pub enum GoTok {
    /// Identifier or keyword; the parser decides which.
    Ident(String),
    Int(String),
    Float(String),
    /// Interpreted string literal, delimiters kept verbatim.
    Str(String),
    /// Raw string literal (struct tags), backticks kept verbatim.
    RawStr(String),
    Char(String),
    Op(&'static str),
    Eof,
}

impl GoTok {
    pub fn describe(&self) -> String {
        match self {
            GoTok::Ident(name) => format!("`{name}`"),
            GoTok::Int(v) | GoTok::Float(v) => v.clone(),
            GoTok::Str(v) | GoTok::RawStr(v) | GoTok::Char(v) => v.clone(),
            GoTok::Op(op) => format!("`{op}`"),
            GoTok::Eof => "end of file".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GoToken {
    pub kind: GoTok,
    pub pos: Pos,
}

const KEYWORDS: &[&str] = &[
    "break", "case", "chan", "const", "continue", "default", "defer", "else", "fallthrough",
    "for", "func", "go", "goto", "if", "import", "interface", "map", "package", "range",
    "return", "select", "struct", "switch", "type", "var",
];

pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

/// Keywords after which a newline still inserts a semicolon.
fn keyword_ends_statement(name: &str) -> bool {
    matches!(name, "break" | "continue" | "fallthrough" | "return")
}

pub struct Scanner<'a> {
    input: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
    /// Whether a newline at this point should become a `;`.
    needs_semi: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            needs_semi: false,
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

    pub fn tokenize(&mut self) -> Result<Vec<GoToken>, Error> {
        let mut tokens = Vec::new();

        loop {
            // Skip whitespace and comments, inserting semicolons at newlines.
            loop {
                match self.peek() {
                    Some(b'\n') => {
                        if self.needs_semi {
                            tokens.push(GoToken {
                                kind: GoTok::Op(";"),
                                pos: self.here(),
                            });
                            self.needs_semi = false;
                        }
                        self.advance();
                    }
                    Some(c) if c == b' ' || c == b'\t' || c == b'\r' => {
                        self.advance();
                    }
                    Some(b'/') if self.peek_at(1) == Some(b'/') => {
                        while self.peek().is_some_and(|c| c != b'\n') {
                            self.advance();
                        }
                    }
                    Some(b'/') if self.peek_at(1) == Some(b'*') => {
                        self.advance();
                        self.advance();
                        loop {
                            match self.peek() {
                                Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                    self.advance();
                                    self.advance();
                                    break;
                                }
                                Some(_) => {
                                    self.advance();
                                }
                                None => {
                                    return Err(Error::TargetParse(format!(
                                        "{}: unterminated comment",
                                        self.here()
                                    )));
                                }
                            }
                        }
                    }
                    _ => break,
                }
            }

            let pos = self.here();
            let Some(ch) = self.peek() else {
                if self.needs_semi {
                    tokens.push(GoToken {
                        kind: GoTok::Op(";"),
                        pos,
                    });
                }
                tokens.push(GoToken {
                    kind: GoTok::Eof,
                    pos,
                });
                break;
            };

            let kind = match ch {
                b'"' => {
                    let start = self.pos;
                    self.advance();
                    loop {
                        match self.peek() {
                            Some(b'\\') => {
                                self.advance();
                                self.advance();
                            }
                            Some(b'"') => {
                                self.advance();
                                break;
                            }
                            Some(b'\n') | None => {
                                return Err(Error::TargetParse(format!(
                                    "{pos}: unterminated string literal"
                                )));
                            }
                            Some(_) => {
                                self.advance();
                            }
                        }
                    }
                    GoTok::Str(
                        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned(),
                    )
                }
                b'`' => {
                    let start = self.pos;
                    self.advance();
                    while self.peek().is_some_and(|c| c != b'`') {
                        self.advance();
                    }
                    if self.advance().is_none() {
                        return Err(Error::TargetParse(format!(
                            "{pos}: unterminated raw string literal"
                        )));
                    }
                    GoTok::RawStr(
                        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned(),
                    )
                }
                b'\'' => {
                    let start = self.pos;
                    self.advance();
                    loop {
                        match self.peek() {
                            Some(b'\\') => {
                                self.advance();
                                self.advance();
                            }
                            Some(b'\'') => {
                                self.advance();
                                break;
                            }
                            Some(b'\n') | None => {
                                return Err(Error::TargetParse(format!(
                                    "{pos}: unterminated character literal"
                                )));
                            }
                            Some(_) => {
                                self.advance();
                            }
                        }
                    }
                    GoTok::Char(
                        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned(),
                    )
                }
                _ if ch.is_ascii_digit() => {
                    let digits = self.read_while(|c| c.is_ascii_digit() || c == b'_');
                    if self.peek() == Some(b'.')
                        && self.peek_at(1).is_some_and(|c| c.is_ascii_digit())
                    {
                        self.advance();
                        let frac = self.read_while(|c| c.is_ascii_digit() || c == b'_');
                        GoTok::Float(format!("{digits}.{frac}"))
                    } else {
                        GoTok::Int(digits)
                    }
                }
                _ if ch.is_ascii_alphabetic() || ch == b'_' => {
                    let word = self.read_while(|c| c.is_ascii_alphanumeric() || c == b'_');
                    GoTok::Ident(word)
                }
                _ => {
                    let op = self.scan_operator().ok_or_else(|| {
                        Error::TargetParse(format!(
                            "{pos}: unexpected character `{}`",
                            ch as char
                        ))
                    })?;
                    GoTok::Op(op)
                }
            };

            self.needs_semi = match &kind {
                GoTok::Ident(name) => !is_keyword(name) || keyword_ends_statement(name),
                GoTok::Int(_)
                | GoTok::Float(_)
                | GoTok::Str(_)
                | GoTok::RawStr(_)
                | GoTok::Char(_) => true,
                GoTok::Op(op) => matches!(*op, "++" | "--" | ")" | "]" | "}"),
                GoTok::Eof => false,
            };

            tokens.push(GoToken { kind, pos });
        }

        Ok(tokens)
    }

    /// Maximal-munch operator scan.
    fn scan_operator(&mut self) -> Option<&'static str> {
        const THREE: &[&str] = &["...", "<<=", ">>=", "&^="];
        const TWO: &[&str] = &[
            ":=", "==", "!=", "<=", ">=", "&&", "||", "<-", "++", "--", "+=", "-=", "*=",
            "/=", "%=", "&=", "|=", "^=", "<<", ">>", "&^",
        ];
        const ONE: &[&str] = &[
            "+", "-", "*", "/", "%", "&", "|", "^", "<", ">", "=", "!", "(", ")", "[", "]",
            "{", "}", ",", ";", ".", ":",
        ];

        let rest = &self.input[self.pos..];
        for ops in [THREE, TWO, ONE] {
            for op in ops {
                if rest.starts_with(op.as_bytes()) {
                    for _ in 0..op.len() {
                        self.advance();
                    }
                    return Some(op);
                }
            }
        }
        None
    }
}
