use crate::diagnostics::{Diagnostic, DiagnosticKind, Location};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Let,
    Fn,
    Return,
    If,
    Else,
    While,
    True,
    False,
    Nil,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    Str,
    Keyword(Keyword),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    BangEqual,
    EqualEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    AndAnd,
    OrOr,
    Eof,
}

/// Decoded literal payload carried alongside the raw lexeme.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenLiteral {
    Number(f64),
    Str(String),
    Bool(bool),
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub loc: Location,
    pub literal: Option<TokenLiteral>,
}

pub struct Lexer<'a> {
    source: &'a str,
    chars: std::str::CharIndices<'a>,
    peeked: Option<(usize, char)>,
    current: usize,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices(),
            peeked: None,
            current: 0,
            line: 1,
            col: 1,
        }
    }

    fn bump(&mut self) -> Option<(usize, char, Location)> {
        let (idx, ch) = self.peeked.take().or_else(|| self.chars.next())?;
        let loc = Location::new(self.line, self.col);
        self.current = idx + ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some((idx, ch, loc))
    }

    fn peek(&mut self) -> Option<(usize, char)> {
        if self.peeked.is_none() {
            self.peeked = self.chars.next();
        }
        self.peeked
    }

    /// Character after the peeked one, without consuming either.
    fn peek_second(&mut self) -> Option<char> {
        self.peek();
        self.chars.clone().next().map(|(_, ch)| ch)
    }

    fn match_next(&mut self, expected: char) -> bool {
        if let Some((_, ch)) = self.peek() {
            if ch == expected {
                self.bump();
                return true;
            }
        }
        false
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), Diagnostic> {
        loop {
            let mut progressed = false;

            while let Some((_, ch)) = self.peek() {
                if ch.is_whitespace() {
                    self.bump();
                    progressed = true;
                } else {
                    break;
                }
            }

            if let Some((_, '/')) = self.peek() {
                match self.peek_second() {
                    Some('/') => {
                        self.bump();
                        self.bump();
                        while let Some((_, ch)) = self.peek() {
                            if ch == '\n' {
                                break;
                            }
                            self.bump();
                        }
                        progressed = true;
                    }
                    Some('*') => {
                        // Block comments do not nest.
                        let (_, _, open) = self.bump().unwrap_or((0, '/', self.here()));
                        self.bump();
                        let mut closed = false;
                        while let Some((_, ch, _)) = self.bump() {
                            if ch == '*' && self.match_next('/') {
                                closed = true;
                                break;
                            }
                        }
                        if !closed {
                            return Err(Diagnostic::new(
                                DiagnosticKind::Lexer,
                                "unterminated block comment",
                            )
                            .with_location(open));
                        }
                        progressed = true;
                    }
                    _ => {}
                }
            }

            if !progressed {
                return Ok(());
            }
        }
    }

    fn here(&self) -> Location {
        Location::new(self.line, self.col)
    }

    fn identifier_or_keyword(&mut self, start: usize, loc: Location) -> Token {
        while let Some((_, ch)) = self.peek() {
            if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '?' | '!' | '$') {
                self.bump();
            } else {
                break;
            }
        }
        let lexeme = self.source[start..self.current].to_string();
        match keyword_for(&lexeme) {
            Some(keyword) => {
                let literal = match keyword {
                    Keyword::True => Some(TokenLiteral::Bool(true)),
                    Keyword::False => Some(TokenLiteral::Bool(false)),
                    _ => None,
                };
                Token {
                    kind: TokenKind::Keyword(keyword),
                    lexeme,
                    loc,
                    literal,
                }
            }
            None => Token {
                kind: TokenKind::Identifier,
                lexeme,
                loc,
                literal: None,
            },
        }
    }

    fn number_literal(&mut self, start: usize, loc: Location) -> Result<Token, Diagnostic> {
        self.digit_run();
        if let Some((_, '.')) = self.peek() {
            if self.peek_second().is_some_and(|ch| ch.is_ascii_digit()) {
                self.bump();
                self.digit_run();
            }
        }
        if matches!(self.peek(), Some((_, 'e' | 'E'))) {
            self.bump();
            if matches!(self.peek(), Some((_, '+' | '-'))) {
                self.bump();
            }
            if !matches!(self.peek(), Some((_, ch)) if ch.is_ascii_digit()) {
                return Err(Diagnostic::new(
                    DiagnosticKind::Lexer,
                    "malformed exponent in number literal",
                )
                .with_location(loc));
            }
            self.digit_run();
        }
        let lexeme = self.source[start..self.current].to_string();
        let value = lexeme.replace('_', "").parse::<f64>().map_err(|_| {
            Diagnostic::new(DiagnosticKind::Lexer, format!("invalid number `{lexeme}`"))
                .with_location(loc)
        })?;
        Ok(Token {
            kind: TokenKind::Number,
            lexeme,
            loc,
            literal: Some(TokenLiteral::Number(value)),
        })
    }

    fn digit_run(&mut self) {
        while let Some((_, ch)) = self.peek() {
            if ch.is_ascii_digit() || ch == '_' {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn string_literal(&mut self, start: usize, loc: Location) -> Result<Token, Diagnostic> {
        let mut value = String::new();
        while let Some((_, ch, ch_loc)) = self.bump() {
            match ch {
                '"' => {
                    return Ok(Token {
                        kind: TokenKind::Str,
                        lexeme: self.source[start..self.current].to_string(),
                        loc,
                        literal: Some(TokenLiteral::Str(value)),
                    });
                }
                '\\' => match self.bump() {
                    Some((_, 'n', _)) => value.push('\n'),
                    Some((_, 't', _)) => value.push('\t'),
                    Some((_, 'r', _)) => value.push('\r'),
                    Some((_, '"', _)) => value.push('"'),
                    Some((_, '\\', _)) => value.push('\\'),
                    Some((_, 'u', _)) => value.push(self.unicode_escape(ch_loc)?),
                    Some((_, other, esc_loc)) => {
                        return Err(Diagnostic::new(
                            DiagnosticKind::Lexer,
                            format!("unknown escape sequence `\\{other}`"),
                        )
                        .with_location(esc_loc));
                    }
                    None => break,
                },
                _ => value.push(ch),
            }
        }
        Err(
            Diagnostic::new(DiagnosticKind::Lexer, "unterminated string literal")
                .with_location(loc),
        )
    }

    /// Four hex digits following `\u`, re-encoded to UTF-8.
    fn unicode_escape(&mut self, loc: Location) -> Result<char, Diagnostic> {
        let mut code = 0u32;
        for _ in 0..4 {
            let digit = match self.bump() {
                Some((_, ch, _)) if ch.is_ascii_hexdigit() => ch.to_digit(16).unwrap_or(0),
                _ => {
                    return Err(Diagnostic::new(
                        DiagnosticKind::Lexer,
                        "expected four hex digits after `\\u`",
                    )
                    .with_location(loc));
                }
            };
            code = code * 16 + digit;
        }
        char::from_u32(code).ok_or_else(|| {
            Diagnostic::new(
                DiagnosticKind::Lexer,
                format!("`\\u{code:04x}` is not a valid character"),
            )
            .with_location(loc)
        })
    }

    fn simple_token(&mut self, start: usize, loc: Location, kind: TokenKind) -> Token {
        Token {
            kind,
            lexeme: self.source[start..self.current].to_string(),
            loc,
            literal: None,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, Diagnostic> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments()?;
            let (start, ch, loc) = match self.bump() {
                Some(triple) => triple,
                None => {
                    tokens.push(Token {
                        kind: TokenKind::Eof,
                        lexeme: String::new(),
                        loc: self.here(),
                        literal: None,
                    });
                    break;
                }
            };

            let token = match ch {
                'a'..='z' | 'A'..='Z' | '_' => self.identifier_or_keyword(start, loc),
                '0'..='9' => self.number_literal(start, loc)?,
                '"' => self.string_literal(start, loc)?,
                '(' => self.simple_token(start, loc, TokenKind::LParen),
                ')' => self.simple_token(start, loc, TokenKind::RParen),
                '{' => self.simple_token(start, loc, TokenKind::LBrace),
                '}' => self.simple_token(start, loc, TokenKind::RBrace),
                ',' => self.simple_token(start, loc, TokenKind::Comma),
                ';' => self.simple_token(start, loc, TokenKind::Semicolon),
                '+' => self.simple_token(start, loc, TokenKind::Plus),
                '-' => self.simple_token(start, loc, TokenKind::Minus),
                '*' => self.simple_token(start, loc, TokenKind::Star),
                '/' => self.simple_token(start, loc, TokenKind::Slash),
                '%' => self.simple_token(start, loc, TokenKind::Percent),
                '=' => {
                    if self.match_next('=') {
                        self.simple_token(start, loc, TokenKind::EqualEqual)
                    } else {
                        self.simple_token(start, loc, TokenKind::Assign)
                    }
                }
                '!' => {
                    if self.match_next('=') {
                        self.simple_token(start, loc, TokenKind::BangEqual)
                    } else {
                        self.simple_token(start, loc, TokenKind::Bang)
                    }
                }
                '<' => {
                    if self.match_next('=') {
                        self.simple_token(start, loc, TokenKind::LessEqual)
                    } else {
                        self.simple_token(start, loc, TokenKind::Less)
                    }
                }
                '>' => {
                    if self.match_next('=') {
                        self.simple_token(start, loc, TokenKind::GreaterEqual)
                    } else {
                        self.simple_token(start, loc, TokenKind::Greater)
                    }
                }
                '&' => {
                    if self.match_next('&') {
                        self.simple_token(start, loc, TokenKind::AndAnd)
                    } else {
                        return Err(Diagnostic::new(
                            DiagnosticKind::Lexer,
                            "single `&` is not an operator; did you mean `&&`?",
                        )
                        .with_location(loc));
                    }
                }
                '|' => {
                    if self.match_next('|') {
                        self.simple_token(start, loc, TokenKind::OrOr)
                    } else {
                        return Err(Diagnostic::new(
                            DiagnosticKind::Lexer,
                            "single `|` is not an operator; did you mean `||`?",
                        )
                        .with_location(loc));
                    }
                }
                other => {
                    return Err(Diagnostic::new(
                        DiagnosticKind::Lexer,
                        format!("unexpected character `{other}`"),
                    )
                    .with_location(loc));
                }
            };
            tokens.push(token);
        }
        Ok(tokens)
    }
}

fn keyword_for(ident: &str) -> Option<Keyword> {
    let keyword = match ident {
        "let" => Keyword::Let,
        "fn" => Keyword::Fn,
        "return" => Keyword::Return,
        "if" => Keyword::If,
        "else" => Keyword::Else,
        "while" => Keyword::While,
        "true" => Keyword::True,
        "false" => Keyword::False,
        "nil" => Keyword::Nil,
        _ => None?,
    };
    Some(keyword)
}
