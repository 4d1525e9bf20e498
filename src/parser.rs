use std::rc::Rc;

use crate::{
    ast::{BinaryOp, Expr, ExprKind, FunctionDef, Literal, LogicalOp, Stmt, StmtKind, UnaryOp},
    diagnostics::{Diagnostic, DiagnosticKind, Location},
    lexer::{Keyword, Lexer, Token, TokenKind, TokenLiteral},
};

/// Lexes and parses a whole source unit. The first error aborts the parse;
/// there is no recovery or synchronization.
pub fn parse_program(source: &str) -> Result<Vec<Stmt>, Diagnostic> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_program()
}

struct Parser {
    tokens: Vec<Token>,
    current: usize,
    fn_depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            fn_depth: 0,
        }
    }

    fn parse_program(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        let mut items = Vec::new();
        while !self.check(&TokenKind::Eof) {
            items.push(self.parse_declaration()?);
        }
        Ok(items)
    }

    fn parse_declaration(&mut self) -> Result<Stmt, Diagnostic> {
        if let Some(token) = self.peek() {
            match &token.kind {
                TokenKind::Keyword(Keyword::Let) => return self.parse_let(),
                // `fn name(...)` declares; a bare `fn (...)` is a function
                // literal and falls through to expression parsing.
                TokenKind::Keyword(Keyword::Fn) if self.next_is_identifier() => {
                    return self.parse_function_decl();
                }
                _ => {}
            }
        }
        self.parse_statement()
    }

    fn parse_statement(&mut self) -> Result<Stmt, Diagnostic> {
        if let Some(token) = self.peek() {
            match &token.kind {
                TokenKind::Keyword(Keyword::If) => return self.parse_if(),
                TokenKind::Keyword(Keyword::While) => return self.parse_while(),
                TokenKind::Keyword(Keyword::Return) => return self.parse_return(),
                TokenKind::LBrace => {
                    let loc = token.loc;
                    let items = self.parse_block()?;
                    return Ok(Stmt {
                        kind: StmtKind::Block(items),
                        loc,
                    });
                }
                _ => {}
            }
        }
        self.parse_expression_statement()
    }

    fn parse_let(&mut self) -> Result<Stmt, Diagnostic> {
        let loc = self.consume_keyword(Keyword::Let)?.loc;
        let name_token = self.consume_identifier("expected variable name after `let`")?;
        let initializer = if self.matches(&TokenKind::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.consume(
            &TokenKind::Semicolon,
            "expected `;` after variable declaration",
        )?;
        Ok(Stmt {
            kind: StmtKind::Let {
                name: name_token.lexeme,
                initializer,
            },
            loc,
        })
    }

    fn parse_function_decl(&mut self) -> Result<Stmt, Diagnostic> {
        let loc = self.consume_keyword(Keyword::Fn)?.loc;
        let name_token = self.consume_identifier("expected function name after `fn`")?;
        let (params, body) = self.parse_function_rest()?;
        Ok(Stmt {
            kind: StmtKind::Function(Rc::new(FunctionDef {
                name: Some(name_token.lexeme),
                params,
                body,
            })),
            loc,
        })
    }

    /// Parameter list and mandatory braced body, shared between declarations
    /// and function literals.
    fn parse_function_rest(&mut self) -> Result<(Vec<String>, Vec<Stmt>), Diagnostic> {
        self.consume(&TokenKind::LParen, "expected `(` before parameters")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let param = self.consume_identifier("expected parameter name")?;
                params.push(param.lexeme);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenKind::RParen, "expected `)` after parameters")?;
        self.fn_depth += 1;
        let body = self.parse_block();
        self.fn_depth -= 1;
        Ok((params, body?))
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        self.consume(&TokenKind::LBrace, "expected `{` to start block")?;
        let mut items = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.check(&TokenKind::Eof) {
            items.push(self.parse_declaration()?);
        }
        self.consume(&TokenKind::RBrace, "expected `}` to close block")?;
        Ok(items)
    }

    fn parse_if(&mut self) -> Result<Stmt, Diagnostic> {
        let loc = self.consume_keyword(Keyword::If)?.loc;
        self.consume(&TokenKind::LParen, "expected `(` after `if`")?;
        let condition = self.parse_expression()?;
        self.consume(&TokenKind::RParen, "expected `)` after condition")?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.matches_keyword(Keyword::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt {
            kind: StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
            loc,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, Diagnostic> {
        let loc = self.consume_keyword(Keyword::While)?.loc;
        self.consume(&TokenKind::LParen, "expected `(` after `while`")?;
        let condition = self.parse_expression()?;
        self.consume(&TokenKind::RParen, "expected `)` after condition")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt {
            kind: StmtKind::While { condition, body },
            loc,
        })
    }

    fn parse_return(&mut self) -> Result<Stmt, Diagnostic> {
        let token = self.consume_keyword(Keyword::Return)?;
        if self.fn_depth == 0 {
            return Err(
                Diagnostic::new(DiagnosticKind::Parser, "`return` outside of a function")
                    .with_location(token.loc),
            );
        }
        let expr = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(&TokenKind::Semicolon, "expected `;` after return value")?;
        Ok(Stmt {
            kind: StmtKind::Return(expr),
            loc: token.loc,
        })
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, Diagnostic> {
        let expr = self.parse_expression()?;
        self.consume(&TokenKind::Semicolon, "expected `;` after expression")?;
        Ok(Stmt {
            loc: expr.loc,
            kind: StmtKind::Expr(expr),
        })
    }

    fn parse_expression(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, Diagnostic> {
        let expr = self.parse_or()?;
        if self.matches(&TokenKind::Assign) {
            let equals = self.previous().loc;
            let value = self.parse_assignment()?;
            return match expr.kind {
                ExprKind::Variable(name) => Ok(Expr {
                    loc: expr.loc,
                    kind: ExprKind::Assign {
                        name,
                        value: Box::new(value),
                    },
                }),
                _ => Err(
                    Diagnostic::new(DiagnosticKind::Parser, "invalid assignment target")
                        .with_location(equals),
                ),
            };
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_and()?;
        while self.matches(&TokenKind::OrOr) {
            let right = self.parse_and()?;
            expr = Expr {
                loc: expr.loc,
                kind: ExprKind::Logical {
                    op: LogicalOp::Or,
                    left: Box::new(expr),
                    right: Box::new(right),
                },
            };
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_equality()?;
        while self.matches(&TokenKind::AndAnd) {
            let right = self.parse_equality()?;
            expr = Expr {
                loc: expr.loc,
                kind: ExprKind::Logical {
                    op: LogicalOp::And,
                    left: Box::new(expr),
                    right: Box::new(right),
                },
            };
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_comparison()?;
        while let Some(op) = if self.matches(&TokenKind::EqualEqual) {
            Some(BinaryOp::Equal)
        } else if self.matches(&TokenKind::BangEqual) {
            Some(BinaryOp::NotEqual)
        } else {
            None
        } {
            let right = self.parse_comparison()?;
            expr = self.binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_term()?;
        while let Some(op) = if self.matches(&TokenKind::LessEqual) {
            Some(BinaryOp::LessEqual)
        } else if self.matches(&TokenKind::GreaterEqual) {
            Some(BinaryOp::GreaterEqual)
        } else if self.matches(&TokenKind::Less) {
            Some(BinaryOp::Less)
        } else if self.matches(&TokenKind::Greater) {
            Some(BinaryOp::Greater)
        } else {
            None
        } {
            let right = self.parse_term()?;
            expr = self.binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_factor()?;
        while let Some(op) = if self.matches(&TokenKind::Plus) {
            Some(BinaryOp::Add)
        } else if self.matches(&TokenKind::Minus) {
            Some(BinaryOp::Sub)
        } else {
            None
        } {
            let right = self.parse_factor()?;
            expr = self.binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_unary()?;
        while let Some(op) = if self.matches(&TokenKind::Star) {
            Some(BinaryOp::Mul)
        } else if self.matches(&TokenKind::Slash) {
            Some(BinaryOp::Div)
        } else if self.matches(&TokenKind::Percent) {
            Some(BinaryOp::Mod)
        } else {
            None
        } {
            let right = self.parse_unary()?;
            expr = self.binary(expr, op, right);
        }
        Ok(expr)
    }

    fn binary(&self, left: Expr, op: BinaryOp, right: Expr) -> Expr {
        Expr {
            loc: left.loc,
            kind: ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, Diagnostic> {
        let op = if self.matches(&TokenKind::Minus) {
            Some(UnaryOp::Negate)
        } else if self.matches(&TokenKind::Bang) {
            Some(UnaryOp::Not)
        } else {
            None
        };
        if let Some(op) = op {
            let loc = self.previous().loc;
            let expr = self.parse_unary()?;
            return Ok(Expr {
                loc,
                kind: ExprKind::Unary {
                    op,
                    expr: Box::new(expr),
                },
            });
        }
        self.parse_call()
    }

    fn parse_call(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_primary()?;
        while self.matches(&TokenKind::LParen) {
            let mut args = Vec::new();
            if !self.check(&TokenKind::RParen) {
                loop {
                    args.push(self.parse_expression()?);
                    if !self.matches(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.consume(&TokenKind::RParen, "expected `)` after arguments")?;
            expr = Expr {
                loc: expr.loc,
                kind: ExprKind::Call {
                    callee: Box::new(expr),
                    args,
                },
            };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let token = match self.peek() {
            Some(token) => token.clone(),
            None => return Err(self.error_eof("unexpected end of expression")),
        };
        match &token.kind {
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expr {
                    loc: token.loc,
                    kind: ExprKind::Literal(Literal::Bool(true)),
                })
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expr {
                    loc: token.loc,
                    kind: ExprKind::Literal(Literal::Bool(false)),
                })
            }
            TokenKind::Keyword(Keyword::Nil) => {
                self.advance();
                Ok(Expr {
                    loc: token.loc,
                    kind: ExprKind::Literal(Literal::Nil),
                })
            }
            TokenKind::Keyword(Keyword::Fn) => {
                self.advance();
                let (params, body) = self.parse_function_rest()?;
                Ok(Expr {
                    loc: token.loc,
                    kind: ExprKind::Function(Rc::new(FunctionDef {
                        name: None,
                        params,
                        body,
                    })),
                })
            }
            TokenKind::Number => {
                self.advance();
                let value = match token.literal {
                    Some(TokenLiteral::Number(value)) => value,
                    _ => {
                        return Err(self.error(&token, "number token without a numeric literal"));
                    }
                };
                Ok(Expr {
                    loc: token.loc,
                    kind: ExprKind::Literal(Literal::Number(value)),
                })
            }
            TokenKind::Str => {
                self.advance();
                let value = match token.literal {
                    Some(TokenLiteral::Str(value)) => value,
                    _ => {
                        return Err(self.error(&token, "string token without a string literal"));
                    }
                };
                Ok(Expr {
                    loc: token.loc,
                    kind: ExprKind::Literal(Literal::Str(value)),
                })
            }
            TokenKind::Identifier => {
                self.advance();
                Ok(Expr {
                    loc: token.loc,
                    kind: ExprKind::Variable(token.lexeme),
                })
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.consume(&TokenKind::RParen, "expected `)` after expression")?;
                Ok(inner)
            }
            _ => Err(self.error(&token, "unexpected token in expression")),
        }
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn matches_keyword(&mut self, keyword: Keyword) -> bool {
        if let Some(Token {
            kind: TokenKind::Keyword(k),
            ..
        }) = self.peek()
        {
            if *k == keyword {
                self.advance();
                return true;
            }
        }
        false
    }

    fn consume(&mut self, kind: &TokenKind, message: &str) -> Result<Token, Diagnostic> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self
                .peek()
                .map(|tok| self.error(tok, message))
                .unwrap_or_else(|| self.error_eof(message)))
        }
    }

    fn consume_keyword(&mut self, keyword: Keyword) -> Result<Token, Diagnostic> {
        self.consume(
            &TokenKind::Keyword(keyword),
            &format!("expected keyword `{keyword:?}`"),
        )
    }

    fn consume_identifier(&mut self, message: &str) -> Result<Token, Diagnostic> {
        self.consume(&TokenKind::Identifier, message)
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek().is_some_and(|token| token.kind == *kind)
    }

    fn next_is_identifier(&self) -> bool {
        self.tokens
            .get(self.current + 1)
            .is_some_and(|token| token.kind == TokenKind::Identifier)
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous().clone()
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.current)
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Eof) | None)
    }

    fn error(&self, token: &Token, message: &str) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::Parser, message).with_location(token.loc)
    }

    fn error_eof(&self, message: &str) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::Parser, message)
    }
}
