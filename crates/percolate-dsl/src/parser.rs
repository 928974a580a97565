//! Hand-written recursive descent parser over the token stream.
//!
//! The grammar is small: partial states `{attr:value, attr:(v1, v2), ...}`,
//! rule mappings `partial -> partial`, and arithmetic rate expressions with
//! the query functions `NN(...)` and `MF(...)`.

use logos::Span;

use crate::ast::{BinaryOp, Expr, PartialStateExpr, RuleDecl};
use crate::lexer::{self, Spanned, Token};

/// Parse error with source location and context
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    /// Kind of parse error
    pub kind: ParseErrorKind,
    /// Byte span in the source text where the error occurred
    pub span: Span,
    /// Human-readable error message
    pub message: String,
}

/// Category of parse error
#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    /// Unexpected token (found X, expected Y)
    UnexpectedToken,
    /// Unexpected end of input
    UnexpectedEof,
    /// Invalid syntax
    InvalidSyntax,
    /// Lexer rejected the input
    Lex,
}

impl ParseError {
    fn expected(what: &str, found: Option<&Spanned<Token<'_>>>, fallback: Span) -> Self {
        match found {
            Some(t) => Self {
                kind: ParseErrorKind::UnexpectedToken,
                span: t.span.clone(),
                message: format!("expected {}, found {:?}", what, t.token),
            },
            None => Self {
                kind: ParseErrorKind::UnexpectedEof,
                span: fallback,
                message: format!("expected {}, found end of input", what),
            },
        }
    }

    fn invalid_syntax(message: impl Into<String>, span: Span) -> Self {
        Self {
            kind: ParseErrorKind::InvalidSyntax,
            span,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {:?}", self.message, self.span)
    }
}

impl std::error::Error for ParseError {}

impl From<lexer::LexError> for ParseError {
    fn from(err: lexer::LexError) -> Self {
        Self {
            kind: ParseErrorKind::Lex,
            span: err.span,
            message: format!("unexpected character(s) '{}'", err.slice),
        }
    }
}

/// Token stream with lookahead and position tracking
struct TokenStream<'src> {
    tokens: Vec<Spanned<Token<'src>>>,
    pos: usize,
    end: Span,
}

impl<'src> TokenStream<'src> {
    fn new(source: &'src str) -> Result<Self, ParseError> {
        let tokens = lexer::lex(source)?;
        let end = source.len()..source.len();
        Ok(Self {
            tokens,
            pos: 0,
            end,
        })
    }

    fn peek(&self) -> Option<&Spanned<Token<'src>>> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Spanned<Token<'src>>> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Consume the current token if it matches, otherwise leave it in place
    fn eat(&mut self, expected: &Token<'src>) -> bool {
        if self.peek().map(|t| &t.token) == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token<'src>, what: &str) -> Result<(), ParseError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(ParseError::expected(what, self.peek(), self.end.clone()))
        }
    }

    fn expect_end(&self) -> Result<(), ParseError> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(ParseError::invalid_syntax(
                format!("trailing input after expression: {:?}", t.token),
                t.span.clone(),
            )),
        }
    }
}

/// Parse a partial state from text, e.g. `{status:S, age:(young, old)}`
pub fn parse_partial_state_str(source: &str) -> Result<PartialStateExpr, ParseError> {
    let mut stream = TokenStream::new(source)?;
    let state = partial_state(&mut stream)?;
    stream.expect_end()?;
    Ok(state)
}

/// Parse a rate expression from text
pub fn parse_expr_str(source: &str) -> Result<Expr, ParseError> {
    let mut stream = TokenStream::new(source)?;
    let e = expr(&mut stream)?;
    stream.expect_end()?;
    Ok(e)
}

/// Parse a complete rule declaration `partial -> partial = expression`
pub fn parse_rule_str(source: &str) -> Result<RuleDecl, ParseError> {
    let mut stream = TokenStream::new(source)?;
    let src = partial_state(&mut stream)?;
    stream.expect(Token::Arrow, "'->'")?;
    let delta = partial_state(&mut stream)?;
    stream.expect(Token::Equals, "'='")?;
    let rate = expr(&mut stream)?;
    stream.expect_end()?;
    Ok(RuleDecl {
        source: src,
        delta,
        rate,
        text: source.trim().to_string(),
    })
}

// =============================================================================
// Productions
// =============================================================================

/// partial_state := '{' [constraint (',' constraint)*] '}'
/// constraint    := ident ':' (value | '(' value (',' value)* ')')
fn partial_state<'src>(stream: &mut TokenStream<'src>) -> Result<PartialStateExpr, ParseError> {
    stream.expect(Token::BraceOpen, "'{'")?;

    let mut state = PartialStateExpr::empty();
    if stream.eat(&Token::BraceClose) {
        return Ok(state);
    }

    loop {
        let (attr, span) = match stream.advance() {
            Some(Spanned {
                token: Token::Ident(name),
                span,
            }) => (name.to_string(), span.clone()),
            other => {
                let other = other.cloned();
                return Err(ParseError::expected(
                    "attribute name",
                    other.as_ref(),
                    stream.end.clone(),
                ));
            }
        };
        stream.expect(Token::Colon, "':'")?;

        let values = if stream.eat(&Token::ParenOpen) {
            let mut values = vec![state_value(stream)?];
            while stream.eat(&Token::Comma) {
                values.push(state_value(stream)?);
            }
            stream.expect(Token::ParenClose, "')'")?;
            values
        } else {
            vec![state_value(stream)?]
        };

        if state.constraints.insert(attr.clone(), values).is_some() {
            return Err(ParseError::invalid_syntax(
                format!("attribute '{}' constrained twice in one partial state", attr),
                span,
            ));
        }

        if stream.eat(&Token::BraceClose) {
            return Ok(state);
        }
        stream.expect(Token::Comma, "',' or '}'")?;
    }
}

/// A value token inside a partial state: an identifier or a bare number
fn state_value<'src>(stream: &mut TokenStream<'src>) -> Result<String, ParseError> {
    match stream.advance() {
        Some(Spanned {
            token: Token::Ident(v),
            ..
        }) => Ok(v.to_string()),
        Some(Spanned {
            token: Token::Number(v),
            ..
        }) => Ok(v.to_string()),
        other => {
            let other = other.cloned();
            Err(ParseError::expected(
                "attribute value",
                other.as_ref(),
                stream.end.clone(),
            ))
        }
    }
}

/// expr := term (('+' | '-') term)*
fn expr<'src>(stream: &mut TokenStream<'src>) -> Result<Expr, ParseError> {
    let mut lhs = term(stream)?;
    loop {
        let op = if stream.eat(&Token::Plus) {
            BinaryOp::Add
        } else if stream.eat(&Token::Minus) {
            BinaryOp::Sub
        } else {
            return Ok(lhs);
        };
        let rhs = term(stream)?;
        lhs = Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        };
    }
}

/// term := factor (('*' | '/') factor)*
fn term<'src>(stream: &mut TokenStream<'src>) -> Result<Expr, ParseError> {
    let mut lhs = factor(stream)?;
    loop {
        let op = if stream.eat(&Token::Star) {
            BinaryOp::Mul
        } else if stream.eat(&Token::Slash) {
            BinaryOp::Div
        } else {
            return Ok(lhs);
        };
        let rhs = factor(stream)?;
        lhs = Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        };
    }
}

/// factor := '-' factor | number | '(' expr ')' | query | ident
fn factor<'src>(stream: &mut TokenStream<'src>) -> Result<Expr, ParseError> {
    if stream.eat(&Token::Minus) {
        return Ok(Expr::Neg(Box::new(factor(stream)?)));
    }

    let spanned = stream.advance().cloned();
    match spanned {
        Some(Spanned {
            token: Token::Number(text),
            span,
        }) => text
            .parse::<f64>()
            .map(Expr::Number)
            .map_err(|_| ParseError::invalid_syntax(format!("invalid number '{}'", text), span)),
        Some(Spanned {
            token: Token::ParenOpen,
            ..
        }) => {
            let inner = expr(stream)?;
            stream.expect(Token::ParenClose, "')'")?;
            Ok(inner)
        }
        Some(Spanned {
            token: Token::Ident("NN"),
            ..
        }) => {
            stream.expect(Token::ParenOpen, "'(' after NN")?;
            let state = partial_state(stream)?;
            let edge = if stream.eat(&Token::Comma) {
                Some(partial_state(stream)?)
            } else {
                None
            };
            stream.expect(Token::ParenClose, "')'")?;
            Ok(Expr::NeighborCount { state, edge })
        }
        Some(Spanned {
            token: Token::Ident("MF"),
            span,
        }) => {
            stream.expect(Token::ParenOpen, "'(' after MF")?;
            let state = partial_state(stream)?;
            stream.expect(Token::ParenClose, "')'")?;
            if state.is_empty() {
                // MF({}) is always 1.0 and almost certainly a mistake
                return Err(ParseError::invalid_syntax(
                    "MF requires a non-empty partial state",
                    span,
                ));
            }
            Ok(Expr::MeanField(state))
        }
        Some(Spanned {
            token: Token::Ident(name),
            ..
        }) => Ok(Expr::Param(name.to_string())),
        other => Err(ParseError::expected(
            "expression",
            other.as_ref(),
            stream.end.clone(),
        )),
    }
}
