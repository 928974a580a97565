//! Lexer for the rule and partial-state syntax.
//!
//! Uses Logos for fast, compile-time optimized tokenization.

use logos::{Logos, Span};

/// Token type for rule declarations, partial states, and rate expressions
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token<'src> {
    // === Comments ===
    #[regex(r"#[^\n]*", logos::skip)]
    #[regex(r";[^\n]*", logos::skip)]
    Comment,

    // === Literals ===
    /// Numeric literal (integer, decimal, or scientific notation)
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice())]
    #[regex(r"[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice())]
    Number(&'src str),

    // === Identifiers ===
    /// Attribute names, attribute values, parameter names, and the query
    /// functions `NN`/`MF` (resolved by the parser, not the lexer)
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice())]
    Ident(&'src str),

    // === Punctuation ===
    #[token("{")]
    BraceOpen,
    #[token("}")]
    BraceClose,
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token("->")]
    Arrow,
    #[token("=")]
    Equals,

    // === Operators ===
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
}

/// A token with its source span
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub token: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(token: T, span: Span) -> Self {
        Self { token, span }
    }
}

/// Tokenize source text into a vector of spanned tokens
pub fn lex(source: &str) -> Result<Vec<Spanned<Token<'_>>>, LexError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => {
                // The Comment variant is skipped by logos but still exists
                if !matches!(token, Token::Comment) {
                    tokens.push(Spanned::new(token, lexer.span()));
                }
            }
            Err(()) => {
                return Err(LexError {
                    span: lexer.span(),
                    slice: lexer.slice().to_string(),
                });
            }
        }
    }

    Ok(tokens)
}

/// Error during lexing
#[derive(Debug, Clone)]
pub struct LexError {
    pub span: Span,
    pub slice: String,
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unexpected character(s) '{}' at {:?}",
            self.slice, self.span
        )
    }
}

impl std::error::Error for LexError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_state_tokens() {
        let tokens = lex("{status:S, age:old}").unwrap();
        assert_eq!(tokens.len(), 9);
        assert_eq!(tokens[0].token, Token::BraceOpen);
        assert_eq!(tokens[1].token, Token::Ident("status"));
        assert_eq!(tokens[2].token, Token::Colon);
        assert_eq!(tokens[3].token, Token::Ident("S"));
        assert_eq!(tokens[4].token, Token::Comma);
        assert_eq!(tokens[8].token, Token::BraceClose);
    }

    #[test]
    fn test_numbers() {
        let tokens = lex("42 3.14 1e10 5.67e-8").unwrap();
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0].token, Token::Number("42"));
        assert_eq!(tokens[1].token, Token::Number("3.14"));
        assert_eq!(tokens[2].token, Token::Number("1e10"));
        assert_eq!(tokens[3].token, Token::Number("5.67e-8"));
    }

    #[test]
    fn test_rule_line() {
        let tokens = lex("{status:S} -> {status:I} = NN({status:I}) * beta").unwrap();
        let arrow = tokens.iter().position(|t| t.token == Token::Arrow);
        let equals = tokens.iter().position(|t| t.token == Token::Equals);
        assert_eq!(arrow, Some(5));
        assert!(equals > arrow);
        assert_eq!(tokens.last().unwrap().token, Token::Ident("beta"));
    }

    #[test]
    fn test_operators() {
        let tokens = lex("+ - * / -> =").unwrap();
        assert_eq!(tokens.len(), 6);
        assert_eq!(tokens[0].token, Token::Plus);
        assert_eq!(tokens[1].token, Token::Minus);
        assert_eq!(tokens[2].token, Token::Star);
        assert_eq!(tokens[3].token, Token::Slash);
        assert_eq!(tokens[4].token, Token::Arrow);
        assert_eq!(tokens[5].token, Token::Equals);
    }

    #[test]
    fn test_arrow_not_split() {
        // `->` must lex as one token, not Minus followed by something
        let tokens = lex("a->b").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].token, Token::Arrow);
    }

    #[test]
    fn test_comments_skipped() {
        let tokens = lex("beta # trailing comment\ngamma").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].token, Token::Ident("beta"));
        assert_eq!(tokens[1].token, Token::Ident("gamma"));
    }

    #[test]
    fn test_unexpected_character() {
        let err = lex("beta $ gamma").unwrap_err();
        assert_eq!(err.slice, "$");
    }
}
