//! Token definitions for the formula lexer.
//!
//! Tokens are the atomic units produced by the lexer and consumed by the
//! parser.

/// Tokens recognized by the formula lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    // Literals
    Number(f64),
    /// A bare variable or function name: revenue, net_income, ROUND.
    Identifier(String),
    /// Quoted identifier for field names with spaces: 'Net Sales'
    QuotedIdentifier(String),

    // Operators
    Plus,
    Minus,
    Asterisk,
    Slash,
    Caret,

    // Delimiters
    LParen,
    RParen,
    Comma,

    // Special
    EOF,
    Illegal(char),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Identifier(s) => write!(f, "{}", s),
            Token::QuotedIdentifier(s) => write!(f, "'{}'", s),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Asterisk => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Caret => write!(f, "^"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::EOF => write!(f, "EOF"),
            Token::Illegal(c) => write!(f, "ILLEGAL({})", c),
        }
    }
}
