//! Scans a raw formula string and produces a stream of Tokens.
//!
//! This is the first stage of the parsing pipeline. It handles whitespace
//! skipping, number parsing, and quoted identifiers for field names that
//! contain spaces.
//!
//! SUPPORTED OPERATORS:
//! - Single char: + - * / ^ ( ) ,
//! - Quoted identifiers: 'Net Sales'

use crate::token::Token;
use std::iter::Peekable;
use std::str::Chars;

pub struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input: input.chars().peekable(),
        }
    }

    /// Advances the lexer and returns the next token.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        match self.input.next() {
            Some('+') => Token::Plus,
            Some('-') => Token::Minus,
            Some('*') => Token::Asterisk,
            Some('/') => Token::Slash,
            Some('^') => Token::Caret,
            Some('(') => Token::LParen,
            Some(')') => Token::RParen,
            Some(',') => Token::Comma,

            // Handle single quotes for field names with spaces
            Some('\'') => self.read_quoted_identifier(),

            // Handle Numbers (starts with digit or dot)
            Some(ch) if ch.is_ascii_digit() || ch == '.' => self.read_number(ch),

            // Handle Identifiers (starts with letter or underscore)
            Some(ch) if is_letter(ch) => self.read_identifier(ch),

            // End of input
            None => Token::EOF,

            // Unknown character
            Some(ch) => Token::Illegal(ch),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(&ch) = self.input.peek() {
            if !ch.is_whitespace() {
                break;
            }
            self.input.next();
        }
    }

    /// Reads a quoted identifier (field name with spaces): 'Net Sales'
    fn read_quoted_identifier(&mut self) -> Token {
        let mut result = String::new();
        while let Some(&ch) = self.input.peek() {
            if ch == '\'' {
                // Check for escaped single quote ('')
                self.input.next();
                if self.input.peek() == Some(&'\'') {
                    // Escaped quote - add one quote and continue
                    result.push('\'');
                    self.input.next();
                } else {
                    // End of quoted identifier
                    return Token::QuotedIdentifier(result);
                }
            } else {
                result.push(ch);
                self.input.next();
            }
        }
        // If we hit EOF without closing quote, return what we have
        Token::QuotedIdentifier(result)
    }

    fn read_number(&mut self, first_char: char) -> Token {
        let mut number_str = String::from(first_char);
        let mut has_dot = first_char == '.';

        while let Some(&ch) = self.input.peek() {
            if ch.is_ascii_digit() {
                number_str.push(ch);
                self.input.next();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                number_str.push(ch);
                self.input.next();
            } else {
                break;
            }
        }

        if let Ok(n) = number_str.parse::<f64>() {
            Token::Number(n)
        } else {
            // Fallback if parsing fails (e.g. just ".")
            Token::Illegal(first_char)
        }
    }

    fn read_identifier(&mut self, first_char: char) -> Token {
        let mut ident = String::from(first_char);

        while let Some(&ch) = self.input.peek() {
            // Allow letters, digits, '_' and '.' as continuation characters.
            // '.' supports dotted field names like "order.total".
            if is_letter(ch) || ch.is_ascii_digit() || ch == '.' {
                ident.push(ch);
                self.input.next();
            } else {
                break;
            }
        }

        // Case is preserved: record field names are case-sensitive.
        Token::Identifier(ident)
    }
}

/// Returns true if `ch` can start an identifier.
fn is_letter(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}
