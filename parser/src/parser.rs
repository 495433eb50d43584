//! Recursive descent parser that converts a stream of Tokens into an AST.
//!
//! This is the second stage of the parsing pipeline. It takes tokens from
//! the Lexer and builds an Expression tree for the engine to interpret.
//!
//! GRAMMAR:
//!   expression     --> additive
//!   additive       --> multiplicative ( ("+" | "-") multiplicative )*
//!   multiplicative --> unary ( ("*" | "/") unary )*
//!   unary          --> "-" unary | power
//!   power          --> primary ( "^" unary )?
//!   primary        --> NUMBER | variable | function_call | "(" expression ")"
//!   variable       --> IDENTIFIER | QUOTED_IDENTIFIER
//!   function_call  --> IDENTIFIER "(" arguments? ")"
//!   arguments      --> expression ("," expression)*

use crate::ast::{BinaryOperator, Expression, UnaryOperator};
use crate::lexer::Lexer;
use crate::token::Token;

/// Parser errors with descriptive messages.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        ParseError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;

/// The Parser struct holds the lexer and current token state.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current_token: Token,
}

impl<'a> Parser<'a> {
    /// Creates a new parser from an input string.
    /// Automatically advances to the first token.
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token();
        Parser {
            lexer,
            current_token,
        }
    }

    /// Parses the entire input and returns the AST.
    pub fn parse(&mut self) -> ParseResult<Expression> {
        // Handle empty formula
        if self.current_token == Token::EOF {
            return Err(ParseError::new("Empty expression"));
        }

        let expr = self.parse_expression()?;

        // Ensure we consumed all tokens
        if self.current_token != Token::EOF {
            return Err(ParseError::new(format!(
                "Unexpected token after expression: {:?}",
                self.current_token
            )));
        }

        Ok(expr)
    }

    /// Advances to the next token.
    fn advance(&mut self) {
        self.current_token = self.lexer.next_token();
    }

    /// Checks if the current token matches the expected token.
    /// If it matches, advances and returns Ok. Otherwise returns an error.
    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        if self.current_token == expected {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::new(format!(
                "Expected {:?}, found {:?}",
                expected, self.current_token
            )))
        }
    }

    /// Entry point for expression parsing.
    fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_additive()
    }

    /// Parses additive expressions (+ and -).
    fn parse_additive(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match &self.current_token {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Subtract,
                _ => break,
            };

            self.advance();
            let right = self.parse_multiplicative()?;

            left = Expression::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parses multiplicative expressions (* and /).
    fn parse_multiplicative(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match &self.current_token {
                Token::Asterisk => BinaryOperator::Multiply,
                Token::Slash => BinaryOperator::Divide,
                _ => break,
            };

            self.advance();
            let right = self.parse_unary()?;

            left = Expression::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parses unary expressions (negation).
    fn parse_unary(&mut self) -> ParseResult<Expression> {
        if self.current_token == Token::Minus {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expression::UnaryOp {
                op: UnaryOperator::Negate,
                operand: Box::new(operand),
            });
        }

        self.parse_power()
    }

    /// Parses power expressions (^). Right-associative: 2^3^2 = 2^(3^2).
    fn parse_power(&mut self) -> ParseResult<Expression> {
        let base = self.parse_primary()?;

        if self.current_token == Token::Caret {
            self.advance();
            let exponent = self.parse_unary()?;
            return Ok(Expression::BinaryOp {
                left: Box::new(base),
                op: BinaryOperator::Power,
                right: Box::new(exponent),
            });
        }

        Ok(base)
    }

    /// Parses primary expressions: literals, variables, function calls,
    /// and parenthesized expressions.
    fn parse_primary(&mut self) -> ParseResult<Expression> {
        match self.current_token.clone() {
            Token::Number(n) => {
                self.advance();
                Ok(Expression::Number(n))
            }

            Token::QuotedIdentifier(name) => {
                self.advance();
                Ok(Expression::Variable(name))
            }

            Token::Identifier(name) => {
                self.advance();
                // An identifier followed by '(' is a function call,
                // otherwise it is a variable reference.
                if self.current_token == Token::LParen {
                    self.parse_function_call(name)
                } else {
                    Ok(Expression::Variable(name))
                }
            }

            Token::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }

            Token::EOF => Err(ParseError::new("Unexpected end of expression")),

            token => Err(ParseError::new(format!("Unexpected token: {:?}", token))),
        }
    }

    /// Parses a function call's argument list. The name has already been
    /// consumed and the current token is the opening parenthesis.
    fn parse_function_call(&mut self, name: String) -> ParseResult<Expression> {
        self.expect(Token::LParen)?;

        let mut args = Vec::new();

        if self.current_token != Token::RParen {
            loop {
                args.push(self.parse_expression()?);

                if self.current_token == Token::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        self.expect(Token::RParen)?;

        Ok(Expression::FunctionCall { name, args })
    }
}

/// Convenience function: parses a formula string into an AST.
pub fn parse(input: &str) -> ParseResult<Expression> {
    Parser::new(input).parse()
}
