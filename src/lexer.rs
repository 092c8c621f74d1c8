//! Token definitions and the tokenizer for Smalltalk source text.
//!
//! The compiler drives this lexer token-by-token while scanning class
//! and method definitions, and re-seeds it after slicing a method body
//! out of the raw text.

use nom::IResult;
use nom::branch::alt;
use nom::bytes::complete::{take_till, take_while};
use nom::character::complete::{char as nchar, digit1, one_of, satisfy};
use nom::combinator::{map, opt, recognize, value};
use nom::error::{ErrorKind, ParseError};
use nom::sequence::{delimited, pair, separated_pair};
use nom_supreme::error::ErrorTree;
use nom_supreme::tag::complete::tag;

use crate::errors::{CompileError, CompileResult};
use crate::memory::SMALL_INT_MAX;

pub type LResult<'a, O> = IResult<&'a str, O, ErrorTree<&'a str>>;

/// Characters that form binary operators, one or two per token.
pub const OPERATOR_CHARS: &str = "+-*/,<>=%~&\\";

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A double-quoted comment.
    Comment(String),
    /// A single-quoted string literal.
    Str(String),
    Number(i64),
    Float(f64),
    LBrack,
    RBrack,
    LParen,
    RParen,
    RShift,
    Caret,
    Period,
    Assign,
    Pipe,
    /// `ident:`, with the trailing colon stripped.
    MessageArg(String),
    Operator(String),
    Ident(String),
}

fn identifier(input: &str) -> LResult<'_, &str> {
    recognize(pair(
        satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

/// Radix-prefixed integer, e.g. `16r1F`.
fn based_number(input: &str) -> LResult<'_, Token> {
    let (rest, (base, digits)) = separated_pair(
        digit1,
        nchar('r'),
        take_while(|c: char| c.is_ascii_alphanumeric()),
    )(input)?;
    let radix: u32 = base.parse().unwrap_or(0);
    if !(2..=36).contains(&radix) {
        return Err(nom::Err::Error(ErrorTree::from_error_kind(
            input,
            ErrorKind::Digit,
        )));
    }
    match i64::from_str_radix(digits, radix) {
        Ok(n) if n <= SMALL_INT_MAX => Ok((rest, Token::Number(n))),
        _ => Err(nom::Err::Failure(ErrorTree::from_error_kind(
            input,
            ErrorKind::TooLarge,
        ))),
    }
}

fn float_number(input: &str) -> LResult<'_, Token> {
    let (rest, text) = recognize(pair(
        pair(opt(nchar('-')), digit1),
        pair(
            pair(nchar('.'), digit1),
            opt(pair(nchar('e'), pair(opt(nchar('-')), digit1))),
        ),
    ))(input)?;
    match text.parse::<f64>() {
        Ok(f) => Ok((rest, Token::Float(f))),
        Err(_) => Err(nom::Err::Error(ErrorTree::from_error_kind(
            input,
            ErrorKind::Float,
        ))),
    }
}

fn dec_number(input: &str) -> LResult<'_, Token> {
    let (rest, text) = recognize(pair(opt(nchar('-')), digit1))(input)?;
    match text.parse::<i64>() {
        Ok(n) if n.unsigned_abs() <= SMALL_INT_MAX as u64 => Ok((rest, Token::Number(n))),
        _ => Err(nom::Err::Failure(ErrorTree::from_error_kind(
            input,
            ErrorKind::TooLarge,
        ))),
    }
}

fn comment(input: &str) -> LResult<'_, Token> {
    map(
        delimited(nchar('"'), take_till(|c| c == '"'), nchar('"')),
        |s: &str| Token::Comment(s.to_string()),
    )(input)
}

fn string_literal(input: &str) -> LResult<'_, Token> {
    map(
        delimited(nchar('\''), take_till(|c| c == '\''), nchar('\'')),
        |s: &str| Token::Str(s.to_string()),
    )(input)
}

fn message_arg(input: &str) -> LResult<'_, Token> {
    map(
        recognize(pair(identifier, nchar(':'))),
        |s: &str| Token::MessageArg(s.trim_end_matches(':').to_string()),
    )(input)
}

fn operator(input: &str) -> LResult<'_, Token> {
    map(
        recognize(pair(one_of(OPERATOR_CHARS), opt(one_of(OPERATOR_CHARS)))),
        |s: &str| Token::Operator(s.to_string()),
    )(input)
}

fn lex_token(input: &str) -> LResult<'_, Token> {
    alt((
        based_number,
        float_number,
        dec_number,
        comment,
        string_literal,
        value(Token::LBrack, nchar('[')),
        value(Token::RBrack, nchar(']')),
        value(Token::LParen, nchar('(')),
        value(Token::RParen, nchar(')')),
        value(Token::Assign, tag(":=")),
        value(Token::RShift, tag(">>")),
        value(Token::Caret, nchar('^')),
        value(Token::Period, nchar('.')),
        value(Token::Pipe, nchar('|')),
        message_arg,
        map(identifier, |s| Token::Ident(s.to_string())),
        operator,
    ))(input)
}

/// Cursor over source text, yielding one token at a time. Cloning
/// gives a lookahead probe; `set_input` re-seeds the cursor after the
/// compiler has sliced text out by hand.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    rest: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str) -> Lexer<'a> {
        Lexer { rest: text }
    }

    pub fn set_input(&mut self, text: &'a str) {
        self.rest = text;
    }

    /// The unconsumed input.
    pub fn remainder(&self) -> &'a str {
        self.rest
    }

    /// The next token, or None at end of input.
    pub fn token(&mut self) -> CompileResult<Option<Token>> {
        let trimmed = self.rest.trim_start();
        if trimmed.is_empty() {
            self.rest = trimmed;
            return Ok(None);
        }
        match lex_token(trimmed) {
            Ok((rest, tok)) => {
                self.rest = rest;
                Ok(Some(tok))
            }
            Err(nom::Err::Failure(_)) => Err(CompileError::IntegerTooLarge(
                trimmed.chars().take(24).collect(),
            )),
            Err(_) => Err(CompileError::Syntax(format!(
                "unrecognized token at `{}`",
                trimmed.chars().take(24).collect::<String>()
            ))),
        }
    }

    /// The next token that is not a comment.
    pub fn significant_token(&mut self) -> CompileResult<Option<Token>> {
        loop {
            match self.token()? {
                Some(Token::Comment(_)) => continue,
                other => return Ok(other),
            }
        }
    }

    /// Look at the next non-comment token without consuming it.
    pub fn peek_significant(&self) -> CompileResult<Option<Token>> {
        self.clone().significant_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_tokens(text: &str) -> Vec<Token> {
        let mut lex = Lexer::new(text);
        let mut out = Vec::new();
        while let Some(tok) = lex.token().expect("lex") {
            out.push(tok);
        }
        out
    }

    #[test]
    fn lexes_a_method_header() {
        let toks = all_tokens("at: anIndex put: aValue [");
        assert_eq!(
            toks,
            vec![
                Token::MessageArg("at".into()),
                Token::Ident("anIndex".into()),
                Token::MessageArg("put".into()),
                Token::Ident("aValue".into()),
                Token::LBrack,
            ]
        );
    }

    #[test]
    fn lexes_assignment_and_return() {
        let toks = all_tokens("x := 5. ^x");
        assert_eq!(
            toks,
            vec![
                Token::Ident("x".into()),
                Token::Assign,
                Token::Number(5),
                Token::Period,
                Token::Caret,
                Token::Ident("x".into()),
            ]
        );
    }

    #[test]
    fn lexes_class_side_marker() {
        let toks = all_tokens("Object class >> new [");
        assert_eq!(
            toks,
            vec![
                Token::Ident("Object".into()),
                Token::Ident("class".into()),
                Token::RShift,
                Token::Ident("new".into()),
                Token::LBrack,
            ]
        );
    }

    #[test]
    fn comments_and_strings_are_distinct() {
        let toks = all_tokens("\"a note\" 'a string'");
        assert_eq!(
            toks,
            vec![
                Token::Comment("a note".into()),
                Token::Str("a string".into()),
            ]
        );
    }

    #[test]
    fn lexes_based_and_negative_numbers() {
        assert_eq!(all_tokens("16r1F"), vec![Token::Number(31)]);
        assert_eq!(all_tokens("-42"), vec![Token::Number(-42)]);
    }

    #[test]
    fn operators_take_at_most_two_characters() {
        let toks = all_tokens("a >= b");
        assert_eq!(
            toks,
            vec![
                Token::Ident("a".into()),
                Token::Operator(">=".into()),
                Token::Ident("b".into()),
            ]
        );
    }

    #[test]
    fn oversized_integer_is_an_error() {
        let mut lex = Lexer::new("123456789123456789123456789");
        assert!(lex.token().is_err());
    }

    #[test]
    fn peek_does_not_consume() {
        let lex = Lexer::new("\"doc\" foo");
        assert_eq!(
            lex.peek_significant().expect("peek"),
            Some(Token::Ident("foo".into()))
        );
        assert_eq!(lex.remainder(), "\"doc\" foo");
    }
}
