//! The statement parser: turns the body text of a method or block
//! into the AST the compiler consumes.
//!
//! Grammar, tightest first: primary (literal, identifier, block,
//! parenthesized expression), unary chains, left-associative binary
//! chains, then keyword messages whose parts combine into a single
//! selector. Statements are period-separated; `^` returns and `:=`
//! assignments wrap an expression.

pub mod ast;

use nom::Finish;
use nom::IResult;
use nom::branch::alt;
use nom::bytes::complete::{take_till, take_while};
use nom::character::complete::{char as nchar, digit1, multispace1, one_of, satisfy};
use nom::combinator::{eof, map, opt, recognize, value};
use nom::error::{ErrorKind, ParseError, context};
use nom::multi::{many0, separated_list0};
use nom::sequence::{delimited, pair, preceded, terminated};
use nom_supreme::error::ErrorTree;
use nom_supreme::tag::complete::tag;

use crate::errors::{CompileError, CompileResult};
use crate::lexer::OPERATOR_CHARS;
use crate::memory::SMALL_INT_MAX;

use self::ast::{Expr, KeywordPart, Stmt};

pub type PResult<'a, O> = IResult<&'a str, O, ErrorTree<&'a str>>;

/// Whitespace, where double-quoted comments also count.
fn ws(input: &str) -> PResult<'_, ()> {
    value(
        (),
        many0(alt((
            value((), multispace1),
            value((), delimited(nchar('"'), take_till(|c| c == '"'), nchar('"'))),
        ))),
    )(input)
}

/// Wrap a parser so it skips leading whitespace and comments.
fn sws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> PResult<'a, O>
where
    F: FnMut(&'a str) -> PResult<'a, O>,
{
    preceded(ws, inner)
}

fn identifier(input: &str) -> PResult<'_, String> {
    map(
        recognize(pair(
            satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'),
            take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        )),
        str::to_string,
    )(input)
}

fn based_integer(input: &str) -> PResult<'_, i64> {
    let (rest, (base, digits)) = pair(
        terminated(digit1, nchar('r')),
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
        Ok(n) if n <= SMALL_INT_MAX => Ok((rest, n)),
        _ => Err(nom::Err::Failure(ErrorTree::from_error_kind(
            input,
            ErrorKind::TooLarge,
        ))),
    }
}

/// A decimal small integer. A literal past the tagged range is a hard
/// failure, not an alternative.
fn dec_integer(input: &str) -> PResult<'_, i64> {
    let (rest, text) = recognize(pair(opt(nchar('-')), digit1))(input)?;
    match text.parse::<i64>() {
        Ok(n) if n.unsigned_abs() <= SMALL_INT_MAX as u64 => Ok((rest, n)),
        _ => Err(nom::Err::Failure(ErrorTree::from_error_kind(
            input,
            ErrorKind::TooLarge,
        ))),
    }
}

fn integer(input: &str) -> PResult<'_, i64> {
    alt((based_integer, dec_integer))(input)
}

fn string_literal(input: &str) -> PResult<'_, String> {
    map(
        delimited(nchar('\''), take_till(|c| c == '\''), nchar('\'')),
        str::to_string,
    )(input)
}

fn block(input: &str) -> PResult<'_, Expr> {
    map(
        delimited(nchar('['), statement_list, sws(nchar(']'))),
        Expr::Block,
    )(input)
}

fn paren(input: &str) -> PResult<'_, Expr> {
    delimited(nchar('('), expression, sws(nchar(')')))(input)
}

fn primary(input: &str) -> PResult<'_, Expr> {
    sws(context(
        "primary expression",
        alt((
            map(integer, Expr::Integer),
            map(string_literal, Expr::Str),
            block,
            paren,
            map(identifier, Expr::Identifier),
        )),
    ))(input)
}

/// An identifier not introducing a keyword part.
fn unary_selector(input: &str) -> PResult<'_, String> {
    let (rest, _) = ws(input)?;
    let (after, name) = identifier(rest)?;
    if after.starts_with(':') {
        return Err(nom::Err::Error(ErrorTree::from_error_kind(
            rest,
            ErrorKind::Tag,
        )));
    }
    Ok((after, name))
}

fn unary_expression(input: &str) -> PResult<'_, Expr> {
    let (mut rest, mut expr) = primary(input)?;
    while let Ok((after, selector)) = unary_selector(rest) {
        expr = Expr::Unary {
            receiver: Box::new(expr),
            selector,
        };
        rest = after;
    }
    Ok((rest, expr))
}

fn binary_operator(input: &str) -> PResult<'_, String> {
    map(
        recognize(pair(one_of(OPERATOR_CHARS), opt(one_of(OPERATOR_CHARS)))),
        str::to_string,
    )(input)
}

fn binary_expression(input: &str) -> PResult<'_, Expr> {
    let (mut rest, mut expr) = unary_expression(input)?;
    loop {
        match sws(binary_operator)(rest) {
            Ok((after, selector)) => {
                let (after, argument) = unary_expression(after)?;
                expr = Expr::Binary {
                    receiver: Box::new(expr),
                    selector,
                    argument: Box::new(argument),
                };
                rest = after;
            }
            Err(_) => break,
        }
    }
    Ok((rest, expr))
}

fn keyword_part(input: &str) -> PResult<'_, KeywordPart> {
    let (rest, _) = ws(input)?;
    let (rest, name) = terminated(identifier, nchar(':'))(rest)?;
    let (rest, value) = binary_expression(rest)?;
    Ok((rest, KeywordPart { name, value }))
}

fn keyword_expression(input: &str) -> PResult<'_, Expr> {
    let (rest, receiver) = binary_expression(input)?;
    let (rest, parts) = many0(keyword_part)(rest)?;
    if parts.is_empty() {
        Ok((rest, receiver))
    } else {
        Ok((
            rest,
            Expr::Keyword {
                receiver: Box::new(receiver),
                parts,
            },
        ))
    }
}

fn expression(input: &str) -> PResult<'_, Expr> {
    keyword_expression(input)
}

fn return_statement(input: &str) -> PResult<'_, Stmt> {
    map(preceded(sws(nchar('^')), expression), Stmt::Return)(input)
}

fn assign_statement(input: &str) -> PResult<'_, Stmt> {
    let (rest, target) = sws(identifier)(input)?;
    let (rest, _) = sws(tag(":="))(rest)?;
    let (rest, value) = expression(rest)?;
    Ok((rest, Stmt::Assign { target, value }))
}

fn statement(input: &str) -> PResult<'_, Stmt> {
    context(
        "statement",
        alt((
            return_statement,
            assign_statement,
            map(expression, Stmt::Exec),
        )),
    )(input)
}

/// Period-separated statements with an optional trailing period.
fn statement_list(input: &str) -> PResult<'_, Vec<Stmt>> {
    let (rest, stmts) = separated_list0(sws(nchar('.')), statement)(input)?;
    let (rest, _) = opt(sws(nchar('.')))(rest)?;
    Ok((rest, stmts))
}

/// Parse the body of a method or block into its statement list.
pub fn parse_statements(input: &str) -> CompileResult<Vec<Stmt>> {
    match terminated(statement_list, sws(eof))(input).finish() {
        Ok((_, stmts)) => Ok(stmts),
        Err(e) => Err(CompileError::Syntax(format!("bad statements: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::ast::{Expr, Stmt};
    use super::parse_statements;

    fn one(src: &str) -> Stmt {
        let mut stmts = parse_statements(src).expect("parse");
        assert_eq!(stmts.len(), 1, "expected one statement in {src:?}");
        stmts.remove(0)
    }

    #[test]
    fn parses_return_of_self() {
        assert_eq!(
            one("^self"),
            Stmt::Return(Expr::Identifier("self".into()))
        );
    }

    #[test]
    fn parses_assignment() {
        assert_eq!(
            one("x := 5"),
            Stmt::Assign {
                target: "x".into(),
                value: Expr::Integer(5)
            }
        );
    }

    #[test]
    fn unary_chains_bind_left() {
        let Stmt::Exec(Expr::Unary { receiver, selector }) = one("self foo bar") else {
            panic!("expected unary chain");
        };
        assert_eq!(selector, "bar");
        assert_eq!(
            *receiver,
            Expr::Unary {
                receiver: Box::new(Expr::Identifier("self".into())),
                selector: "foo".into()
            }
        );
    }

    #[test]
    fn binary_chains_are_left_associative() {
        let Stmt::Exec(Expr::Binary {
            receiver, selector, ..
        }) = one("3 + 4 * 5")
        else {
            panic!("expected binary expression");
        };
        assert_eq!(selector, "*");
        assert_eq!(
            *receiver,
            Expr::Binary {
                receiver: Box::new(Expr::Integer(3)),
                selector: "+".into(),
                argument: Box::new(Expr::Integer(4))
            }
        );
    }

    #[test]
    fn unary_binds_tighter_than_binary() {
        let Stmt::Exec(Expr::Binary {
            receiver, argument, ..
        }) = one("a foo + b bar")
        else {
            panic!("expected binary expression");
        };
        assert!(matches!(*receiver, Expr::Unary { .. }));
        assert!(matches!(*argument, Expr::Unary { .. }));
    }

    #[test]
    fn keyword_parts_collect_in_order() {
        let Stmt::Exec(Expr::Keyword { receiver, parts }) = one("self at: 1 put: 2") else {
            panic!("expected keyword message");
        };
        assert_eq!(*receiver, Expr::Identifier("self".into()));
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].name, "at");
        assert_eq!(parts[0].value, Expr::Integer(1));
        assert_eq!(parts[1].name, "put");
        assert_eq!(parts[1].value, Expr::Integer(2));
    }

    #[test]
    fn keyword_arguments_may_be_binary_expressions() {
        let Stmt::Exec(Expr::Keyword { parts, .. }) = one("self at: 1 + 2") else {
            panic!("expected keyword message");
        };
        assert!(matches!(parts[0].value, Expr::Binary { .. }));
    }

    #[test]
    fn parenthesized_receiver() {
        let Stmt::Exec(Expr::Unary { receiver, .. }) = one("(a foo: 1) yourself") else {
            panic!("expected unary send to parenthesized receiver");
        };
        assert!(matches!(*receiver, Expr::Keyword { .. }));
    }

    #[test]
    fn blocks_nest_and_keep_statements() {
        let Stmt::Exec(Expr::Block(stmts)) = one("[ self foo. 42 ]") else {
            panic!("expected block literal");
        };
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[1], Stmt::Exec(Expr::Integer(42)));
    }

    #[test]
    fn statements_separate_on_periods() {
        let stmts = parse_statements("self foo. x := 2. ^x").expect("parse");
        assert_eq!(stmts.len(), 3);
        assert!(matches!(stmts[2], Stmt::Return(_)));
    }

    #[test]
    fn trailing_period_is_allowed() {
        let stmts = parse_statements("self foo.").expect("parse");
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn comments_read_as_whitespace() {
        let stmts = parse_statements("\"answer the receiver\" ^self").expect("parse");
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn oversized_literal_is_rejected() {
        assert!(parse_statements("^123456789123456789123456789").is_err());
    }

    #[test]
    fn string_literals_parse() {
        assert_eq!(
            one("^'hello'"),
            Stmt::Return(Expr::Str("hello".into()))
        );
    }

    #[test]
    fn empty_body_is_an_empty_list() {
        assert!(parse_statements("  \"just a comment\"  ").expect("parse").is_empty());
    }
}
