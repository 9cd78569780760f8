//! Requirement line grammar
//!
//! ```text
//! specification = wsp* ( url_req | name_req ) wsp*
//! name_req      = name wsp* extras? wsp* versionspec? wsp* quoted_marker?
//! url_req       = name wsp* extras? wsp* '@' wsp* uri_reference (wsp+ | end) quoted_marker?
//! versionspec   = '(' version_many ')' | version_many
//! ```

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, space0, space1},
    combinator::{all_consuming, eof, map, map_res, opt, verify},
    error::{Error, ErrorKind},
    multi::{separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
};

use crate::parser::error::ParseError;
use crate::parser::marker::marker;
use crate::parser::types::{MarkerTree, Requirement};
use crate::parser::uri::uri_reference;
use crate::version::constraint::{Constraint, Operator};

/// Comparison operator, longest spelling first where one is a prefix of another
pub(crate) fn comparator(i: &str) -> IResult<&str, Operator> {
    map_res(
        alt((
            tag("<="),
            tag("<"),
            tag("!="),
            tag("==="),
            tag("=="),
            tag(">="),
            tag(">"),
            tag("~="),
        )),
        str::parse,
    )(i)
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Letters and digits, with `-_.` allowed only between them
fn identifier(i: &str) -> IResult<&str, &str> {
    let (_, run) = take_while1(is_identifier_char)(i)?;
    if !run.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(nom::Err::Error(Error::new(i, ErrorKind::AlphaNumeric)));
    }
    let len = run
        .trim_end_matches(|c: char| !c.is_ascii_alphanumeric())
        .len();
    Ok((&i[len..], &i[..len]))
}

fn version(i: &str) -> IResult<&str, &str> {
    preceded(
        space0,
        take_while1(|c: char| c.is_ascii_alphanumeric() || "_.*+!-".contains(c)),
    )(i)
}

fn version_one(i: &str) -> IResult<&str, Constraint> {
    map(
        pair(preceded(space0, comparator), version),
        |(op, raw)| Constraint::new(op, raw),
    )(i)
}

fn version_many(i: &str) -> IResult<&str, Vec<Constraint>> {
    separated_list1(pair(space0, char(',')), version_one)(i)
}

fn versionspec(i: &str) -> IResult<&str, Vec<Constraint>> {
    alt((
        delimited(char('('), version_many, preceded(space0, char(')'))),
        version_many,
    ))(i)
}

fn extras(i: &str) -> IResult<&str, Vec<String>> {
    delimited(
        pair(char('['), space0),
        separated_list0(
            tuple((space0, char(','), space0)),
            map(identifier, str::to_string),
        ),
        pair(space0, char(']')),
    )(i)
}

fn quoted_marker(i: &str) -> IResult<&str, MarkerTree> {
    preceded(pair(char(';'), space0), marker)(i)
}

fn name_and_extras(i: &str) -> IResult<&str, (&str, Vec<String>)> {
    let (i, name) = identifier(i)?;
    let (i, _) = space0(i)?;
    let (i, extras) = opt(extras)(i)?;
    let (i, _) = space0(i)?;
    Ok((i, (name, extras.unwrap_or_default())))
}

fn url_req(i: &str) -> IResult<&str, Requirement> {
    let (i, (name, extras)) = name_and_extras(i)?;
    let (i, url) = preceded(
        pair(char('@'), space0),
        verify(uri_reference, |url: &str| !url.is_empty()),
    )(i)?;
    let (i, _) = alt((space1, eof))(i)?;
    let (i, marker) = opt(quoted_marker)(i)?;
    Ok((
        i,
        Requirement::DirectReference {
            name: Some(name.to_string()),
            extras,
            url: url.to_string(),
            marker,
        },
    ))
}

fn name_req(i: &str) -> IResult<&str, Requirement> {
    let (i, (name, extras)) = name_and_extras(i)?;
    let (i, constraints) = opt(terminated(versionspec, space0))(i)?;
    let (i, marker) = opt(quoted_marker)(i)?;
    Ok((
        i,
        Requirement::ConstraintSet {
            name: name.to_string(),
            extras,
            constraints: constraints.unwrap_or_default(),
            marker,
        },
    ))
}

fn specification(i: &str) -> IResult<&str, Requirement> {
    all_consuming(delimited(space0, alt((url_req, name_req)), space0))(i)
}

/// Parse one logical requirement line (comments and continuations already removed)
pub fn parse_requirement(line: &str) -> Result<Requirement, ParseError> {
    specification(line)
        .map(|(_, requirement)| requirement)
        .map_err(|_| ParseError::InvalidSyntax(line.to_string()))
}
