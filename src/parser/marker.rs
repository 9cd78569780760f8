//! Environment marker grammar
//!
//! Markers are parsed so that malformed lines are rejected, but the resulting
//! tree is never evaluated.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, satisfy, space0, space1},
    combinator::{map, not, value},
    multi::separated_list1,
    sequence::{delimited, pair, terminated, tuple},
};

use crate::parser::requirement::comparator;
use crate::parser::types::{MarkerOperator, MarkerTree, MarkerValue};

fn env_var(i: &str) -> IResult<&str, &str> {
    terminated(
        alt((
            tag("python_version"),
            tag("python_full_version"),
            tag("os_name"),
            tag("sys_platform"),
            tag("platform_release"),
            tag("platform_system"),
            tag("platform_version"),
            tag("platform_machine"),
            tag("platform_python_implementation"),
            tag("implementation_name"),
            tag("implementation_version"),
            tag("extra"),
        )),
        not(satisfy(|c| c.is_ascii_alphanumeric() || c == '_')),
    )(i)
}

fn is_python_str_char(c: char) -> bool {
    c == ' '
        || c == '\t'
        || c.is_ascii_alphanumeric()
        || "().{}_*#:;,/?[]!~`@$%^&=+|<>-".contains(c)
}

fn python_str(i: &str) -> IResult<&str, &str> {
    alt((
        delimited(
            char('\''),
            take_while(|c: char| is_python_str_char(c) || c == '"'),
            char('\''),
        ),
        delimited(
            char('"'),
            take_while(|c: char| is_python_str_char(c) || c == '\''),
            char('"'),
        ),
    ))(i)
}

fn marker_var(i: &str) -> IResult<&str, MarkerValue> {
    let (i, _) = space0(i)?;
    alt((
        map(env_var, |name| MarkerValue::Variable(name.to_string())),
        map(python_str, |text| MarkerValue::Literal(text.to_string())),
    ))(i)
}

fn marker_op(i: &str) -> IResult<&str, MarkerOperator> {
    let (i, _) = space0(i)?;
    alt((
        map(comparator, MarkerOperator::Compare),
        value(
            MarkerOperator::NotIn,
            tuple((tag("not"), space1, tag("in"))),
        ),
        value(MarkerOperator::In, tag("in")),
    ))(i)
}

fn marker_expr(i: &str) -> IResult<&str, MarkerTree> {
    alt((
        map(
            tuple((marker_var, marker_op, marker_var)),
            |(lhs, op, rhs)| MarkerTree::Expression { lhs, op, rhs },
        ),
        delimited(pair(space0, char('(')), marker, pair(space0, char(')'))),
    ))(i)
}

fn flatten(mut nodes: Vec<MarkerTree>, join: fn(Vec<MarkerTree>) -> MarkerTree) -> MarkerTree {
    if nodes.len() == 1 {
        nodes.remove(0)
    } else {
        join(nodes)
    }
}

fn marker_and(i: &str) -> IResult<&str, MarkerTree> {
    map(
        separated_list1(pair(space0, tag("and")), marker_expr),
        |nodes| flatten(nodes, MarkerTree::And),
    )(i)
}

fn marker_or(i: &str) -> IResult<&str, MarkerTree> {
    map(
        separated_list1(pair(space0, tag("or")), marker_and),
        |nodes| flatten(nodes, MarkerTree::Or),
    )(i)
}

/// `marker = marker_or`, with `and` binding tighter than `or`
pub fn marker(i: &str) -> IResult<&str, MarkerTree> {
    marker_or(i)
}
