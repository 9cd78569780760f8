//! URI-reference grammar (RFC 3986) for direct references
//!
//! Every production returns the text it recognized; the requirement parser only
//! needs to know where the URI ends.

use std::net::Ipv6Addr;

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1, take_while_m_n},
    character::complete::{char, digit0, satisfy},
    combinator::{not, opt, recognize, verify},
    multi::{many0, many1},
    sequence::{delimited, pair, preceded, terminated, tuple},
};

fn is_unreserved(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')
}

fn is_sub_delim(c: char) -> bool {
    matches!(
        c,
        '!' | '$' | '&' | '\'' | '(' | ')' | '*' | '+' | ',' | ';' | '='
    )
}

fn is_pchar(c: char) -> bool {
    is_unreserved(c) || is_sub_delim(c) || c == ':' || c == '@'
}

fn pct_encoded(i: &str) -> IResult<&str, &str> {
    recognize(pair(
        char('%'),
        take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()),
    ))(i)
}

// Runs of characters from one class, with percent escapes allowed in between

fn pchars(i: &str) -> IResult<&str, &str> {
    alt((take_while1(is_pchar), pct_encoded))(i)
}

fn reg_name_chars(i: &str) -> IResult<&str, &str> {
    alt((
        take_while1(|c: char| is_unreserved(c) || is_sub_delim(c)),
        pct_encoded,
    ))(i)
}

fn userinfo_chars(i: &str) -> IResult<&str, &str> {
    alt((
        take_while1(|c: char| is_unreserved(c) || is_sub_delim(c) || c == ':'),
        pct_encoded,
    ))(i)
}

fn noscheme_chars(i: &str) -> IResult<&str, &str> {
    alt((
        take_while1(|c: char| is_unreserved(c) || is_sub_delim(c) || c == '@'),
        pct_encoded,
    ))(i)
}

fn query_chars(i: &str) -> IResult<&str, &str> {
    alt((
        take_while1(|c: char| is_pchar(c) || c == '/' || c == '?'),
        pct_encoded,
    ))(i)
}

fn segment(i: &str) -> IResult<&str, &str> {
    recognize(many0(pchars))(i)
}

fn segment_nz(i: &str) -> IResult<&str, &str> {
    recognize(many1(pchars))(i)
}

fn segment_nz_nc(i: &str) -> IResult<&str, &str> {
    recognize(many1(noscheme_chars))(i)
}

fn path_abempty(i: &str) -> IResult<&str, &str> {
    recognize(many0(preceded(char('/'), segment)))(i)
}

fn path_absolute(i: &str) -> IResult<&str, &str> {
    recognize(pair(char('/'), opt(pair(segment_nz, path_abempty))))(i)
}

fn path_noscheme(i: &str) -> IResult<&str, &str> {
    recognize(pair(segment_nz_nc, path_abempty))(i)
}

fn path_rootless(i: &str) -> IResult<&str, &str> {
    recognize(pair(segment_nz, path_abempty))(i)
}

fn path_empty(i: &str) -> IResult<&str, &str> {
    recognize(not(pchars))(i)
}

fn scheme(i: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic()),
        take_while(|c: char| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')),
    ))(i)
}

fn dec_octet(i: &str) -> IResult<&str, &str> {
    verify(
        take_while_m_n(1, 3, |c: char| c.is_ascii_digit()),
        |s: &str| {
            (s.len() == 1 || !s.starts_with('0')) && s.parse::<u16>().is_ok_and(|n| n <= 255)
        },
    )(i)
}

fn ipv4_address(i: &str) -> IResult<&str, &str> {
    recognize(tuple((
        dec_octet,
        char('.'),
        dec_octet,
        char('.'),
        dec_octet,
        char('.'),
        dec_octet,
    )))(i)
}

/// A dotted quad that is not just the start of a longer registered name
fn ipv4_host(i: &str) -> IResult<&str, &str> {
    terminated(ipv4_address, not(reg_name_chars))(i)
}

fn ipv6_address(i: &str) -> IResult<&str, &str> {
    verify(
        take_while1(|c: char| c.is_ascii_hexdigit() || c == ':' || c == '.'),
        |s: &str| s.parse::<Ipv6Addr>().is_ok(),
    )(i)
}

fn ipv_future(i: &str) -> IResult<&str, &str> {
    recognize(tuple((
        char('v'),
        take_while1(|c: char| c.is_ascii_hexdigit()),
        char('.'),
        take_while1(|c: char| is_unreserved(c) || is_sub_delim(c) || c == ':'),
    )))(i)
}

fn ip_literal(i: &str) -> IResult<&str, &str> {
    recognize(delimited(
        char('['),
        alt((ipv6_address, ipv_future)),
        char(']'),
    ))(i)
}

fn reg_name(i: &str) -> IResult<&str, &str> {
    recognize(many0(reg_name_chars))(i)
}

fn host(i: &str) -> IResult<&str, &str> {
    alt((ip_literal, ipv4_host, reg_name))(i)
}

fn authority(i: &str) -> IResult<&str, &str> {
    recognize(tuple((
        opt(terminated(recognize(many0(userinfo_chars)), char('@'))),
        host,
        opt(preceded(char(':'), digit0)),
    )))(i)
}

fn network_path(i: &str) -> IResult<&str, &str> {
    recognize(tuple((tag("//"), authority, path_abempty)))(i)
}

fn query(i: &str) -> IResult<&str, &str> {
    recognize(many0(query_chars))(i)
}

fn query_and_fragment(i: &str) -> IResult<&str, &str> {
    recognize(pair(
        opt(preceded(char('?'), query)),
        opt(preceded(char('#'), query)),
    ))(i)
}

fn uri(i: &str) -> IResult<&str, &str> {
    recognize(tuple((
        scheme,
        char(':'),
        alt((network_path, path_absolute, path_rootless, path_empty)),
        query_and_fragment,
    )))(i)
}

fn relative_ref(i: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((network_path, path_absolute, path_noscheme, path_empty)),
        query_and_fragment,
    ))(i)
}

/// `URI-reference = URI / relative-ref`
pub fn uri_reference(i: &str) -> IResult<&str, &str> {
    alt((uri, relative_ref))(i)
}
