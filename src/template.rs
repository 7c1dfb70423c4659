//! Request template decoding
//!
//! Lease requests arrive as attribute templates:
//!
//! ```text
//! LEASES = [ IP = 10.0.0.5 ]
//! AR = [ TYPE = IP4, IP = 192.168.0.0, SIZE = 4 ]
//! SIZE = 3
//! ```
//!
//! A template decodes into one typed descriptor: an explicit address
//! list, a range declaration, or a bare count.

use nom::{
    branch::alt,
    bytes::complete::{take_till, take_while1},
    character::complete::{char, multispace0, space0},
    combinator::map,
    multi::separated_list1,
    sequence::delimited,
    IResult, Parser,
};

use crate::addr::{AddrKind, PoolAddr};
use crate::error::{Error, Result};
use crate::range::RangeDescriptor;

/// Typed form of a lease request template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseRequest {
    /// `SIZE = n`: n addresses, chosen by the pool
    Count(u64),
    /// One or more `LEASES = [ ... ]` attributes: explicit addresses
    Addresses(Vec<PoolAddr>),
    /// `AR = [ ... ]`: a new range declaration
    Range(RangeDescriptor),
}

/// A single parsed template attribute
#[derive(Debug)]
enum Statement {
    Scalar(String, String),
    Vector(String, Vec<(String, String)>),
}

/// Decode a template into a typed request
pub fn parse_request(content: &str) -> Result<LeaseRequest> {
    let statements = parse_statements(content)?;

    let mut addresses: Vec<PoolAddr> = Vec::new();
    let mut range: Option<RangeDescriptor> = None;
    let mut count: Option<u64> = None;

    for statement in statements {
        match statement {
            Statement::Vector(name, pairs) => match name.as_str() {
                "LEASES" => addresses.push(lease_addr(&pairs)?),
                "AR" => {
                    if range.is_some() {
                        return Err(Error::TemplateParseFailed(
                            "more than one AR attribute".to_string(),
                        ));
                    }
                    range = Some(range_descriptor(&pairs)?);
                }
                other => {
                    return Err(Error::TemplateParseFailed(format!(
                        "unknown attribute '{}'",
                        other
                    )));
                }
            },
            Statement::Scalar(name, value) => match name.as_str() {
                "SIZE" => {
                    count = Some(value.parse().map_err(|_| {
                        Error::TemplateParseFailed(format!("bad SIZE '{}'", value))
                    })?);
                }
                other => {
                    return Err(Error::TemplateParseFailed(format!(
                        "unknown attribute '{}'",
                        other
                    )));
                }
            },
        }
    }

    match (range, addresses.is_empty(), count) {
        (Some(range), true, None) => Ok(LeaseRequest::Range(range)),
        (None, false, None) => Ok(LeaseRequest::Addresses(addresses)),
        (None, true, Some(count)) => Ok(LeaseRequest::Count(count)),
        (None, true, None) => Err(Error::TemplateParseFailed(
            "template has no LEASES, AR or SIZE attribute".to_string(),
        )),
        _ => Err(Error::TemplateParseFailed(
            "template mixes LEASES, AR and SIZE attributes".to_string(),
        )),
    }
}

/// Extract the address of a `LEASES` vector
fn lease_addr(pairs: &[(String, String)]) -> Result<PoolAddr> {
    for (key, value) in pairs {
        match key.as_str() {
            "IP" | "IP6" | "MAC" => return value.parse(),
            _ => {}
        }
    }
    Err(Error::TemplateParseFailed(
        "LEASES attribute without IP, IP6 or MAC".to_string(),
    ))
}

/// Build a range descriptor from an `AR` vector
fn range_descriptor(pairs: &[(String, String)]) -> Result<RangeDescriptor> {
    let mut base: Option<PoolAddr> = None;
    let mut size: Option<u64> = None;
    let mut kind: Option<AddrKind> = None;

    for (key, value) in pairs {
        match key.as_str() {
            "SUBNET" => {
                let net = value.parse().map_err(|_| {
                    Error::TemplateParseFailed(format!("bad SUBNET '{}'", value))
                })?;
                return RangeDescriptor::from_subnet(net);
            }
            "IP" | "IP6" | "MAC" => base = Some(value.parse()?),
            "SIZE" => {
                size = Some(value.parse().map_err(|_| {
                    Error::TemplateParseFailed(format!("bad SIZE '{}'", value))
                })?);
            }
            "TYPE" => kind = Some(value.parse()?),
            other => {
                return Err(Error::TemplateParseFailed(format!(
                    "unknown AR key '{}'",
                    other
                )));
            }
        }
    }

    let base = base.ok_or(Error::TemplateParseFailed(
        "AR attribute without a base address".to_string(),
    ))?;
    let size = size.ok_or(Error::TemplateParseFailed(
        "AR attribute without SIZE".to_string(),
    ))?;
    if let Some(kind) = kind {
        if kind != base.kind() {
            return Err(Error::TemplateParseFailed(format!(
                "TYPE {} does not match address {}",
                kind, base
            )));
        }
    }
    Ok(RangeDescriptor::new(base, size))
}

/// Split the template into statements, merging multi-line vectors
fn parse_statements(content: &str) -> Result<Vec<Statement>> {
    let mut statements = Vec::new();
    let mut pending = String::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if pending.is_empty() {
            pending.push_str(line);
        } else {
            pending.push(' ');
            pending.push_str(line);
        }

        // A vector stays pending until its bracket closes.
        if pending.contains('[') && !pending.contains(']') {
            continue;
        }

        statements.push(parse_statement(&pending)?);
        pending.clear();
    }

    if !pending.is_empty() {
        return Err(Error::TemplateParseFailed(format!(
            "unterminated attribute: {}",
            pending
        )));
    }
    Ok(statements)
}

fn parse_statement(input: &str) -> Result<Statement> {
    let result = alt((
        map(parse_vector_attr, |(name, pairs)| {
            Statement::Vector(
                name.to_ascii_uppercase(),
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.to_ascii_uppercase(), v.to_string()))
                    .collect(),
            )
        }),
        map(parse_scalar_attr, |(name, value)| {
            Statement::Scalar(name.to_ascii_uppercase(), value.to_string())
        }),
    ))
    .parse(input);

    match result {
        Ok((rest, statement)) if rest.trim().is_empty() => Ok(statement),
        _ => Err(Error::TemplateParseFailed(format!(
            "unrecognized attribute: {}",
            input
        ))),
    }
}

// Nom parsers for the attribute syntax

fn parse_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_').parse(input)
}

fn parse_value(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('"'), take_till(|c| c == '"'), char('"')),
        take_while1(|c: char| !c.is_whitespace() && c != ',' && c != ']'),
    ))
    .parse(input)
}

fn parse_pair(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, _) = multispace0.parse(input)?;
    let (input, name) = parse_name(input)?;
    let (input, _) = delimited(space0, char('='), space0).parse(input)?;
    let (input, value) = parse_value(input)?;
    Ok((input, (name, value)))
}

fn parse_vector_attr(input: &str) -> IResult<&str, (&str, Vec<(&str, &str)>)> {
    let (input, name) = parse_name(input)?;
    let (input, _) = delimited(space0, char('='), space0).parse(input)?;
    let (input, _) = char('[').parse(input)?;
    let (input, pairs) =
        separated_list1(delimited(multispace0, char(','), multispace0), parse_pair)
            .parse(input)?;
    let (input, _) = multispace0.parse(input)?;
    let (input, _) = char(']').parse(input)?;
    Ok((input, (name, pairs)))
}

fn parse_scalar_attr(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, name) = parse_name(input)?;
    let (input, _) = delimited(space0, char('='), space0).parse(input)?;
    let (input, value) = parse_value(input)?;
    Ok((input, (name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(s: &str) -> PoolAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_size_scalar() {
        assert_eq!(parse_request("SIZE = 3").unwrap(), LeaseRequest::Count(3));
        assert_eq!(
            parse_request("size = \"12\"").unwrap(),
            LeaseRequest::Count(12)
        );
    }

    #[test]
    fn test_parse_lease_list() {
        let template = r#"
# two explicit leases
LEASES = [ IP = 10.0.0.5 ]
LEASES = [ MAC = 02:00:0a:00:00:07 ]
"#;
        assert_eq!(
            parse_request(template).unwrap(),
            LeaseRequest::Addresses(vec![
                v4("10.0.0.5"),
                "02:00:0a:00:00:07".parse().unwrap()
            ])
        );
    }

    #[test]
    fn test_parse_range_attr() {
        let request =
            parse_request("AR = [ TYPE = IP4, IP = 192.168.0.0, SIZE = 4 ]").unwrap();
        assert_eq!(
            request,
            LeaseRequest::Range(RangeDescriptor::new(v4("192.168.0.0"), 4))
        );
    }

    #[test]
    fn test_parse_multiline_range_attr() {
        let template = r#"
AR = [
    TYPE = ETHER,
    MAC  = "02:00:00:00:00:00",
    SIZE = 16
]
"#;
        let request = parse_request(template).unwrap();
        assert_eq!(
            request,
            LeaseRequest::Range(RangeDescriptor::new(
                "02:00:00:00:00:00".parse().unwrap(),
                16
            ))
        );
    }

    #[test]
    fn test_parse_subnet_range() {
        let request = parse_request("AR = [ SUBNET = 10.0.1.0/29 ]").unwrap();
        assert_eq!(
            request,
            LeaseRequest::Range(RangeDescriptor::new(v4("10.0.1.1"), 6))
        );
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let result = parse_request("AR = [ TYPE = ETHER, IP = 10.0.0.0, SIZE = 2 ]");
        assert!(matches!(result, Err(Error::TemplateParseFailed(_))));
    }

    #[test]
    fn test_mixed_forms_rejected() {
        let template = "SIZE = 2\nLEASES = [ IP = 10.0.0.5 ]";
        assert!(matches!(
            parse_request(template),
            Err(Error::TemplateParseFailed(_))
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(parse_request("definitely not a template").is_err());
        assert!(parse_request("").is_err());
        assert!(parse_request("AR = [ IP = 10.0.0.0, SIZE = 4").is_err());
    }
}
