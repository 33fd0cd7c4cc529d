//! Tokenizer/parser for peering request tokens.
//!
//! A request is a single whitespace-free token. The first `+` or `~` selects
//! the variant: `A+B[:r[=group]]` is a VPC peering, `A~[ext][:mods...]` is an
//! external peering. Parsing is pure and never consults the catalog; all
//! symbolic references stay unresolved here.

use thiserror::Error;

use super::prefix::{self, PrefixError, PrefixToken};

/// Errors from parsing a single request token.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed request: {0}")]
    MalformedRequest(&'static str),

    #[error("unknown modifier key {key:?}")]
    UnknownModifier { key: String },

    #[error("modifier {key:?} given more than once")]
    DuplicateModifier { key: &'static str },

    #[error("modifier {key:?} requires a value")]
    MissingModifierValue { key: &'static str },

    #[error("modifier {key:?} has an empty list entry")]
    EmptyListValue { key: &'static str },

    #[error(transparent)]
    Prefix(#[from] PrefixError),
}

/// An unresolved VPC-to-VPC peering request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpcPeeringRequest {
    pub vpc_a: String,
    pub vpc_b: String,
    pub remote: bool,
    /// Explicit switch group; `None` with `remote` means "infer from catalog".
    pub group: Option<String>,
}

/// An unresolved VPC-to-external peering request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalPeeringRequest {
    pub vpc: String,
    /// Explicit external name; `None` means "infer from the VPC's namespace".
    pub external: Option<String>,
    /// Exposed VPC subnets; `None` means the default subnet only.
    pub subnets: Option<Vec<String>>,
    /// Route filters; `None` means permit any route from the external.
    pub prefixes: Option<Vec<PrefixToken>>,
}

/// A parsed but unresolved request. Closed sum type so every consumer
/// handles both variants exhaustively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    Vpc(VpcPeeringRequest),
    External(ExternalPeeringRequest),
}

/// Parse one request token into its unresolved form.
pub fn parse_request(text: &str) -> Result<RequestKind, ParseError> {
    let sep_pos = text.find(['+', '~']).ok_or(ParseError::MalformedRequest(
        "expected `+` (VPC peering) or `~` (external peering)",
    ))?;
    let separator = text.as_bytes()[sep_pos] as char;

    let left = &text[..sep_pos];
    if left.is_empty() {
        return Err(ParseError::MalformedRequest("missing VPC before separator"));
    }

    let mut clauses = text[sep_pos + 1..].split(':');
    // split always yields at least one element
    let base = clauses.next().unwrap_or_default();
    if base.contains(['+', '~']) {
        return Err(ParseError::MalformedRequest("more than one peering separator"));
    }

    match separator {
        '+' => parse_vpc_peering(left, base, clauses),
        _ => parse_external_peering(left, base, clauses),
    }
}

fn parse_vpc_peering<'a>(
    vpc_a: &str,
    vpc_b: &str,
    clauses: impl Iterator<Item = &'a str>,
) -> Result<RequestKind, ParseError> {
    if vpc_b.is_empty() {
        return Err(ParseError::MalformedRequest("missing VPC after `+`"));
    }

    let mut remote = false;
    let mut group: Option<String> = None;
    for clause in clauses {
        let (key, value) = split_clause(clause);
        match key {
            "r" | "remote" => {
                if remote {
                    return Err(ParseError::DuplicateModifier { key: "remote" });
                }
                remote = true;
                if let Some(value) = value {
                    if value.is_empty() {
                        return Err(ParseError::MissingModifierValue { key: "remote" });
                    }
                    group = Some(value.to_string());
                }
            }
            _ => {
                return Err(ParseError::UnknownModifier {
                    key: key.to_string(),
                });
            }
        }
    }

    Ok(RequestKind::Vpc(VpcPeeringRequest {
        vpc_a: vpc_a.to_string(),
        vpc_b: vpc_b.to_string(),
        remote,
        group,
    }))
}

fn parse_external_peering<'a>(
    vpc: &str,
    external: &str,
    clauses: impl Iterator<Item = &'a str>,
) -> Result<RequestKind, ParseError> {
    let mut subnets: Option<Vec<String>> = None;
    let mut prefixes: Option<Vec<PrefixToken>> = None;

    for clause in clauses {
        let (key, value) = split_clause(clause);
        match key {
            "subnets" | "vpc_subnets" => {
                if subnets.is_some() {
                    return Err(ParseError::DuplicateModifier { key: "subnets" });
                }
                subnets = Some(parse_list(value, "subnets", |entry| {
                    Ok(entry.to_string())
                })?);
            }
            "prefixes" | "ext_prefixes" => {
                if prefixes.is_some() {
                    return Err(ParseError::DuplicateModifier { key: "prefixes" });
                }
                prefixes = Some(parse_list(value, "prefixes", |entry| {
                    Ok(prefix::parse_prefix_token(entry)?)
                })?);
            }
            _ => {
                return Err(ParseError::UnknownModifier {
                    key: key.to_string(),
                });
            }
        }
    }

    Ok(RequestKind::External(ExternalPeeringRequest {
        vpc: vpc.to_string(),
        external: (!external.is_empty()).then(|| external.to_string()),
        subnets,
        prefixes,
    }))
}

/// Split a modifier clause on the first `=`. A bare key has no value.
fn split_clause(clause: &str) -> (&str, Option<&str>) {
    match clause.split_once('=') {
        Some((key, value)) => (key, Some(value)),
        None => (clause, None),
    }
}

/// Parse a required comma-separated list value. Order is preserved; later
/// duplicates are idempotent, not errors.
fn parse_list<T: PartialEq>(
    value: Option<&str>,
    key: &'static str,
    mut parse_entry: impl FnMut(&str) -> Result<T, ParseError>,
) -> Result<Vec<T>, ParseError> {
    let value = value.ok_or(ParseError::MissingModifierValue { key })?;
    if value.is_empty() {
        return Err(ParseError::MissingModifierValue { key });
    }

    let mut entries = Vec::new();
    for entry in value.split(',') {
        if entry.is_empty() {
            return Err(ParseError::EmptyListValue { key });
        }
        let parsed = parse_entry(entry)?;
        if !entries.contains(&parsed) {
            entries.push(parsed);
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> RequestKind {
        parse_request(text).unwrap_or_else(|e| panic!("{text:?} should parse: {e}"))
    }

    #[test]
    fn local_vpc_peering() {
        let kind = parse("1+2");
        assert_eq!(
            kind,
            RequestKind::Vpc(VpcPeeringRequest {
                vpc_a: "1".into(),
                vpc_b: "2".into(),
                remote: false,
                group: None,
            })
        );
    }

    #[test]
    fn remote_vpc_peering_bare_flag() {
        let RequestKind::Vpc(req) = parse("1+2:r") else {
            panic!("expected vpc variant");
        };
        assert!(req.remote);
        assert_eq!(req.group, None);
    }

    #[test]
    fn remote_vpc_peering_with_group() {
        for text in ["2+4:r=border", "2+4:remote=border"] {
            let RequestKind::Vpc(req) = parse(text) else {
                panic!("expected vpc variant for {text}");
            };
            assert!(req.remote);
            assert_eq!(req.group.as_deref(), Some("border"));
        }
    }

    #[test]
    fn external_peering_explicit() {
        let kind = parse("1~as5835");
        assert_eq!(
            kind,
            RequestKind::External(ExternalPeeringRequest {
                vpc: "1".into(),
                external: Some("as5835".into()),
                subnets: None,
                prefixes: None,
            })
        );
    }

    #[test]
    fn external_peering_implicit() {
        let RequestKind::External(req) = parse("1~") else {
            panic!("expected external variant");
        };
        assert_eq!(req.external, None);
        assert_eq!(req.subnets, None);
        assert_eq!(req.prefixes, None);
    }

    #[test]
    fn external_peering_with_modifiers() {
        let RequestKind::External(req) =
            parse("2~as5835:subnets=sub1,sub2:prefixes=0.0.0.0/0,22.22.22.0/24_le28")
        else {
            panic!("expected external variant");
        };
        assert_eq!(req.subnets.as_deref(), Some(&["sub1".to_string(), "sub2".to_string()][..]));
        let prefixes = req.prefixes.expect("prefixes should be set");
        assert_eq!(prefixes.len(), 2);
        assert_eq!(prefixes[1].le, Some(28));
    }

    #[test]
    fn modifier_key_aliases() {
        let a = parse("1~x:subnets=default:prefixes=0.0.0.0/0");
        let b = parse("1~x:vpc_subnets=default:ext_prefixes=0.0.0.0/0");
        assert_eq!(a, b);
    }

    #[test]
    fn list_duplicates_are_idempotent() {
        let RequestKind::External(req) = parse("1~x:subnets=a,b,a") else {
            panic!("expected external variant");
        };
        assert_eq!(req.subnets.as_deref(), Some(&["a".to_string(), "b".to_string()][..]));
    }

    #[test]
    fn rejects_token_without_separator() {
        let err = parse_request("vpc-1").unwrap_err();
        assert!(matches!(err, ParseError::MalformedRequest(_)), "got: {err}");
    }

    #[test]
    fn rejects_missing_left_vpc() {
        for text in ["+2", "~as5835"] {
            let err = parse_request(text).unwrap_err();
            assert!(matches!(err, ParseError::MalformedRequest(_)), "{text}: {err}");
        }
    }

    #[test]
    fn rejects_missing_right_vpc() {
        let err = parse_request("1+").unwrap_err();
        assert!(matches!(err, ParseError::MalformedRequest(_)), "got: {err}");
    }

    #[test]
    fn rejects_double_separator() {
        for text in ["1+2~x", "1+2+3", "1~a~b"] {
            let err = parse_request(text).unwrap_err();
            assert!(matches!(err, ParseError::MalformedRequest(_)), "{text}: {err}");
        }
    }

    #[test]
    fn rejects_unknown_modifier() {
        let err = parse_request("1+2:color=red").unwrap_err();
        assert!(
            matches!(err, ParseError::UnknownModifier { ref key } if key == "color"),
            "got: {err}"
        );

        let err = parse_request("1~x:r").unwrap_err();
        assert!(
            matches!(err, ParseError::UnknownModifier { ref key } if key == "r"),
            "remote is not valid on external peerings: {err}"
        );
    }

    #[test]
    fn rejects_repeated_modifier() {
        let err = parse_request("1+2:r:remote=border").unwrap_err();
        assert!(
            matches!(err, ParseError::DuplicateModifier { key: "remote" }),
            "got: {err}"
        );

        let err = parse_request("1~x:subnets=a:vpc_subnets=b").unwrap_err();
        assert!(
            matches!(err, ParseError::DuplicateModifier { key: "subnets" }),
            "got: {err}"
        );
    }

    #[test]
    fn rejects_empty_modifier_values() {
        let err = parse_request("1~x:subnets=").unwrap_err();
        assert!(
            matches!(err, ParseError::MissingModifierValue { key: "subnets" }),
            "got: {err}"
        );

        let err = parse_request("1~x:subnets").unwrap_err();
        assert!(
            matches!(err, ParseError::MissingModifierValue { key: "subnets" }),
            "got: {err}"
        );

        let err = parse_request("1~x:prefixes=0.0.0.0/0,,1.1.1.0/24").unwrap_err();
        assert!(
            matches!(err, ParseError::EmptyListValue { key: "prefixes" }),
            "got: {err}"
        );

        let err = parse_request("1+2:r=").unwrap_err();
        assert!(
            matches!(err, ParseError::MissingModifierValue { key: "remote" }),
            "got: {err}"
        );
    }

    #[test]
    fn prefix_errors_propagate() {
        let err = parse_request("1~x:prefixes=0.0.0.0/0_le33").unwrap_err();
        assert!(matches!(err, ParseError::Prefix(_)), "got: {err}");
    }
}
