//! Prefix filter compiler: `<cidr>[_le<N>][_ge<N>]` tokens.
//!
//! A prefix token names an IPv4 CIDR plus optional route-length bounds. The
//! compiled filter permits any advertised route contained within the CIDR
//! whose prefix length lies in `[min_len, max_len]`. Defaults: `le` absent
//! means `max_len = 32`; `ge` absent means `min_len` is the CIDR's own
//! prefix length.

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from parsing a prefix token.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrefixError {
    #[error("invalid IPv4 CIDR {0:?}")]
    InvalidCidr(String),

    #[error("unknown qualifier {0:?} (expected _le<N> or _ge<N>)")]
    UnknownQualifier(String),

    #[error("qualifier {qualifier} value {value} is out of range (0..=32)")]
    QualifierOutOfRange { qualifier: &'static str, value: u32 },

    #[error("qualifier {0} given more than once")]
    DuplicateQualifier(&'static str),

    #[error("invalid prefix range: ge{ge} > le{le}")]
    InvalidPrefixRange { ge: u8, le: u8 },
}

/// A parsed, validated prefix token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixToken {
    pub cidr: Ipv4Net,
    pub le: Option<u8>,
    pub ge: Option<u8>,
}

/// A length-bounded route filter. Invariant: `min_len <= max_len <= 32`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledFilter {
    pub cidr: Ipv4Net,
    pub min_len: u8,
    pub max_len: u8,
}

/// Parse a `<cidr>[_le<N>][_ge<N>]` token. Qualifiers may appear in either
/// order but not repeat, and the range after applying defaults must be
/// non-empty.
pub fn parse_prefix_token(token: &str) -> Result<PrefixToken, PrefixError> {
    let mut parts = token.split('_');
    // split always yields at least one element
    let cidr_part = parts.next().unwrap_or_default();
    let cidr: Ipv4Net = cidr_part
        .parse()
        .map_err(|_| PrefixError::InvalidCidr(cidr_part.to_string()))?;

    let mut le: Option<u8> = None;
    let mut ge: Option<u8> = None;
    for qual in parts {
        let (name, digits, slot): (&'static str, &str, &mut Option<u8>) =
            if let Some(rest) = qual.strip_prefix("le") {
                ("le", rest, &mut le)
            } else if let Some(rest) = qual.strip_prefix("ge") {
                ("ge", rest, &mut ge)
            } else {
                return Err(PrefixError::UnknownQualifier(format!("_{qual}")));
            };
        let value = parse_qualifier_value(name, digits)?;
        if slot.is_some() {
            return Err(PrefixError::DuplicateQualifier(name));
        }
        *slot = Some(value);
    }

    // Validate the effective bounds, not just explicit ones: a bare `_le`
    // below the CIDR's own length would otherwise compile to an empty range.
    let min_len = ge.unwrap_or_else(|| cidr.prefix_len());
    let max_len = le.unwrap_or(32);
    if min_len > max_len {
        return Err(PrefixError::InvalidPrefixRange {
            ge: min_len,
            le: max_len,
        });
    }

    Ok(PrefixToken { cidr, le, ge })
}

fn parse_qualifier_value(qualifier: &'static str, digits: &str) -> Result<u8, PrefixError> {
    let value: u32 = digits
        .parse()
        .map_err(|_| PrefixError::UnknownQualifier(format!("_{qualifier}{digits}")))?;
    if value > 32 {
        return Err(PrefixError::QualifierOutOfRange { qualifier, value });
    }
    Ok(value as u8)
}

impl CompiledFilter {
    /// The widest permissive filter: accept any route from the external.
    pub fn permit_any() -> Self {
        CompiledFilter {
            cidr: Ipv4Net::new_assert(std::net::Ipv4Addr::UNSPECIFIED, 0),
            min_len: 0,
            max_len: 32,
        }
    }

    /// Compile a parsed token, applying the length-bound defaults.
    pub fn from_token(token: &PrefixToken) -> Self {
        CompiledFilter {
            cidr: token.cidr,
            min_len: token.ge.unwrap_or_else(|| token.cidr.prefix_len()),
            max_len: token.le.unwrap_or(32),
        }
    }

    /// Whether an advertised route passes this filter.
    pub fn permits(&self, route: &Ipv4Net) -> bool {
        self.cidr.contains(route)
            && self.min_len <= route.prefix_len()
            && route.prefix_len() <= self.max_len
    }

    /// Render back to the `<cidr>[_le<N>][_ge<N>]` token form, omitting
    /// qualifiers that equal their defaults.
    pub fn render(&self) -> String {
        let mut out = self.cidr.to_string();
        if self.max_len != 32 {
            out.push_str(&format!("_le{}", self.max_len));
        }
        if self.min_len != self.cidr.prefix_len() {
            out.push_str(&format!("_ge{}", self.min_len));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(token: &str) -> CompiledFilter {
        CompiledFilter::from_token(&parse_prefix_token(token).expect("token should parse"))
    }

    #[test]
    fn bare_cidr_defaults() {
        let f = compile("22.22.22.0/24");
        assert_eq!(f.cidr.to_string(), "22.22.22.0/24");
        assert_eq!(f.min_len, 24);
        assert_eq!(f.max_len, 32);
    }

    #[test]
    fn le_and_ge_in_either_order() {
        let a = compile("0.0.0.0/0_le32_ge32");
        let b = compile("0.0.0.0/0_ge32_le32");
        assert_eq!(a, b);
        assert_eq!(a.min_len, 32);
        assert_eq!(a.max_len, 32);
    }

    #[test]
    fn le_only() {
        let f = compile("22.22.22.0/24_le28");
        assert_eq!(f.min_len, 24);
        assert_eq!(f.max_len, 28);
    }

    #[test]
    fn default_filter_is_permit_any() {
        let f = CompiledFilter::permit_any();
        assert_eq!(f.cidr.to_string(), "0.0.0.0/0");
        assert_eq!((f.min_len, f.max_len), (0, 32));
        assert!(f.permits(&"10.0.0.0/8".parse().unwrap()));
        assert!(f.permits(&"1.2.3.4/32".parse().unwrap()));
    }

    #[test]
    fn permits_respects_containment_and_bounds() {
        let f = compile("22.22.22.0/24_le28");
        assert!(f.permits(&"22.22.22.0/24".parse().unwrap()));
        assert!(f.permits(&"22.22.22.16/28".parse().unwrap()));
        assert!(!f.permits(&"22.22.22.0/30".parse().unwrap()), "length above le bound");
        assert!(!f.permits(&"22.22.0.0/16".parse().unwrap()), "not contained");
        assert!(!f.permits(&"33.0.0.0/24".parse().unwrap()));
    }

    #[test]
    fn rejects_bad_cidr() {
        let err = parse_prefix_token("not-a-cidr").unwrap_err();
        assert!(matches!(err, PrefixError::InvalidCidr(_)), "got: {err}");
    }

    #[test]
    fn rejects_unknown_qualifier() {
        let err = parse_prefix_token("0.0.0.0/0_eq8").unwrap_err();
        assert!(matches!(err, PrefixError::UnknownQualifier(_)), "got: {err}");
    }

    #[test]
    fn rejects_out_of_range_qualifier() {
        let err = parse_prefix_token("0.0.0.0/0_le33").unwrap_err();
        assert!(
            matches!(err, PrefixError::QualifierOutOfRange { qualifier: "le", value: 33 }),
            "got: {err}"
        );
    }

    #[test]
    fn rejects_repeated_qualifier() {
        let err = parse_prefix_token("0.0.0.0/0_le8_le16").unwrap_err();
        assert!(matches!(err, PrefixError::DuplicateQualifier("le")), "got: {err}");
    }

    #[test]
    fn rejects_inverted_range() {
        let err = parse_prefix_token("0.0.0.0/0_ge24_le16").unwrap_err();
        assert!(
            matches!(err, PrefixError::InvalidPrefixRange { ge: 24, le: 16 }),
            "got: {err}"
        );
    }

    #[test]
    fn rejects_le_below_cidr_length() {
        // With ge defaulted to the CIDR's own length, this range is empty.
        let err = parse_prefix_token("10.0.0.0/24_le16").unwrap_err();
        assert!(
            matches!(err, PrefixError::InvalidPrefixRange { ge: 24, le: 16 }),
            "got: {err}"
        );
    }

    #[test]
    fn compiled_bounds_are_always_ordered() {
        for token in ["10.0.0.0/8", "10.0.0.0/24_le24", "0.0.0.0/0_le0", "10.0.0.0/8_ge16"] {
            let f = compile(token);
            assert!(f.min_len <= f.max_len, "token {token}: {f:?}");
        }
    }

    #[test]
    fn render_round_trips() {
        for token in ["0.0.0.0/0", "22.22.22.0/24_le28", "0.0.0.0/0_le32_ge32", "10.0.0.0/8_ge16"] {
            let filter = compile(token);
            let rendered = filter.render();
            let reparsed = compile(&rendered);
            assert_eq!(filter, reparsed, "token {token} rendered as {rendered}");
        }
    }
}
