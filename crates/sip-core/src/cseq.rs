//! CSeq header value handling

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Parsed `CSeq` header value, e.g. `8082 REGISTER`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CSeq {
    /// Sequence number
    pub seq: u32,
    /// Method token following the number
    pub method: String,
}

impl CSeq {
    pub fn new(seq: u32, method: impl Into<String>) -> Self {
        Self {
            seq,
            method: method.into(),
        }
    }

    /// Same sequence number with another method, as used when acknowledging
    /// an INVITE.
    pub fn with_method(&self, method: impl Into<String>) -> Self {
        Self::new(self.seq, method)
    }
}

impl fmt::Display for CSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.seq, self.method)
    }
}

impl FromStr for CSeq {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut tokens = s.split_whitespace();
        let seq = tokens
            .next()
            .and_then(|t| t.parse::<u32>().ok())
            .ok_or_else(|| Error::InvalidCSeq(s.to_string()))?;
        let method = tokens
            .next()
            .ok_or_else(|| Error::InvalidCSeq(s.to_string()))?;
        Ok(CSeq::new(seq, method))
    }
}

/// Increment the leading sequence number of a raw CSeq value, keeping every
/// token after it untouched.
pub fn increment(value: &str) -> Result<String> {
    let (number, rest) = match value.split_once(' ') {
        Some((number, rest)) => (number, Some(rest)),
        None => (value, None),
    };
    let seq: u32 = number
        .parse()
        .map_err(|_| Error::InvalidCSeq(format!("CSeq doesn't start with an integer: {value}")))?;
    let next = seq
        .checked_add(1)
        .ok_or_else(|| Error::InvalidCSeq(format!("CSeq overflow: {value}")))?;
    Ok(match rest {
        Some(rest) => format!("{next} {rest}"),
        None => next.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_number_and_method() {
        let cseq: CSeq = "8083 INVITE".parse().unwrap();
        assert_eq!(cseq, CSeq::new(8083, "INVITE"));
        assert_eq!(cseq.with_method("ACK").to_string(), "8083 ACK");
    }

    #[test]
    fn rejects_missing_method() {
        assert!("8083".parse::<CSeq>().is_err());
        assert!("INVITE 1".parse::<CSeq>().is_err());
    }

    #[test]
    fn increment_keeps_trailing_tokens() {
        assert_eq!(increment("8082 REGISTER").unwrap(), "8083 REGISTER");
        assert_eq!(increment("1 INVITE extra").unwrap(), "2 INVITE extra");
        assert_eq!(increment("41").unwrap(), "42");
    }

    #[test]
    fn increment_rejects_non_numeric_token() {
        let err = increment("abc REGISTER").unwrap_err();
        assert!(matches!(err, Error::InvalidCSeq(_)));
        // deterministic: same input, same failure
        assert_eq!(increment("abc REGISTER").unwrap_err(), err);
    }
}
