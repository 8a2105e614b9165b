//! Peer identification sent on (re)connect to verify that whatever
//! answered on the other end of the wire is actually the expected
//! device, before any driver code starts trusting its replies.

use regex_lite::Regex;

/// One `(request, pattern)` pair for the line-oriented transport. The
/// request is written as-is (the caller appends the write-side EOL);
/// the reply is matched against `pattern` using `regex-lite`'s subset
/// (anchors, classes, `.`, quantifiers, alternation, groups — no
/// backreferences or lookaround, the documented restriction from the
/// original's free-form regex identification).
#[derive(Clone)]
pub struct LineIdentEntry {
    pub request: String,
    pattern: Regex,
}

impl LineIdentEntry {
    /// # Errors
    /// Returns the underlying `regex-lite` error if `pattern` uses
    /// syntax outside the supported subset.
    pub fn new(request: impl Into<String>, pattern: &str) -> Result<Self, regex_lite::Error> {
        Ok(LineIdentEntry {
            request: request.into(),
            pattern: Regex::new(pattern)?,
        })
    }

    #[must_use]
    pub fn matches(&self, reply: &str) -> bool {
        self.pattern.is_match(reply)
    }
}

/// One token of a [`BytePattern`]: a literal byte, or `??` matching any
/// single byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteToken {
    Literal(u8),
    Wildcard,
}

/// A compiled byte-oriented identification pattern: two-hex-digit bytes,
/// literal non-space characters, and `??` wildcards, space-separated.
/// Deliberately not a regex — byte-level identification
/// grammar is simpler and this keeps it a distinct, auditable parser.
#[derive(Debug, Clone)]
pub struct BytePattern {
    tokens: Vec<ByteToken>,
}

impl BytePattern {
    /// # Errors
    /// Returns a message describing the first malformed token.
    pub fn compile(spec: &str) -> Result<Self, String> {
        let mut tokens = Vec::new();
        for word in spec.split_whitespace() {
            if word == "??" {
                tokens.push(ByteToken::Wildcard);
            } else if word.len() == 2 && word.bytes().all(|b| b.is_ascii_hexdigit()) {
                let byte = u8::from_str_radix(word, 16).map_err(|e| e.to_string())?;
                tokens.push(ByteToken::Literal(byte));
            } else if word.len() == 1 {
                tokens.push(ByteToken::Literal(word.as_bytes()[0]));
            } else {
                return Err(format!("'{word}' is not a valid byte-pattern token"));
            }
        }
        Ok(BytePattern { tokens })
    }

    #[must_use]
    pub fn matches(&self, reply: &[u8]) -> bool {
        if reply.len() < self.tokens.len() {
            return false;
        }
        self.tokens.iter().zip(reply).all(|(tok, &b)| match tok {
            ByteToken::Literal(expected) => *expected == b,
            ByteToken::Wildcard => true,
        })
    }
}

/// One `(request, pattern)` pair for the byte-oriented transport.
pub struct ByteIdentEntry {
    pub request: Vec<u8>,
    pattern: BytePattern,
}

impl ByteIdentEntry {
    /// # Errors
    /// Returns the underlying [`BytePattern::compile`] error.
    pub fn new(request: Vec<u8>, pattern_spec: &str) -> Result<Self, String> {
        Ok(ByteIdentEntry {
            request,
            pattern: BytePattern::compile(pattern_spec)?,
        })
    }

    #[must_use]
    pub fn matches(&self, reply: &[u8]) -> bool {
        self.pattern.matches(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_pattern_matches_subset_regex() {
        let entry = LineIdentEntry::new("*IDN?", r"^ISSE&SINE2020,SECoP,V\d+").unwrap();
        assert!(entry.matches("ISSE&SINE2020,SECoP,V2021"));
        assert!(!entry.matches("garbage"));
    }

    #[test]
    fn byte_pattern_matches_hex_and_wildcard() {
        let pattern = BytePattern::compile("4C 53 ?? 01").unwrap();
        assert!(pattern.matches(&[0x4C, 0x53, 0x99, 0x01, 0xFF]));
        assert!(!pattern.matches(&[0x4C, 0x53, 0x99, 0x02]));
    }

    #[test]
    fn byte_pattern_rejects_malformed_token() {
        assert!(BytePattern::compile("zz").is_err());
    }
}
