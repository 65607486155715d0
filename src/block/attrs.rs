//! Block attributes and the stable identifier
//!
//! The stable id lives inside the attribute object of the opening
//! delimiter under the `stableId` key. Anything else under that key
//! (empty string, number, garbage) counts as "no stable id".

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Attribute key holding the stable identifier
pub const STABLE_ID_ATTR: &str = "stableId";

static STABLE_ID_PATTERN: OnceLock<Regex> = OnceLock::new();

fn stable_id_pattern() -> &'static Regex {
    STABLE_ID_PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{2,63}$").expect("stable id pattern is valid")
    })
}

/// Returns true if `value` is an acceptable stable id token.
pub fn is_well_formed_stable_id(value: &str) -> bool {
    stable_id_pattern().is_match(value)
}

/// Persistent, immutable block identifier.
///
/// Construction goes through [`StableId::parse`], so a value of this type
/// is always well formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StableId(String);

impl StableId {
    /// Parse a token, returning None if it is not well formed.
    pub fn parse(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if is_well_formed_stable_id(&value) {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StableId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        StableId::parse(value.clone()).ok_or_else(|| format!("malformed stable id: {:?}", value))
    }
}

impl From<StableId> for String {
    fn from(id: StableId) -> Self {
        id.0
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read the stable id from an attribute map, if present and well formed.
pub fn stable_id_of(attrs: &Map<String, Value>) -> Option<StableId> {
    match attrs.get(STABLE_ID_ATTR) {
        Some(Value::String(s)) => StableId::parse(s.as_str()),
        _ => None,
    }
}

/// Encode an attribute map the way block serializers write delimiters.
///
/// Inside strings, `--`, `<`, `>`, `&` and escaped quotes are written as
/// unicode escapes so the JSON can never terminate the HTML comment it
/// lives in.
pub fn encode_attributes(attrs: &Map<String, Value>) -> String {
    let raw = Value::Object(attrs.clone()).to_string();
    let mut out = String::with_capacity(raw.len() + 16);
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('"') => out.push_str("\\u0022"),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            },
            '-' if chars.peek() == Some(&'-') => {
                chars.next();
                out.push_str("\\u002d\\u002d");
            }
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            c => out.push(c),
        }
    }

    out
}

/// Encode a single stable id as a JSON string literal.
pub(crate) fn encode_stable_id(id: &StableId) -> String {
    // Well-formed ids contain nothing that needs escaping.
    format!("\"{}\"", id.as_str())
}
