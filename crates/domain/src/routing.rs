//! Routing-key parsing.
//!
//! A consumer is configured with one parser pattern (a regular expression with
//! named capture groups). Every delivered routing key is matched against it,
//! anchored at the start of the key, and the named groups become the capture
//! map handed to the processing step.
//!
//! A miss is not an error. [`KeyMatch`] keeps the three outcomes apart so a
//! caller cannot mistake "matched, nothing to capture" for "did not match".

use std::collections::BTreeMap;

use regex::Regex;
use thiserror::Error;
use tracing::warn;

/// The parser pattern is not a valid regular expression.
#[derive(Debug, Error)]
#[error("invalid routing-key parser pattern '{pattern}'")]
pub struct RoutingPatternError {
    /// The pattern as supplied.
    pub pattern: String,
    #[source]
    source: regex::Error,
}

// ---------------------------------------------------------------------------
// Capture map
// ---------------------------------------------------------------------------

/// Named capture groups extracted from a routing key.
///
/// Groups that did not participate in the match (e.g. an optional group) are
/// present with a `None` value, which is distinct from a group that matched
/// the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureMap(BTreeMap<String, Option<String>>);

impl CaptureMap {
    /// Returns the matched text of a group, if the group exists and matched.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|value| value.as_deref())
    }

    /// Returns `true` if the pattern defines a group with this name.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of named groups.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no named groups.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(group, value)` pairs in group-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, Option<V>)> for CaptureMap {
    fn from_iter<I: IntoIterator<Item = (K, Option<V>)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.map(Into::into)))
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// Match outcome
// ---------------------------------------------------------------------------

/// Outcome of matching one routing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMatch {
    /// The key matched and the pattern has at least one named group.
    Captured(CaptureMap),
    /// The key matched but the pattern has no named groups.
    Matched,
    /// The key did not match; no structured data was extracted.
    NoMatch,
}

impl KeyMatch {
    /// Returns `true` unless this is [`KeyMatch::NoMatch`].
    pub fn is_match(&self) -> bool {
        !matches!(self, Self::NoMatch)
    }

    /// The captured groups, if any were extracted.
    pub fn captures(&self) -> Option<&CaptureMap> {
        match self {
            Self::Captured(captures) => Some(captures),
            Self::Matched | Self::NoMatch => None,
        }
    }

    /// Convenience lookup of a single group; `None` for both non-captured
    /// outcomes.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.captures().and_then(|captures| captures.get(name))
    }

    /// Flattens the outcome into a capture map, empty unless captured.
    pub fn into_captures(self) -> CaptureMap {
        match self {
            Self::Captured(captures) => captures,
            Self::Matched | Self::NoMatch => CaptureMap::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// A compiled routing-key parser pattern.
///
/// Compiled once and reused for every delivered message. Accepts both
/// `(?P<name>...)` and `(?<name>...)` group syntax.
#[derive(Debug, Clone)]
pub struct RoutingKeyParser {
    pattern: String,
    regex: Regex,
}

impl RoutingKeyParser {
    /// Compiles `pattern`, anchoring it at the start of the routing key.
    pub fn new(pattern: impl Into<String>) -> Result<Self, RoutingPatternError> {
        let pattern = pattern.into();
        let regex = Regex::new(&format!(r"\A(?:{pattern})")).map_err(|source| {
            RoutingPatternError {
                pattern: pattern.clone(),
                source,
            }
        })?;
        Ok(Self { pattern, regex })
    }

    /// The pattern as supplied (without the added anchor).
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Matches a routing key, emitting a warning on a miss.
    pub fn match_key(&self, routing_key: &str) -> KeyMatch {
        let Some(caps) = self.regex.captures(routing_key) else {
            warn!(
                routing_key,
                pattern = %self.pattern,
                "routing key did not match parser pattern; no structured data extracted"
            );
            return KeyMatch::NoMatch;
        };

        let captures: CaptureMap = self
            .regex
            .capture_names()
            .flatten()
            .map(|name| (name, caps.name(name).map(|m| m.as_str())))
            .collect();

        if captures.is_empty() {
            KeyMatch::Matched
        } else {
            KeyMatch::Captured(captures)
        }
    }

    /// Flat extraction: the named groups, or an empty map on a miss or when
    /// the pattern has no named groups.
    pub fn extract(&self, routing_key: &str) -> CaptureMap {
        self.match_key(routing_key).into_captures()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn extracts_named_groups() {
        let parser = RoutingKeyParser::new(r"(?P<device>\w+)\.status").unwrap();
        let captures = parser.extract("pump1.status");

        assert_eq!(captures.len(), 1);
        assert_eq!(captures.get("device"), Some("pump1"));
    }

    #[test]
    fn accepts_angle_bracket_group_syntax() {
        let parser = RoutingKeyParser::new(r"(?<sensor>[a-zA-Z0-9]+)\.(?<field>[a-z]+)").unwrap();
        let captures = parser.extract("tempA.value");

        assert_eq!(captures.get("sensor"), Some("tempA"));
        assert_eq!(captures.get("field"), Some("value"));
    }

    #[test]
    #[traced_test]
    fn miss_yields_empty_map_and_warns() {
        let parser = RoutingKeyParser::new(r"(?P<device>\w+)\.status").unwrap();

        assert_eq!(parser.match_key("pump1.unrelated"), KeyMatch::NoMatch);
        assert!(parser.extract("pump1.unrelated").is_empty());
        assert!(logs_contain("did not match parser pattern"));
    }

    #[test]
    fn match_is_anchored_at_start_only() {
        let parser = RoutingKeyParser::new(r"status").unwrap();
        assert_eq!(parser.match_key("status.pump1"), KeyMatch::Matched);
        assert_eq!(parser.match_key("pump1.status"), KeyMatch::NoMatch);
    }

    #[test]
    fn pattern_without_groups_is_a_plain_match() {
        let parser = RoutingKeyParser::new(r"sensor_value\..*").unwrap();
        let outcome = parser.match_key("sensor_value.tempA");

        assert!(outcome.is_match());
        assert_eq!(outcome.captures(), None);
        assert!(parser.extract("sensor_value.tempA").is_empty());
    }

    #[test]
    fn unmatched_optional_group_is_present_but_empty() {
        let parser = RoutingKeyParser::new(r"(?P<endpoint>[^.]+)(\.(?P<field>[^.]+))?").unwrap();
        let captures = parser.extract("heater");

        assert_eq!(captures.get("endpoint"), Some("heater"));
        assert!(captures.contains("field"));
        assert_eq!(captures.get("field"), None);
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = RoutingKeyParser::new(r"(?P<open").unwrap_err();
        assert_eq!(err.pattern, "(?P<open");
    }
}
