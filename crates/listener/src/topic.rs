//! Topic-exchange binding semantics.
//!
//! Binding patterns are matched against routing keys segment by segment,
//! segments being separated by `.`:
//!
//! - `*` matches exactly one segment (e.g. `*.status` matches `pump1.status`)
//! - `#` matches zero or more segments (e.g. `sensor.#` matches `sensor`
//!   and `sensor.temp.raw`)
//! - any other segment must match literally

use node_domain::{ExchangeName, TransportError, SEGMENT_SEPARATOR};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Word(String),
    One,
    Any,
}

/// A parsed binding pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    source: String,
    segments: Vec<Segment>,
}

impl TopicPattern {
    /// Parses a binding pattern, rejecting empty patterns and empty segments.
    pub fn parse(pattern: &str) -> Result<Self, TransportError> {
        let invalid = |reason: &str| TransportError::Binding {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if pattern.is_empty() {
            return Err(invalid("binding pattern is empty"));
        }

        let mut segments = pattern
            .split(SEGMENT_SEPARATOR)
            .map(|segment| match segment {
                "" => Err(invalid("binding pattern has an empty segment")),
                "*" => Ok(Segment::One),
                "#" => Ok(Segment::Any),
                word => Ok(Segment::Word(word.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        segments.dedup_by(|next, prev| *next == Segment::Any && *prev == Segment::Any);

        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns `true` if `routing_key` is covered by this binding.
    pub fn matches(&self, routing_key: &str) -> bool {
        let key: Vec<&str> = routing_key.split(SEGMENT_SEPARATOR).collect();
        matches_from(&self.segments, &key)
    }
}

/// Walks the pattern once, tracking every key prefix the segments so far can
/// cover. Runs in `pattern.len() * key.len()` steps regardless of how many
/// `#` segments the binding holds.
fn matches_from(pattern: &[Segment], key: &[&str]) -> bool {
    let mut covered = vec![false; key.len() + 1];
    covered[0] = true;

    for segment in pattern {
        let mut next = vec![false; key.len() + 1];
        match segment {
            Segment::Any => {
                let mut reached = false;
                for (slot, &prefix) in next.iter_mut().zip(&covered) {
                    reached |= prefix;
                    *slot = reached;
                }
            }
            Segment::One => {
                for end in 1..=key.len() {
                    next[end] = covered[end - 1];
                }
            }
            Segment::Word(word) => {
                for end in 1..=key.len() {
                    next[end] = covered[end - 1] && key[end - 1] == word.as_str();
                }
            }
        }
        covered = next;
    }

    covered[key.len()]
}

/// Bindings registered on a transport, across exchanges.
#[derive(Debug, Default)]
pub struct BindingTable {
    entries: Vec<(ExchangeName, TopicPattern)>,
}

impl BindingTable {
    /// Adds a binding. Binding the same pattern twice is a no-op.
    pub fn bind(&mut self, exchange: &ExchangeName, pattern: &str) -> Result<(), TransportError> {
        let pattern = TopicPattern::parse(pattern)?;
        let exists = self
            .entries
            .iter()
            .any(|(bound, existing)| bound == exchange && *existing == pattern);
        if !exists {
            self.entries.push((exchange.clone(), pattern));
        }
        Ok(())
    }

    /// Returns `true` if any binding on `exchange` covers `routing_key`.
    pub fn routes(&self, exchange: &ExchangeName, routing_key: &str) -> bool {
        self.entries
            .iter()
            .any(|(bound, pattern)| bound == exchange && pattern.matches(routing_key))
    }

    /// Number of distinct bindings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, key: &str) -> bool {
        TopicPattern::parse(pattern).unwrap().matches(key)
    }

    #[test]
    fn literal_segments_match_exactly() {
        assert!(matches("pump1.status", "pump1.status"));
        assert!(!matches("pump1.status", "pump1.status.extra"));
        assert!(!matches("pump1.status", "pump2.status"));
    }

    #[test]
    fn star_matches_exactly_one_segment() {
        assert!(matches("*.status", "pump1.status"));
        assert!(!matches("*.status", "status"));
        assert!(!matches("*.status", "a.b.status"));
    }

    #[test]
    fn hash_matches_zero_or_more_segments() {
        assert!(matches("#", "anything.at.all"));
        assert!(matches("sensor.#", "sensor"));
        assert!(matches("sensor.#", "sensor.temp.raw"));
        assert!(matches("#.raw", "sensor.temp.raw"));
        assert!(!matches("sensor.#", "heater.temp"));
    }

    #[test]
    fn many_hash_segments_against_a_long_key_stay_fast() {
        let pattern = vec!["#"; 24].join(".x.") + ".z";
        let key = vec!["x"; 200].join(".");

        assert!(!matches(&pattern, &key));
        assert!(matches(&pattern, &(key + ".z")));
        assert!(matches("a.#.#.#.b", "a.b"));
        assert!(matches("a.#.#.#.b", "a.q.r.b"));
    }

    #[test]
    fn empty_segments_are_rejected() {
        assert!(matches!(
            TopicPattern::parse("a..b"),
            Err(TransportError::Binding { .. })
        ));
        assert!(TopicPattern::parse("").is_err());
    }

    #[test]
    fn table_routes_per_exchange() {
        let alerts = ExchangeName::new("alerts").unwrap();
        let requests = ExchangeName::new("requests").unwrap();
        let mut table = BindingTable::default();

        table.bind(&alerts, "*.status").unwrap();
        table.bind(&alerts, "*.status").unwrap();

        assert_eq!(table.len(), 1);
        assert!(table.routes(&alerts, "pump1.status"));
        assert!(!table.routes(&requests, "pump1.status"));
    }
}
