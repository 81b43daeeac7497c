//! In-memory configuration graph of a node.
//!
//! A [`ConfigGraph`] is built once from a YAML document that describes the
//! node and its instruments:
//!
//! ```yaml
//! nodename: example
//! broker: amqp.example.org
//! instruments:
//! - name: lockin0
//!   module: lockin_amplifier
//!   endpoints:
//!   - name: lockin0_x
//!   - name: lockin0_y
//! - name: heater
//!   module: heater_controller
//! ```
//!
//! Building the graph checks the document's structure and naming rules only.
//! It never touches the network: a valid graph makes no claim that the broker
//! is reachable.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde_yaml::{Mapping, Value};
use tracing::{debug, error};

use crate::{
    BrokerAddress, ConstructionError, EndpointName, EntityKind, InstrumentData, InstrumentName,
    LookupError, NodeName,
};

const NODENAME_KEY: &str = "nodename";
const BROKER_KEY: &str = "broker";
const INSTRUMENTS_KEY: &str = "instruments";
const ENDPOINTS_KEY: &str = "endpoints";
const NAME_KEY: &str = "name";

/// Validated, immutable description of a node's instrumentation.
///
/// There are no mutating methods; reconfiguration means building a new graph.
/// The type is `Send + Sync` and may be shared between consumers behind an
/// `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigGraph {
    node_name: NodeName,
    broker: BrokerAddress,
    /// `None` when the document has no `instruments` key at all, which is
    /// observably different from an empty `instruments: []` list.
    instruments: Option<BTreeMap<InstrumentName, InstrumentData>>,
}

impl ConfigGraph {
    /// Builds a graph from an already-decoded document.
    ///
    /// # Errors
    ///
    /// - [`ConstructionError::MalformedDocument`] if `nodename` or `broker` is
    ///   missing, or if any part of the document has the wrong shape.
    /// - [`ConstructionError::DuplicateName`] on the first repeated instrument
    ///   or endpoint name.
    /// - [`ConstructionError::InvalidName`] if a name is empty or contains `.`.
    pub fn build(document: &Value) -> Result<Self, ConstructionError> {
        let root = document
            .as_mapping()
            .ok_or_else(|| ConstructionError::malformed("<root>", "must be a mapping"))?;

        let node_name = required_str(root, NODENAME_KEY)?;
        let node_name = NodeName::segment(node_name).map_err(|source| {
            ConstructionError::InvalidName {
                field: NODENAME_KEY.to_string(),
                source,
            }
        })?;
        let broker = BrokerAddress::new(required_str(root, BROKER_KEY)?);

        let instruments = match root.get(INSTRUMENTS_KEY) {
            None => None,
            Some(section) => Some(build_instruments(&node_name, section)?),
        };

        debug!(
            node = %node_name,
            instruments = instruments.as_ref().map_or(0, BTreeMap::len),
            "configuration graph built"
        );

        Ok(Self {
            node_name,
            broker,
            instruments,
        })
    }

    /// Decodes YAML text and builds a graph from it.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConstructionError> {
        let document: Value =
            serde_yaml::from_str(text).map_err(|source| ConstructionError::Syntax { source })?;
        Self::build(&document)
    }

    /// Reads a YAML file and builds a graph from it.
    ///
    /// # Errors
    ///
    /// [`ConstructionError::SourceUnavailable`] (with the I/O error attached)
    /// if the file cannot be read, otherwise as for [`Self::from_yaml_str`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConstructionError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| {
            error!(path = %path.display(), error = %source, "couldn't open config file");
            ConstructionError::SourceUnavailable {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Self::from_yaml_str(&text)
    }

    /// Name of the node that owns this graph.
    pub fn node_name(&self) -> &NodeName {
        &self.node_name
    }

    /// Connection descriptor for the external transport, verbatim.
    pub fn broker(&self) -> &BrokerAddress {
        &self.broker
    }

    /// Number of top-level instruments, excluding the node itself.
    ///
    /// Zero both for `instruments: []` and for a document without the key;
    /// use [`Self::declares_instruments`] to tell the two apart.
    pub fn instrument_count(&self) -> usize {
        self.instruments.as_ref().map_or(0, BTreeMap::len)
    }

    /// Returns `true` if the document had an `instruments` key.
    pub fn declares_instruments(&self) -> bool {
        self.instruments.is_some()
    }

    /// All instruments, or `None` if the document had no `instruments` key.
    pub fn instruments(&self) -> Option<&BTreeMap<InstrumentName, InstrumentData>> {
        self.instruments.as_ref()
    }

    /// Returns the data of the named instrument.
    pub fn instrument(&self, name: &str) -> Result<&InstrumentData, LookupError> {
        self.instruments
            .as_ref()
            .and_then(|instruments| instruments.get(name))
            .ok_or_else(|| LookupError::NotFound {
                name: name.to_string(),
            })
    }
}

fn required_str<'a>(root: &'a Mapping, key: &str) -> Result<&'a str, ConstructionError> {
    match root.get(key) {
        None => Err(ConstructionError::malformed(key, "is required")),
        Some(value) => value
            .as_str()
            .ok_or_else(|| ConstructionError::malformed(key, "must be a string")),
    }
}

fn entry_name<'a>(entry: &'a Mapping, field: &str) -> Result<&'a str, ConstructionError> {
    match entry.get(NAME_KEY) {
        None => Err(ConstructionError::malformed(field, "is required")),
        Some(value) => value
            .as_str()
            .ok_or_else(|| ConstructionError::malformed(field, "must be a string")),
    }
}

fn build_instruments(
    node: &NodeName,
    section: &Value,
) -> Result<BTreeMap<InstrumentName, InstrumentData>, ConstructionError> {
    let entries = section
        .as_sequence()
        .ok_or_else(|| ConstructionError::malformed(INSTRUMENTS_KEY, "must be a sequence"))?;

    let mut instruments = BTreeMap::new();
    let mut endpoints = HashSet::new();

    for (index, entry) in entries.iter().enumerate() {
        let field = format!("{INSTRUMENTS_KEY}[{index}]");
        let mut mapping = entry
            .as_mapping()
            .cloned()
            .ok_or_else(|| ConstructionError::malformed(field.as_str(), "must be a mapping"))?;

        let name_field = format!("{field}.{NAME_KEY}");
        let name = entry_name(&mapping, &name_field)?;
        let name = InstrumentName::segment(name).map_err(|source| {
            ConstructionError::InvalidName {
                field: name_field.clone(),
                source,
            }
        })?;

        if instruments.contains_key(&name) {
            return Err(ConstructionError::DuplicateName {
                node: node.clone(),
                kind: EntityKind::Instrument,
                name: name.to_string(),
            });
        }

        mapping.shift_remove(NAME_KEY);
        if let Some(declared) = mapping.get(ENDPOINTS_KEY) {
            check_endpoints(node, &field, declared, &mut endpoints)?;
        }

        instruments.insert(name, InstrumentData::new(mapping));
    }

    Ok(instruments)
}

/// Checks one instrument's `endpoints` list against the names already seen
/// elsewhere in the node.
fn check_endpoints(
    node: &NodeName,
    instrument_field: &str,
    declared: &Value,
    seen: &mut HashSet<EndpointName>,
) -> Result<(), ConstructionError> {
    let list_field = format!("{instrument_field}.{ENDPOINTS_KEY}");
    let entries = declared
        .as_sequence()
        .ok_or_else(|| ConstructionError::malformed(list_field.as_str(), "must be a sequence"))?;

    for (index, entry) in entries.iter().enumerate() {
        let field = format!("{list_field}[{index}]");
        let mapping = entry
            .as_mapping()
            .ok_or_else(|| ConstructionError::malformed(field.as_str(), "must be a mapping"))?;

        let name_field = format!("{field}.{NAME_KEY}");
        let name = entry_name(mapping, &name_field)?;
        let name = EndpointName::segment(name).map_err(|source| {
            ConstructionError::InvalidName {
                field: name_field.clone(),
                source,
            }
        })?;

        if !seen.insert(name.clone()) {
            return Err(ConstructionError::DuplicateName {
                node: node.clone(),
                kind: EntityKind::Endpoint,
                name: name.to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NameError;

    const EXAMPLE: &str = r#"
nodename: example
broker: foo.bar.baz
instruments:
- name: provider0
  module: a_provider_module
  endpoints:
  - name: endpoint0
    module: an_endpoint_module
  - name: endpoint1
    module: another_endpoint_module
- name: provider1
  module: a_provider_module
  endpoints:
  - name: endpoint2
    module: an_endpoint_module
"#;

    #[test]
    fn builds_graph_with_every_instrument() {
        let graph = ConfigGraph::from_yaml_str(EXAMPLE).unwrap();

        assert_eq!(graph.node_name().as_str(), "example");
        assert_eq!(graph.broker().as_str(), "foo.bar.baz");
        assert_eq!(graph.instrument_count(), 2);
        assert!(graph.declares_instruments());
    }

    #[test]
    fn instrument_data_is_returned_without_its_name() {
        let graph = ConfigGraph::from_yaml_str(EXAMPLE).unwrap();
        let provider = graph.instrument("provider1").unwrap();

        let expected: Mapping = serde_yaml::from_str(
            r#"
module: a_provider_module
endpoints:
- name: endpoint2
  module: an_endpoint_module
"#,
        )
        .unwrap();
        assert_eq!(provider.as_mapping(), &expected);
        assert!(provider.get("name").is_none());
    }

    #[test]
    fn instrument_keys_keep_their_declared_order() {
        let graph = ConfigGraph::from_yaml_str(
            r#"
nodename: node1
broker: localhost
instruments:
- name: x
  a: 1
  b: 2
  c: 3
"#,
        )
        .unwrap();

        let keys: Vec<&str> = graph
            .instrument("x")
            .unwrap()
            .as_mapping()
            .keys()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn unknown_instrument_is_not_found() {
        let graph = ConfigGraph::from_yaml_str(EXAMPLE).unwrap();
        assert_eq!(
            graph.instrument("provider9").unwrap_err(),
            LookupError::NotFound {
                name: "provider9".to_string()
            }
        );
    }

    #[test]
    fn duplicate_instrument_names_fail_fast() {
        let text = r#"
nodename: example
broker: localhost
instruments:
- name: heater
- name: heater
- name: "bad.name"
"#;
        let err = ConfigGraph::from_yaml_str(text).unwrap_err();
        match &err {
            ConstructionError::DuplicateName { node, kind, name } => {
                assert_eq!(node.as_str(), "example");
                assert_eq!(*kind, EntityKind::Instrument);
                assert_eq!(name, "heater");
            }
            other => panic!("expected DuplicateName, got {other:?}"),
        }
        let message = err.to_string();
        assert!(message.contains("heater"));
        assert!(message.contains("example"));
    }

    #[test]
    fn duplicate_endpoint_names_across_instruments_are_rejected() {
        let text = r#"
nodename: example
broker: localhost
instruments:
- name: a
  endpoints:
  - name: temp
- name: b
  endpoints:
  - name: temp
"#;
        let err = ConfigGraph::from_yaml_str(text).unwrap_err();
        assert!(matches!(
            err,
            ConstructionError::DuplicateName { kind: EntityKind::Endpoint, ref name, .. } if name == "temp"
        ));
    }

    #[test]
    fn absent_instruments_differs_from_empty_instruments() {
        let absent = ConfigGraph::from_yaml_str("nodename: n\nbroker: b\n").unwrap();
        let empty = ConfigGraph::from_yaml_str("nodename: n\nbroker: b\ninstruments: []\n").unwrap();

        assert_eq!(absent.instrument_count(), 0);
        assert_eq!(empty.instrument_count(), 0);
        assert!(!absent.declares_instruments());
        assert!(absent.instruments().is_none());
        assert!(empty.declares_instruments());
        assert_eq!(empty.instruments().map(BTreeMap::len), Some(0));
        assert_ne!(absent, empty);
    }

    #[test]
    fn missing_required_fields_are_malformed() {
        for (text, missing) in [("broker: b\n", "nodename"), ("nodename: n\n", "broker")] {
            match ConfigGraph::from_yaml_str(text).unwrap_err() {
                ConstructionError::MalformedDocument { field, .. } => assert_eq!(field, missing),
                other => panic!("expected MalformedDocument, got {other:?}"),
            }
        }
    }

    #[test]
    fn instrument_without_name_is_malformed() {
        let text = "nodename: n\nbroker: b\ninstruments:\n- module: m\n";
        match ConfigGraph::from_yaml_str(text).unwrap_err() {
            ConstructionError::MalformedDocument { field, .. } => {
                assert_eq!(field, "instruments[0].name")
            }
            other => panic!("expected MalformedDocument, got {other:?}"),
        }
    }

    #[test]
    fn null_instruments_section_is_malformed() {
        let err = ConfigGraph::from_yaml_str("nodename: n\nbroker: b\ninstruments:\n").unwrap_err();
        assert!(matches!(err, ConstructionError::MalformedDocument { ref field, .. } if field == "instruments"));
    }

    #[test]
    fn names_with_periods_are_rejected() {
        let text = "nodename: n\nbroker: b\ninstruments:\n- name: lockin.x\n";
        match ConfigGraph::from_yaml_str(text).unwrap_err() {
            ConstructionError::InvalidName { field, source } => {
                assert_eq!(field, "instruments[0].name");
                assert!(matches!(source, NameError::ContainsSeparator { .. }));
            }
            other => panic!("expected InvalidName, got {other:?}"),
        }

        let err = ConfigGraph::from_yaml_str("nodename: my.node\nbroker: b\n").unwrap_err();
        assert!(matches!(err, ConstructionError::InvalidName { ref field, .. } if field == "nodename"));
    }

    #[test]
    fn unparseable_text_is_a_syntax_error() {
        let err = ConfigGraph::from_yaml_str("nodename: [unclosed\n").unwrap_err();
        assert!(matches!(err, ConstructionError::Syntax { .. }));
    }

    #[test]
    fn unreadable_file_keeps_the_io_error() {
        use std::error::Error as _;

        let err = ConfigGraph::from_path("/nonexistent/dir/node.yaml").unwrap_err();
        match &err {
            ConstructionError::SourceUnavailable { path, source } => {
                assert_eq!(path, Path::new("/nonexistent/dir/node.yaml"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected SourceUnavailable, got {other:?}"),
        }
        assert!(err.source().is_some());
    }

    #[test]
    fn graph_is_shareable_between_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConfigGraph>();
    }
}
