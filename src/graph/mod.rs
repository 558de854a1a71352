//! In-memory staging graph.
//!
//! Extraction appends [`Node`]s and [`Relationship`]s to a [`GraphModel`];
//! the commit engine reads them back grouped by label / relationship type.
//! Property shapes are open: two nodes with the same label may carry
//! different keys, and the column set is derived per group at commit time.

pub mod resolve;
pub mod schema;

use crate::ids::generate_deterministic_id;
use crate::ingest::imports::ImportRecord;
use resolve::FileIndex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Scalar property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Absent / unknown value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 text.
    Text(String),
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<usize> for PropertyValue {
    fn from(value: usize) -> Self {
        PropertyValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(PropertyValue::Null, Into::into)
    }
}

/// Open key/value bag, ordered by key.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A labelled graph entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique id within a commit run.
    pub id: String,
    /// Partition key (File, Function, ...).
    pub label: String,
    /// Per-instance properties.
    pub properties: Properties,
}

impl Node {
    /// Create a node with no properties.
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Node {
            id: id.into(),
            label: label.into(),
            properties: Properties::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with(mut self, key: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

/// A typed, directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Unique id within a commit run.
    pub id: String,
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Partition key (CONTAINS, CALLS, ...).
    pub rel_type: String,
    /// Per-instance properties.
    pub properties: Properties,
}

impl Relationship {
    /// Create an edge whose id is derived from its endpoints and type, so
    /// re-ingesting the same structure reproduces the same id.
    pub fn between(source: &str, target: &str, rel_type: &str) -> Self {
        Self::keyed(source, target, rel_type, "")
    }

    /// Like [`Relationship::between`], with an extra discriminator for
    /// parallel edges of one type between the same endpoints.
    pub fn keyed(source: &str, target: &str, rel_type: &str, discriminator: &str) -> Self {
        let key = format!("{}|{}|{}", source, target, discriminator);
        Relationship {
            id: generate_deterministic_id(rel_type, &key),
            source: source.to_string(),
            target: target.to_string(),
            rel_type: rel_type.to_string(),
            properties: Properties::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with(mut self, key: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

/// Members of one label or relationship type, in insertion order.
#[derive(Debug, Clone)]
pub struct Group<'a, T> {
    /// Label or relationship type shared by every member.
    pub key: &'a str,
    /// Members in the order they were added.
    pub members: Vec<&'a T>,
}

/// Edges and placeholder nodes produced by lowering import records.
#[derive(Debug, Clone, Default)]
pub struct ImportLowering {
    /// One IMPORTS edge per record.
    pub edges: Vec<Relationship>,
    /// External nodes for targets outside the ingested file set, one per target.
    pub external_nodes: Vec<Node>,
}

/// Append-only staging graph.
#[derive(Debug, Clone, Default)]
pub struct GraphModel {
    nodes: Vec<Node>,
    relationships: Vec<Relationship>,
    external_ids: HashSet<String>,
}

impl GraphModel {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node. Duplicate ids are kept; stores collapse them on upsert.
    pub fn add_node(&mut self, node: Node) {
        self.nodes.push(node);
    }

    /// Append a relationship.
    pub fn add_relationship(&mut self, relationship: Relationship) {
        self.relationships.push(relationship);
    }

    /// All staged nodes in insertion order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All staged relationships in insertion order.
    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Number of staged nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of staged relationships.
    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    /// Lower import records to IMPORTS edges.
    ///
    /// A record whose target resolves to an indexed file points at that
    /// file's node. Anything else points at an `External` node keyed by the
    /// specifier (and, for relative specifiers, the importer's directory), so
    /// the import stays visible to graph queries. Records whose
    /// importing file is not indexed are dropped with a debug log.
    pub fn lower_imports_to_edges(
        &self,
        records: &[ImportRecord],
        index: &FileIndex,
    ) -> ImportLowering {
        let mut lowering = ImportLowering::default();
        let mut seen_external: HashSet<String> = HashSet::new();

        for record in records {
            let Some(source_id) = index.id_for_path(&record.importing_file) else {
                log::debug!(
                    "import of '{}' from unindexed file {}",
                    record.target_file,
                    record.importing_file.display()
                );
                continue;
            };

            let (target_id, resolved) = match index.resolve(record) {
                Some(file_id) => (file_id.to_string(), true),
                None => {
                    let node = external_node(record);
                    let id = node.id.clone();
                    if !self.external_ids.contains(&id) && seen_external.insert(id.clone()) {
                        lowering.external_nodes.push(node);
                    }
                    (id, false)
                }
            };

            let discriminator = format!(
                "{}|{}|{}",
                record.target_file, record.exported_name, record.local_name
            );
            lowering.edges.push(
                Relationship::keyed(source_id, &target_id, schema::REL_IMPORTS, &discriminator)
                    .with("local_name", record.local_name.as_str())
                    .with("exported_name", record.exported_name.as_str())
                    .with("import_type", record.import_type.as_str())
                    .with("specifier", record.target_file.as_str())
                    .with("resolved", resolved),
            );
        }

        lowering
    }

    /// Lower import records and append the result to the model.
    ///
    /// Returns the number of IMPORTS edges added.
    pub fn add_imports(&mut self, records: &[ImportRecord], index: &FileIndex) -> usize {
        let lowering = self.lower_imports_to_edges(records, index);
        let added = lowering.edges.len();
        for node in lowering.external_nodes {
            self.external_ids.insert(node.id.clone());
            self.add_node(node);
        }
        for edge in lowering.edges {
            self.add_relationship(edge);
        }
        added
    }

    /// Partition nodes by label, groups in first-seen order.
    pub fn group_by_label(&self) -> Vec<Group<'_, Node>> {
        group(&self.nodes, |n| n.label.as_str())
    }

    /// Partition relationships by type, groups in first-seen order.
    pub fn group_by_type(&self) -> Vec<Group<'_, Relationship>> {
        group(&self.relationships, |r| r.rel_type.as_str())
    }
}

/// External node for an unresolved import.
///
/// Relative specifiers (leading `.` or `/`) name different modules from
/// different directories, so they are keyed by the importer's directory too.
fn external_node(record: &ImportRecord) -> Node {
    let specifier = record.target_file.as_str();
    if !(specifier.starts_with('.') || specifier.starts_with('/')) {
        return Node::new(
            generate_deterministic_id(schema::LABEL_EXTERNAL, specifier),
            schema::LABEL_EXTERNAL,
        )
        .with("name", specifier)
        .with("external", true);
    }

    let scope = record
        .importing_file
        .parent()
        .map(|dir| dir.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default();
    Node::new(
        generate_deterministic_id(schema::LABEL_EXTERNAL, &format!("{}|{}", scope, specifier)),
        schema::LABEL_EXTERNAL,
    )
    .with("name", specifier)
    .with("external", true)
    .with("scope", scope)
}

fn group<'a, T>(items: &'a [T], key: impl Fn(&'a T) -> &'a str) -> Vec<Group<'a, T>> {
    let mut slots: HashMap<&'a str, usize> = HashMap::new();
    let mut groups: Vec<Group<'a, T>> = Vec::new();

    for item in items {
        let k = key(item);
        let slot = *slots.entry(k).or_insert_with(|| {
            groups.push(Group {
                key: k,
                members: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].members.push(item);
    }

    groups
}
