//! Bulk-load artifacts.
//!
//! One group (single label or relationship type) becomes one CSV payload:
//! the kind's mandatory columns, then the union of property keys across the
//! whole group in first-seen order, then one row per member. The column set
//! is fixed before the first row is written, so every row has the header's
//! shape.

use crate::error::{Error, Result};
use crate::graph::{Node, Properties, PropertyValue, Relationship};
use crate::store::{StoreRecord, TargetKind};
use std::borrow::Cow;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// A node or relationship that can be staged in an artifact.
pub trait GroupMember: Sync {
    /// Kind of group the member belongs to.
    const KIND: TargetKind;

    /// Unique id.
    fn id(&self) -> &str;

    /// Values for [`TargetKind::mandatory_columns`], in order.
    fn mandatory_fields(&self) -> Vec<&str>;

    /// Open property bag.
    fn properties(&self) -> &Properties;

    /// Row-wise form of the member.
    fn to_record(&self) -> StoreRecord;
}

impl GroupMember for Node {
    const KIND: TargetKind = TargetKind::Nodes;

    fn id(&self) -> &str {
        &self.id
    }

    fn mandatory_fields(&self) -> Vec<&str> {
        vec![self.id.as_str()]
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn to_record(&self) -> StoreRecord {
        StoreRecord::from_node(self)
    }
}

impl GroupMember for Relationship {
    const KIND: TargetKind = TargetKind::Edges;

    fn id(&self) -> &str {
        &self.id
    }

    fn mandatory_fields(&self) -> Vec<&str> {
        vec![self.source.as_str(), self.target.as_str(), self.id.as_str()]
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn to_record(&self) -> StoreRecord {
        StoreRecord::from_relationship(self)
    }
}

/// Serialized group.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// Group kind.
    pub kind: TargetKind,
    /// Header, mandatory columns first.
    pub columns: Vec<String>,
    /// Header and rows joined with `\n`; empty for a group with no rows.
    pub payload: String,
    /// Number of data rows in `payload`.
    pub rows: usize,
    /// Ids of members left out because a value could not be encoded.
    pub dropped: Vec<String>,
}

impl Artifact {
    /// Whether there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Columns after the mandatory ones.
    pub fn property_columns(&self) -> &[String] {
        let skip = self.kind.mandatory_columns().len().min(self.columns.len());
        &self.columns[skip..]
    }
}

/// Quote a field iff it contains `,` `"` `\r` or `\n`, doubling inner quotes.
pub fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\r', '\n']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Raw string form of a value; `None` when it has no CSV form.
fn field_text(value: &PropertyValue) -> Option<Cow<'_, str>> {
    match value {
        PropertyValue::Null => Some(Cow::Borrowed("")),
        PropertyValue::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
        PropertyValue::Int(i) => Some(Cow::Owned(i.to_string())),
        PropertyValue::Float(f) if f.is_finite() => Some(Cow::Owned(f.to_string())),
        PropertyValue::Float(_) => None,
        PropertyValue::Text(s) => Some(Cow::Borrowed(s)),
    }
}

/// Why a member cannot be written to an artifact.
fn unencodable<T: GroupMember>(member: &T) -> Option<String> {
    let mandatory = T::KIND.mandatory_columns();
    for (key, value) in member.properties() {
        if mandatory.contains(&key.as_str()) {
            return Some(format!("property '{}' shadows a mandatory column", key));
        }
        if field_text(value).is_none() {
            return Some(format!("property '{}' holds a non-finite number", key));
        }
    }
    None
}

/// Serialize one group.
pub fn build_artifact<T: GroupMember>(members: &[&T]) -> Artifact {
    let mut dropped = Vec::new();
    let mut kept: Vec<&T> = Vec::with_capacity(members.len());
    for member in members {
        match unencodable(*member) {
            Some(reason) => {
                log::warn!("dropping {} from artifact: {}", member.id(), reason);
                dropped.push(member.id().to_string());
            }
            None => kept.push(*member),
        }
    }

    let mut columns: Vec<String> = T::KIND
        .mandatory_columns()
        .iter()
        .map(|c| c.to_string())
        .collect();
    let mut seen: HashSet<&str> = HashSet::new();
    for member in &kept {
        for key in member.properties().keys() {
            if seen.insert(key.as_str()) {
                columns.push(key.clone());
            }
        }
    }

    if kept.is_empty() {
        return Artifact {
            kind: T::KIND,
            columns,
            payload: String::new(),
            rows: 0,
            dropped,
        };
    }

    let mandatory_count = T::KIND.mandatory_columns().len();
    let mut lines = Vec::with_capacity(kept.len() + 1);
    lines.push(
        columns
            .iter()
            .map(|c| escape_field(c))
            .collect::<Vec<_>>()
            .join(","),
    );

    for member in &kept {
        let mut fields: Vec<Cow<'_, str>> = member
            .mandatory_fields()
            .into_iter()
            .map(escape_field)
            .collect();
        for column in &columns[mandatory_count..] {
            let text = member
                .properties()
                .get(column)
                .and_then(field_text)
                .unwrap_or(Cow::Borrowed(""));
            fields.push(Cow::Owned(escape_field(&text).into_owned()));
        }
        lines.push(fields.join(","));
    }

    Artifact {
        kind: T::KIND,
        columns,
        payload: lines.join("\n"),
        rows: kept.len(),
        dropped,
    }
}

/// Serialize a node group.
pub fn node_artifact(nodes: &[&Node]) -> Artifact {
    build_artifact(nodes)
}

/// Serialize a relationship group.
pub fn edge_artifact(relationships: &[&Relationship]) -> Artifact {
    build_artifact(relationships)
}

/// Identity of a staged artifact file.
///
/// `{run_id}__{nodes|edges}__{target}.csv`, with the target reduced to
/// `[A-Za-z0-9_-]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    /// Run that staged the artifact.
    pub run_id: String,
    /// Group kind.
    pub kind: TargetKind,
    /// Sanitized label or relationship type.
    pub target: String,
}

const ARTIFACT_EXTENSION: &str = ".csv";
const RUN_PREFIX: &str = "run_";

impl ArtifactName {
    /// Name for a group of one run.
    pub fn new(run_id: &str, kind: TargetKind, target: &str) -> Self {
        ArtifactName {
            run_id: run_id.to_string(),
            kind,
            target: sanitize(target),
        }
    }

    /// File name.
    pub fn file_name(&self) -> String {
        format!(
            "{}__{}__{}{}",
            self.run_id,
            self.kind.as_str(),
            self.target,
            ARTIFACT_EXTENSION
        )
    }

    /// Full path inside `dir`.
    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }

    /// Recognise an artifact file name.
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(ARTIFACT_EXTENSION)?;
        let mut parts = stem.splitn(3, "__");
        let run_id = parts.next()?;
        let kind = TargetKind::from_name(parts.next()?)?;
        let target = parts.next()?;
        if !run_id.starts_with(RUN_PREFIX) || target.is_empty() {
            return None;
        }
        Some(ArtifactName {
            run_id: run_id.to_string(),
            kind,
            target: target.to_string(),
        })
    }
}

fn sanitize(target: &str) -> String {
    let cleaned: String = target
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Remove artifacts in `dir` left behind by crashed runs.
///
/// An artifact is stale when it belongs to a run other than `current_run`
/// and was last modified at least `older_than` ago; younger files may
/// belong to a run still in progress. Files that do not look like artifacts
/// are never touched. A missing directory holds nothing to sweep. Returns
/// the number of files removed.
pub fn sweep_stale_artifacts(
    dir: &Path,
    current_run: Option<&str>,
    older_than: Duration,
) -> Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(source) => {
            return Err(Error::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|source| Error::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str().and_then(ArtifactName::parse) else {
            continue;
        };
        if Some(name.run_id.as_str()) == current_run {
            continue;
        }
        let path = entry.path();
        let age = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok());
        match age {
            Some(age) if age >= older_than => {}
            _ => {
                log::debug!("keeping recent artifact {}", path.display());
                continue;
            }
        }
        std::fs::remove_file(&path).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        log::info!("removed stale artifact {}", path.display());
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_field_rules() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("line\nbreak"), "\"line\nbreak\"");
        assert_eq!(escape_field("cr\r"), "\"cr\r\"");
        assert_eq!(escape_field(""), "");
        assert!(matches!(escape_field("no quotes needed"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_heterogeneous_keys_share_one_header() {
        let a = Node::new("n1", "File").with("name", "a.py");
        let b = Node::new("n2", "File").with("size", 10i64).with("name", "b.py");
        let c = Node::new("n3", "File").with("hidden", true);
        let artifact = node_artifact(&[&a, &b, &c]);

        assert_eq!(artifact.columns, vec!["id", "name", "size", "hidden"]);
        assert_eq!(
            artifact.payload,
            "id,name,size,hidden\nn1,a.py,,\nn2,b.py,10,\nn3,,,true"
        );
        assert_eq!(artifact.rows, 3);
        assert_eq!(artifact.property_columns(), &["name", "size", "hidden"]);
    }

    #[test]
    fn test_null_is_empty_field() {
        let n = Node::new("n1", "File").with("parent", None::<String>);
        let artifact = node_artifact(&[&n]);
        assert_eq!(artifact.payload, "id,parent\nn1,");
    }

    #[test]
    fn test_empty_group_has_empty_payload() {
        let artifact = node_artifact(&[]);
        assert!(artifact.is_empty());
        assert_eq!(artifact.payload, "");
        assert_eq!(artifact.rows, 0);
    }

    #[test]
    fn test_edge_columns() {
        let r = Relationship::between("a", "b", "CALLS").with("line", 4i64);
        let artifact = edge_artifact(&[&r]);
        assert_eq!(artifact.columns, vec!["source", "target", "id", "line"]);
        assert_eq!(artifact.payload, format!("source,target,id,line\na,b,{},4", r.id));
    }

    #[test]
    fn test_unencodable_member_is_dropped_without_shifting_columns() {
        let a = Node::new("n1", "File").with("score", f64::NAN);
        let b = Node::new("n2", "File").with("name", "b, c");
        let artifact = node_artifact(&[&a, &b]);
        assert_eq!(artifact.dropped, vec!["n1"]);
        assert_eq!(artifact.columns, vec!["id", "name"]);
        assert_eq!(artifact.payload, "id,name\nn2,\"b, c\"");
    }

    #[test]
    fn test_property_shadowing_mandatory_column_is_dropped() {
        let a = Node::new("n1", "File").with("id", "other");
        let artifact = node_artifact(&[&a]);
        assert_eq!(artifact.dropped, vec!["n1"]);
        assert!(artifact.is_empty());
    }

    #[test]
    fn test_artifact_name_round_trip() {
        let name = ArtifactName::new("run_abc123", TargetKind::Edges, "HAS/METHOD");
        assert_eq!(name.file_name(), "run_abc123__edges__HAS_METHOD.csv");
        assert_eq!(ArtifactName::parse(&name.file_name()), Some(name));
        assert_eq!(ArtifactName::parse("notes.csv"), None);
        assert_eq!(ArtifactName::parse("run_x__things__File.csv"), None);
    }

    #[test]
    fn test_sweep_only_removes_other_runs() {
        let dir = tempfile::tempdir().unwrap();
        let stale = ArtifactName::new("run_old", TargetKind::Nodes, "File").path_in(dir.path());
        let live = ArtifactName::new("run_new", TargetKind::Nodes, "File").path_in(dir.path());
        let other = dir.path().join("keep.csv");
        for path in [&stale, &live, &other] {
            std::fs::write(path, "id\nx").unwrap();
        }

        let removed = sweep_stale_artifacts(dir.path(), Some("run_new"), Duration::ZERO).unwrap();
        assert_eq!(removed, 1);
        assert!(!stale.exists());
        assert!(live.exists());
        assert!(other.exists());

        let missing = dir.path().join("nope");
        assert_eq!(sweep_stale_artifacts(&missing, None, Duration::ZERO).unwrap(), 0);
    }

    #[test]
    fn test_sweep_keeps_recent_artifacts_of_other_runs() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = ArtifactName::new("run_busy", TargetKind::Nodes, "File").path_in(dir.path());
        std::fs::write(&fresh, "id\nx").unwrap();

        let removed = sweep_stale_artifacts(dir.path(), None, Duration::from_secs(600)).unwrap();
        assert_eq!(removed, 0);
        assert!(fresh.exists());

        std::thread::sleep(Duration::from_millis(20));
        let removed =
            sweep_stale_artifacts(dir.path(), None, Duration::from_millis(10)).unwrap();
        assert_eq!(removed, 1);
        assert!(!fresh.exists());
    }
}
