//! Wire types of the Rally WSAPI JSON envelope.
//!
//! Every response body is an object with a single key naming its type:
//! `{"QueryResult": {...}}` for queries, `{"HierarchicalRequirement": {...}}`
//! and friends for single objects.

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    HierarchicalRequirement,
    Defect,
    Task,
    Iteration,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::HierarchicalRequirement,
        ArtifactKind::Defect,
        ArtifactKind::Task,
        ArtifactKind::Iteration,
    ];

    /// The `_type` discriminator and envelope key.
    pub fn type_name(self) -> &'static str {
        match self {
            ArtifactKind::HierarchicalRequirement => "HierarchicalRequirement",
            ArtifactKind::Defect => "Defect",
            ArtifactKind::Task => "Task",
            ArtifactKind::Iteration => "Iteration",
        }
    }

    /// The URL segment used to query this kind.
    pub fn object_type(self) -> &'static str {
        match self {
            ArtifactKind::HierarchicalRequirement => "hierarchicalrequirement",
            ArtifactKind::Defect => "defect",
            ArtifactKind::Task => "task",
            ArtifactKind::Iteration => "iteration",
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.type_name().eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    QueryResult,
    Artifact(ArtifactKind),
}

impl EnvelopeKind {
    pub fn type_name(self) -> &'static str {
        match self {
            EnvelopeKind::QueryResult => "QueryResult",
            EnvelopeKind::Artifact(kind) => kind.type_name(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Envelope {
    QueryResult(QueryResult),
    Artifact(ArtifactKind, RallyObject),
}

/// One page of query results.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryResult {
    #[serde(default)]
    pub total_result_count: u64,
    #[serde(default)]
    pub page_size: u64,
    #[serde(default)]
    pub start_index: u64,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub results: Vec<RallyObject>,
}

/// A domain object as returned by Rally, either fully inlined or a bare reference.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct RallyObject(pub Map<String, Value>);

impl RallyObject {
    /// The `_type` discriminator.
    pub fn discriminator(&self) -> Option<&str> {
        self.0.get("_type").and_then(Value::as_str)
    }

    /// The canonical resource URI (`_ref`).
    pub fn reference(&self) -> Option<&str> {
        self.0.get("_ref").and_then(Value::as_str)
    }

    pub fn ref_object_name(&self) -> Option<&str> {
        self.0.get("_refObjectName").and_then(Value::as_str)
    }

    /// True when the entry carries only `_`-prefixed reference metadata.
    pub fn is_reference_only(&self) -> bool {
        self.0.keys().all(|k| k.starts_with('_'))
    }

    /// Look up a dotted path such as `Owner._refObjectName`.
    ///
    /// Returns `None` when any segment is missing or null.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        if current.is_null() {
            None
        } else {
            Some(current)
        }
    }
}
