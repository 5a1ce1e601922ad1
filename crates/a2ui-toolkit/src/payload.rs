//! The A2UI payload: a flat, id-addressed component graph plus its data model.
//!
//! A payload is the only contract between generation and rendering. The
//! surface keeps every component in one map keyed by id; parents reference
//! children through ordered id lists, so the wire format is an arena rather
//! than a nested tree.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Payload format version written by this crate.
pub const PAYLOAD_VERSION: &str = "1.0";

/// Reserved data-model key carrying the knowledge-point bundle.
pub const KNOWLEDGE_POINTS_KEY: &str = "_knowledgePoints";

/// The four knowledge-point fields copied from request data.
pub const KNOWLEDGE_POINT_FIELDS: [&str; 4] = [
    "keyPoints",
    "understandingPoints",
    "commonMistakes",
    "checkQuestions",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    #[serde(default = "default_version")]
    pub version: String,
    pub surface: Surface,
    #[serde(default)]
    pub data_model: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PayloadMetadata>,
}

fn default_version() -> String {
    PAYLOAD_VERSION.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Surface {
    pub root_id: String,
    #[serde(default)]
    pub components: BTreeMap<String, Component>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    pub id: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_ref: Option<String>,
}

impl Component {
    pub fn new(kind: ComponentKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            properties: Map::new(),
            children: None,
            metadata: None,
            data_ref: None,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_children(mut self, children: Vec<String>) -> Self {
        self.children = Some(children);
        self
    }

    /// Ordered child ids, empty for leaves.
    pub fn child_ids(&self) -> &[String] {
        self.children.as_deref().unwrap_or(&[])
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }
}

/// Component type tag.
///
/// Known kinds are matched exhaustively; anything else deserializes into
/// [`ComponentKind::Unknown`] and keeps its original tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ComponentKind {
    Card,
    Text,
    PunnettSquare,
    InheritancePath,
    KnowledgeGraph,
    MeiosisAnimation,
    ProbabilityDistribution,
    ChromosomeBehavior,
    DnaReplication,
    Transcription,
    Translation,
    GeneStructure,
    Crispr,
    Trisomy,
    Mitosis,
    Allele,
    PedigreeChart,
    TestCross,
    ThreePointTestCross,
    Unknown(String),
}

impl ComponentKind {
    pub const KNOWN: [ComponentKind; 19] = [
        ComponentKind::Card,
        ComponentKind::Text,
        ComponentKind::PunnettSquare,
        ComponentKind::InheritancePath,
        ComponentKind::KnowledgeGraph,
        ComponentKind::MeiosisAnimation,
        ComponentKind::ProbabilityDistribution,
        ComponentKind::ChromosomeBehavior,
        ComponentKind::DnaReplication,
        ComponentKind::Transcription,
        ComponentKind::Translation,
        ComponentKind::GeneStructure,
        ComponentKind::Crispr,
        ComponentKind::Trisomy,
        ComponentKind::Mitosis,
        ComponentKind::Allele,
        ComponentKind::PedigreeChart,
        ComponentKind::TestCross,
        ComponentKind::ThreePointTestCross,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            ComponentKind::Card => "card",
            ComponentKind::Text => "text",
            ComponentKind::PunnettSquare => "ahatutor-punnett-square",
            ComponentKind::InheritancePath => "ahatutor-inheritance-path",
            ComponentKind::KnowledgeGraph => "ahatutor-knowledge-graph",
            ComponentKind::MeiosisAnimation => "ahatutor-meiosis-animation",
            ComponentKind::ProbabilityDistribution => "ahatutor-probability-distribution",
            ComponentKind::ChromosomeBehavior => "ahatutor-chromosome-behavior",
            ComponentKind::DnaReplication => "ahatutor-dna-replication",
            ComponentKind::Transcription => "ahatutor-transcription",
            ComponentKind::Translation => "ahatutor-translation",
            ComponentKind::GeneStructure => "ahatutor-gene-structure",
            ComponentKind::Crispr => "ahatutor-crispr",
            ComponentKind::Trisomy => "ahatutor-trisomy",
            ComponentKind::Mitosis => "ahatutor-mitosis",
            ComponentKind::Allele => "ahatutor-allele",
            ComponentKind::PedigreeChart => "ahatutor-pedigree-chart",
            ComponentKind::TestCross => "ahatutor-test-cross",
            ComponentKind::ThreePointTestCross => "ahatutor-three-point-test-cross",
            ComponentKind::Unknown(tag) => tag,
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|kind| kind.as_str() == tag)
            .cloned()
            .unwrap_or_else(|| ComponentKind::Unknown(tag.to_string()))
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ComponentKind::Unknown(_))
    }
}

impl From<String> for ComponentKind {
    fn from(tag: String) -> Self {
        match Self::from_tag(&tag) {
            ComponentKind::Unknown(_) => ComponentKind::Unknown(tag),
            known => known,
        }
    }
}

impl From<ComponentKind> for String {
    fn from(kind: ComponentKind) -> Self {
        match kind {
            ComponentKind::Unknown(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Violations of the surface invariants.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PayloadError {
    #[error("root component '{root_id}' is not in the component map")]
    MissingRoot { root_id: String },

    #[error("component '{parent}' lists unknown child '{child}'")]
    DanglingChild { parent: String, child: String },

    #[error("component '{id}' is its own ancestor")]
    Cycle { id: String },

    #[error("component '{id}' is reachable from more than one parent")]
    SharedChild { id: String },

    #[error("component stored under '{key}' declares id '{id}'")]
    IdMismatch { key: String, id: String },

    #[error("surface has no components")]
    Empty,

    #[error("malformed component under '{parent}': {reason}")]
    MalformedNode { parent: String, reason: String },
}

impl Payload {
    /// An empty payload rooted at `root_id`.
    pub fn new(root_id: impl Into<String>) -> Self {
        Self {
            version: PAYLOAD_VERSION.to_string(),
            surface: Surface {
                root_id: root_id.into(),
                components: BTreeMap::new(),
            },
            data_model: Map::new(),
            metadata: None,
        }
    }

    /// Two-node error surface: a card holding one text component.
    pub fn text_fallback(message: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut payload = Payload::new("fallback");
        let text = Component::new(ComponentKind::Text, "fallback_text")
            .with_property("content", Value::String(message.into()))
            .with_property("variant", json!("error"));
        let card = Component::new(ComponentKind::Card, "fallback")
            .with_property("title", json!("可视化暂不可用"))
            .with_children(vec![text.id.clone()]);

        payload
            .data_model
            .insert(text.id.clone(), Value::Object(text.properties.clone()));
        payload
            .data_model
            .insert(card.id.clone(), Value::Object(card.properties.clone()));
        payload.insert_component(card);
        payload.insert_component(text);
        payload.metadata = Some(PayloadMetadata {
            version: Some(PAYLOAD_VERSION.to_string()),
            fallback_level: Some(3),
            fallback_reason: Some(reason.into()),
            ..Default::default()
        });
        payload
    }

    pub fn insert_component(&mut self, component: Component) {
        self.surface
            .components
            .insert(component.id.clone(), component);
    }

    pub fn root_id(&self) -> &str {
        &self.surface.root_id
    }

    pub fn component(&self, id: &str) -> Option<&Component> {
        self.surface.components.get(id)
    }

    pub fn component_mut(&mut self, id: &str) -> Option<&mut Component> {
        self.surface.components.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.surface.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surface.components.is_empty()
    }

    /// Components reachable from the root, parents before children.
    pub fn iter_depth_first(&self) -> Vec<&Component> {
        let mut ordered = Vec::with_capacity(self.len());
        let mut seen = HashSet::new();
        let mut stack = vec![self.surface.root_id.as_str()];

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(component) = self.component(id) {
                ordered.push(component);
                for child in component.child_ids().iter().rev() {
                    stack.push(child.as_str());
                }
            }
        }

        ordered
    }

    /// Checks root presence, child closure, tree shape and key/id agreement.
    pub fn validate(&self) -> Result<(), PayloadError> {
        if self.is_empty() {
            return Err(PayloadError::Empty);
        }

        for (key, component) in &self.surface.components {
            if key != &component.id {
                return Err(PayloadError::IdMismatch {
                    key: key.clone(),
                    id: component.id.clone(),
                });
            }
        }

        let root = self.root_id();
        if !self.surface.components.contains_key(root) {
            return Err(PayloadError::MissingRoot {
                root_id: root.to_string(),
            });
        }

        let mut seen = HashSet::new();
        let mut path = HashSet::new();
        self.visit(root, &mut seen, &mut path)
    }

    fn visit<'a>(
        &'a self,
        id: &'a str,
        seen: &mut HashSet<&'a str>,
        path: &mut HashSet<&'a str>,
    ) -> Result<(), PayloadError> {
        seen.insert(id);
        path.insert(id);

        if let Some(component) = self.component(id) {
            for child in component.child_ids() {
                if !self.surface.components.contains_key(child) {
                    return Err(PayloadError::DanglingChild {
                        parent: id.to_string(),
                        child: child.clone(),
                    });
                }
                if path.contains(child.as_str()) {
                    return Err(PayloadError::Cycle { id: child.clone() });
                }
                if seen.contains(child.as_str()) {
                    return Err(PayloadError::SharedChild { id: child.clone() });
                }
                self.visit(child, seen, path)?;
            }
        }

        path.remove(id);
        Ok(())
    }
}

/// Caller-keyed payload cache. Entries live until removed or cleared.
#[derive(Debug, Default)]
pub struct PayloadCache {
    entries: HashMap<String, Payload>,
}

impl PayloadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a payload, returning the one it replaced.
    pub fn insert(&mut self, key: impl Into<String>, payload: Payload) -> Option<Payload> {
        self.entries.insert(key.into(), payload)
    }

    pub fn get(&self, key: &str) -> Option<&Payload> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Payload> {
        self.entries.remove(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
