//! Turns a template plus data into a flat [`Payload`].
//!
//! Building is a pure transform: placeholders in the skeleton are
//! substituted, the nested skeleton is flattened into the id-keyed component
//! map, and a data model is derived from the flattened components. Ids for
//! unnamed nodes come from an injected [`IdSource`], so two builds of the same
//! `(template, data)` with fresh sources produce identical payloads.

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::LazyLock;

use crate::catalog::Template;
use crate::payload::{
    Component, ComponentKind, KNOWLEDGE_POINT_FIELDS, KNOWLEDGE_POINTS_KEY, PAYLOAD_VERSION,
    Payload, PayloadError, PayloadMetadata,
};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]*)\}").expect("placeholder pattern is valid"));

/// Supplies uniqueness suffixes for generated component ids.
pub trait IdSource {
    fn next_id(&mut self) -> u64;
}

/// Monotonic counter starting at 1.
#[derive(Debug, Clone)]
pub struct SequentialIds {
    next: u64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self { next: 1 }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSource for SequentialIds {
    fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Builds with a fresh [`SequentialIds`].
pub fn build(template: &Template, data: &Map<String, Value>) -> Result<Payload, PayloadError> {
    build_with_ids(template, data, &mut SequentialIds::new())
}

pub fn build_with_ids(
    template: &Template,
    data: &Map<String, Value>,
    ids: &mut dyn IdSource,
) -> Result<Payload, PayloadError> {
    let surface = substitute(&template.skeleton, data);

    let mut payload = Payload::new(String::new());
    let root_id = flatten(&surface, "", &mut payload, ids)?;
    payload.surface.root_id = root_id;
    payload.data_model = derive_data_model(&payload, data);
    payload.metadata = Some(PayloadMetadata {
        template_id: Some(template.template_id.clone()),
        version: Some(PAYLOAD_VERSION.to_string()),
        ..Default::default()
    });

    payload.validate()?;
    Ok(payload)
}

/// Replaces `${name}` placeholders with values from `data`.
///
/// A string that is exactly one placeholder takes the value with its JSON
/// type intact. Placeholders embedded in longer strings are interpolated.
/// Names missing from `data` are left as written.
pub fn substitute(node: &Value, data: &Map<String, Value>) -> Value {
    match node {
        Value::String(text) => substitute_str(text, data),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, data)).collect()),
        Value::Object(object) => Value::Object(
            object
                .iter()
                .map(|(k, v)| (k.clone(), substitute(v, data)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn substitute_str(text: &str, data: &Map<String, Value>) -> Value {
    if let Some(captures) = PLACEHOLDER.captures(text)
        && let Some(whole) = captures.get(0)
        && whole.start() == 0
        && whole.end() == text.len()
    {
        return match data.get(&captures[1]) {
            Some(value) => value.clone(),
            None => Value::String(text.to_string()),
        };
    }

    let replaced = PLACEHOLDER.replace_all(text, |caps: &Captures| match data.get(&caps[1]) {
        Some(Value::String(s)) => s.clone(),
        Some(value) => value.to_string(),
        None => caps[0].to_string(),
    });
    Value::String(replaced.into_owned())
}

/// Stores `node` and its descendants in `payload`, returning the node's id.
fn flatten(
    node: &Value,
    parent_id: &str,
    payload: &mut Payload,
    ids: &mut dyn IdSource,
) -> Result<String, PayloadError> {
    let object = node.as_object().ok_or_else(|| PayloadError::MalformedNode {
        parent: parent_id.to_string(),
        reason: "component literal is not an object".to_string(),
    })?;
    let tag = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| PayloadError::MalformedNode {
            parent: parent_id.to_string(),
            reason: "component literal has no string 'type'".to_string(),
        })?;

    let id = assign_id(object, tag, parent_id, payload, ids);

    let mut component = Component::new(ComponentKind::from_tag(tag), id.clone());
    if let Some(Value::Object(properties)) = object.get("properties") {
        component.properties = properties.clone();
    }
    component.metadata = object.get("metadata").filter(|m| !m.is_null()).cloned();
    component.data_ref = object
        .get("dataRef")
        .and_then(Value::as_str)
        .map(str::to_string);

    // Reserve the id before descending so children cannot take it.
    payload.insert_component(component);

    if let Some(Value::Array(children)) = object.get("children") {
        let mut child_ids = Vec::with_capacity(children.len());
        for child in children {
            child_ids.push(flatten(child, &id, payload, ids)?);
        }
        if let Some(component) = payload.component_mut(&id) {
            component.children = Some(child_ids);
        }
    }

    Ok(id)
}

fn assign_id(
    object: &Map<String, Value>,
    tag: &str,
    parent_id: &str,
    payload: &Payload,
    ids: &mut dyn IdSource,
) -> String {
    let explicit = object
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty());

    let mut candidate = match explicit {
        Some(id) => id.to_string(),
        None => generated_id(tag, parent_id, ids.next_id()),
    };
    while payload.component(&candidate).is_some() {
        candidate = match explicit {
            Some(id) => format!("{id}_{}", ids.next_id()),
            None => generated_id(tag, parent_id, ids.next_id()),
        };
    }
    candidate
}

fn generated_id(tag: &str, parent_id: &str, n: u64) -> String {
    if parent_id.is_empty() {
        format!("{tag}_{n}")
    } else {
        format!("{parent_id}_{tag}_{n}")
    }
}

/// Per-component data buckets plus the shared knowledge-point bundle.
pub fn derive_data_model(payload: &Payload, data: &Map<String, Value>) -> Map<String, Value> {
    let mut model = Map::new();

    for (id, component) in &payload.surface.components {
        let reference = component
            .properties
            .get("dataRef")
            .and_then(Value::as_str)
            .or(component.data_ref.as_deref());
        let bucket = match reference {
            Some(key) => data
                .get(key)
                .filter(|v| !v.is_null())
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new())),
            None => Value::Object(component.properties.clone()),
        };
        model.insert(id.clone(), bucket);
    }

    let knowledge: Map<String, Value> = KNOWLEDGE_POINT_FIELDS
        .iter()
        .filter_map(|field| {
            data.get(*field)
                .filter(|v| !v.is_null())
                .map(|v| (field.to_string(), v.clone()))
        })
        .collect();

    if !knowledge.is_empty() {
        for bucket in model.values_mut() {
            if let Value::Object(bucket) = bucket
                && !bucket.contains_key(KNOWLEDGE_POINTS_KEY)
            {
                bucket.insert(
                    KNOWLEDGE_POINTS_KEY.to_string(),
                    Value::Object(knowledge.clone()),
                );
            }
        }
        model.insert(KNOWLEDGE_POINTS_KEY.to_string(), Value::Object(knowledge));
    }

    model
}
