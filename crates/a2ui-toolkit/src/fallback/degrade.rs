//! Level-dependent payload rewrites.
//!
//! Every function here takes the payload by reference and returns a new one.
//! Component ids never change, so the surface stays a valid tree at every
//! level.

use serde_json::{Map, Value, json};

use super::FallbackLevel;
use crate::catalog::ComponentRegistry;
use crate::payload::{Component, ComponentKind, KNOWLEDGE_POINTS_KEY, Payload};

const MAX_GRAPH_NODES: usize = 10;
const MAX_GRAPH_LINKS: usize = 15;
const MAX_ANIMATION_STAGES: usize = 4;
const SIMPLIFIED_SPEED: f64 = 0.5;

/// Rewrites `payload` for `level`, touching only `target` when given.
pub fn degrade(
    payload: &Payload,
    level: FallbackLevel,
    target: Option<&str>,
    registry: &ComponentRegistry,
) -> Payload {
    let mut degraded = payload.clone();
    if level == FallbackLevel::Full {
        return degraded;
    }

    let targeted: Vec<String> = degraded
        .surface
        .components
        .keys()
        .filter(|id| target.is_none_or(|t| t == id.as_str()))
        .cloned()
        .collect();

    for id in targeted {
        let Some(component) = degraded.surface.components.get_mut(&id) else {
            continue;
        };
        match level {
            FallbackLevel::Full => {}
            FallbackLevel::Simplified => simplify(component),
            FallbackLevel::Generic => genericize(component, registry),
            FallbackLevel::TextOnly => to_text(component),
        }
        let bound = component.data_ref.is_some() || component.properties.contains_key("dataRef");
        if !bound {
            let mut bucket = component.properties.clone();
            if let Some(points) = degraded
                .data_model
                .get(&id)
                .and_then(|previous| previous.get(KNOWLEDGE_POINTS_KEY))
            {
                bucket
                    .entry(KNOWLEDGE_POINTS_KEY)
                    .or_insert_with(|| points.clone());
            }
            degraded.data_model.insert(id, Value::Object(bucket));
        }
    }

    let metadata = degraded.metadata.get_or_insert_with(Default::default);
    metadata.fallback_level = Some(level.as_u8());
    metadata.fallback_reason = Some(level.reason().to_string());
    degraded
}

/// Caps list sizes and turns off interaction and animation.
fn simplify(component: &mut Component) {
    let properties = &mut component.properties;
    match component.kind {
        ComponentKind::KnowledgeGraph => {
            truncate_list(properties, "nodes", MAX_GRAPH_NODES);
            truncate_list(properties, "links", MAX_GRAPH_LINKS);
            properties.insert("interactive".to_string(), Value::Bool(false));
        }
        ComponentKind::MeiosisAnimation => {
            truncate_list(properties, "stages", MAX_ANIMATION_STAGES);
            let mut controls = match properties.remove("controls") {
                Some(Value::Object(controls)) => controls,
                _ => Map::new(),
            };
            controls.insert("autoplay".to_string(), Value::Bool(false));
            controls.insert("speed".to_string(), json!(SIMPLIFIED_SPEED));
            properties.insert("controls".to_string(), Value::Object(controls));
        }
        ComponentKind::PunnettSquare => {
            properties.insert("interactive".to_string(), Value::Bool(false));
            properties.insert("showLabels".to_string(), Value::Bool(true));
        }
        _ => {
            if let Some(interactive) = properties.get_mut("interactive") {
                *interactive = Value::Bool(false);
            }
        }
    }
}

/// Missing or non-array lists become empty.
fn truncate_list(properties: &mut Map<String, Value>, key: &str, max: usize) {
    let list = match properties.remove(key) {
        Some(Value::Array(mut items)) => {
            items.truncate(max);
            items
        }
        _ => Vec::new(),
    };
    properties.insert(key.to_string(), Value::Array(list));
}

fn genericize(component: &mut Component, registry: &ComponentRegistry) {
    match registry.generic_fallback(&component.kind) {
        Some(generic) => {
            component.kind = generic.kind.clone();
            for (key, value) in &generic.default_props {
                component.properties.insert(key.clone(), value.clone());
            }
        }
        None => {
            let message = format!("无法显示 {} 可视化", component.kind);
            component.kind = ComponentKind::Text;
            component.properties = Map::from_iter([
                ("content".to_string(), Value::String(message)),
                ("variant".to_string(), json!("error")),
            ]);
            component.children = None;
        }
    }
}

fn to_text(component: &mut Component) {
    let content = text_content(component);
    component.kind = ComponentKind::Text;
    component.properties = Map::from_iter([
        ("content".to_string(), Value::String(content)),
        ("variant".to_string(), json!("body")),
    ]);
    component.children = None;
    component.data_ref = None;
}

/// `content`, else title and description with a `key: value` dump of
/// `data`, else the properties as pretty JSON.
pub fn text_content(component: &Component) -> String {
    let properties = &component.properties;
    if let Some(content) = properties.get("content").and_then(Value::as_str) {
        return content.to_string();
    }

    if let Some(title) = properties.get("title").and_then(Value::as_str) {
        let mut lines = vec![title.to_string()];
        if let Some(description) = properties.get("description").and_then(Value::as_str) {
            lines.push(description.to_string());
        }
        if let Some(Value::Object(data)) = properties.get("data") {
            for (key, value) in data {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                lines.push(format!("{key}: {rendered}"));
            }
        }
        return lines.join("\n");
    }

    serde_json::to_string_pretty(properties).unwrap_or_default()
}
