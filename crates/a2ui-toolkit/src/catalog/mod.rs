//! Immutable template catalog and component registry.
//!
//! Both are built once at startup and shared read-only through [`Catalog`].
//! Nothing here is mutated after construction, so concurrent readers need no
//! synchronization.

pub mod registry;

pub use registry::{ComponentRegistration, ComponentRegistry, GenericFallback};

use jsonschema::Validator;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

const BUILTIN_TEMPLATES: &str = include_str!("../../data/a2ui_templates.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
        }
    }
}

/// A parameterized visualization: schema, defaults and a component skeleton
/// whose string leaves may be `${name}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub template_id: String,
    pub visualization_type: String,
    pub complexity: Complexity,
    /// JSON Schema for the template's data; compiled once when the catalog
    /// is built.
    #[serde(default = "object_schema")]
    pub schema: Value,
    #[serde(default)]
    pub default_values: Map<String, Value>,
    #[serde(alias = "a2uiTemplate")]
    pub skeleton: Value,
}

impl Template {
    /// `defaultValues` overlaid with `data`; keys in `data` win.
    pub fn merged_with(&self, data: &Map<String, Value>) -> Map<String, Value> {
        let mut merged = self.default_values.clone();
        for (key, value) in data {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Names listed under the schema's top-level `required`.
    pub fn required_fields(&self) -> Vec<String> {
        self.schema
            .get("required")
            .and_then(Value::as_array)
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn summary(&self) -> TemplateSummary {
        TemplateSummary {
            template_id: self.template_id.clone(),
            visualization_type: self.visualization_type.clone(),
            complexity: self.complexity,
        }
    }
}

fn object_schema() -> Value {
    serde_json::json!({"type": "object"})
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    pub template_id: String,
    pub visualization_type: String,
    pub complexity: Complexity,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaViolation {
    #[error("required field '{field}' is missing")]
    MissingField { field: String },

    #[error("'{path}' is invalid: {message}")]
    Invalid { path: String, message: String },

    #[error("template schema does not compile: {reason}")]
    InvalidSchema { reason: String },
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse template data: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate template id: {template_id}")]
    DuplicateTemplate { template_id: String },

    #[error("template '{template_id}' has an invalid skeleton: {reason}")]
    InvalidSkeleton { template_id: String, reason: String },

    #[error("template '{template_id}' has an invalid schema: {reason}")]
    InvalidSchema { template_id: String, reason: String },
}

#[derive(Deserialize)]
struct TemplateFile {
    templates: Vec<Template>,
}

/// Ordered, id-indexed set of templates with their compiled schemas.
#[derive(Clone, Default)]
pub struct TemplateCatalog {
    templates: Vec<Template>,
    by_id: HashMap<String, usize>,
    validators: HashMap<String, Arc<Validator>>,
}

impl fmt::Debug for TemplateCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateCatalog")
            .field("templates", &self.templates)
            .finish_non_exhaustive()
    }
}

impl TemplateCatalog {
    /// The embedded genetics template set.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_TEMPLATES)
    }

    /// Parses `{"templates": [...]}`.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let file: TemplateFile = serde_json::from_str(json)?;
        Self::from_templates(file.templates)
    }

    pub fn from_templates(templates: Vec<Template>) -> Result<Self, CatalogError> {
        let mut by_id = HashMap::with_capacity(templates.len());
        let mut validators = HashMap::with_capacity(templates.len());
        for (index, template) in templates.iter().enumerate() {
            check_skeleton(&template.template_id, &template.skeleton)?;
            if by_id
                .insert(template.template_id.clone(), index)
                .is_some()
            {
                return Err(CatalogError::DuplicateTemplate {
                    template_id: template.template_id.clone(),
                });
            }
            let validator = jsonschema::validator_for(&template.schema).map_err(|e| {
                CatalogError::InvalidSchema {
                    template_id: template.template_id.clone(),
                    reason: e.to_string(),
                }
            })?;
            validators.insert(template.template_id.clone(), Arc::new(validator));
        }
        Ok(Self {
            templates,
            by_id,
            validators,
        })
    }

    /// Checks `data` against the template's schema. Null values count as
    /// absent: a null required field is missing and other nulls are ignored.
    /// Only the first violation is reported.
    pub fn validate(
        &self,
        template: &Template,
        data: &Map<String, Value>,
    ) -> Result<(), SchemaViolation> {
        for field in template.required_fields() {
            if data.get(&field).is_none_or(Value::is_null) {
                return Err(SchemaViolation::MissingField { field });
            }
        }

        let instance = Value::Object(
            data.iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        );

        let compiled;
        let validator = match self.validators.get(&template.template_id) {
            Some(validator) => validator.as_ref(),
            None => {
                compiled = jsonschema::validator_for(&template.schema).map_err(|e| {
                    SchemaViolation::InvalidSchema {
                        reason: e.to_string(),
                    }
                })?;
                &compiled
            }
        };

        match validator.iter_errors(&instance).next() {
            Some(error) => Err(SchemaViolation::Invalid {
                path: error.instance_path.to_string(),
                message: error.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn get(&self, template_id: &str) -> Option<&Template> {
        self.by_id.get(template_id).map(|&i| &self.templates[i])
    }

    pub fn contains(&self, template_id: &str) -> bool {
        self.by_id.contains_key(template_id)
    }

    /// First template registered for `visualization_type`.
    pub fn by_visualization_type(&self, visualization_type: &str) -> Option<&Template> {
        self.templates
            .iter()
            .find(|t| t.visualization_type == visualization_type)
    }

    pub fn summaries(&self) -> Vec<TemplateSummary> {
        self.templates.iter().map(Template::summary).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn check_skeleton(template_id: &str, node: &Value) -> Result<(), CatalogError> {
    let invalid = |reason: &str| CatalogError::InvalidSkeleton {
        template_id: template_id.to_string(),
        reason: reason.to_string(),
    };

    let object = node
        .as_object()
        .ok_or_else(|| invalid("node is not an object"))?;
    if !object.get("type").is_some_and(Value::is_string) {
        return Err(invalid("node has no string 'type'"));
    }
    match object.get("children") {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Array(children)) => children
            .iter()
            .try_for_each(|child| check_skeleton(template_id, child)),
        Some(_) => Err(invalid("'children' is not an array")),
    }
}

/// Read-only configuration shared by every consumer.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub templates: TemplateCatalog,
    pub registry: ComponentRegistry,
}

impl Catalog {
    pub fn new(templates: TemplateCatalog, registry: ComponentRegistry) -> Self {
        Self {
            templates,
            registry,
        }
    }

    pub fn builtin() -> Result<Arc<Self>, CatalogError> {
        Ok(Arc::new(Self::new(
            TemplateCatalog::builtin()?,
            ComponentRegistry::builtin(),
        )))
    }
}
