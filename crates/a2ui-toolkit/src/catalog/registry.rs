use serde_json::{Map, Value, json};
use std::collections::HashMap;

use crate::payload::ComponentKind;

/// What a component degrades to at the generic fallback level.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericFallback {
    pub kind: ComponentKind,
    pub default_props: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentRegistration {
    pub kind: ComponentKind,
    pub display_name: String,
    pub category: String,
    pub generic: Option<GenericFallback>,
}

impl ComponentRegistration {
    pub fn new(
        kind: ComponentKind,
        display_name: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            display_name: display_name.into(),
            category: category.into(),
            generic: None,
        }
    }

    /// Declares a generic fallback that keeps the component's own kind.
    pub fn with_default_props(mut self, props: Value) -> Self {
        let default_props = match props {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.generic = Some(GenericFallback {
            kind: self.kind.clone(),
            default_props,
        });
        self
    }

    pub fn with_generic(mut self, generic: GenericFallback) -> Self {
        self.generic = Some(generic);
        self
    }
}

/// Known component kinds and their rendering metadata.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    entries: HashMap<ComponentKind, ComponentRegistration>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new();
        let registrations = [
            ComponentRegistration::new(ComponentKind::Text, "文本", "standard"),
            ComponentRegistration::new(ComponentKind::Card, "卡片", "standard.layout"),
            ComponentRegistration::new(ComponentKind::PunnettSquare, "Punnett方格", "genetics")
                .with_default_props(json!({
                    "data": {
                        "maleGametes": ["A", "a"],
                        "femaleGametes": ["A", "a"],
                        "parentalCross": {
                            "male": {"genotype": "Aa", "phenotype": "显性"},
                            "female": {"genotype": "Aa", "phenotype": "显性"}
                        },
                        "offspring": [
                            {"genotype": "AA", "phenotype": "显性", "probability": 0.25},
                            {"genotype": "Aa", "phenotype": "显性", "probability": 0.5},
                            {"genotype": "aa", "phenotype": "隐性", "probability": 0.25}
                        ],
                        "description": "经典孟德尔杂交实验"
                    }
                })),
            ComponentRegistration::new(ComponentKind::InheritancePath, "遗传路径", "genetics")
                .with_default_props(json!({
                    "layout": "hierarchical",
                    "interactions": ["hover", "click"]
                })),
            ComponentRegistration::new(ComponentKind::KnowledgeGraph, "知识图谱", "learning")
                .with_default_props(json!({"width": 800, "height": 600})),
            ComponentRegistration::new(
                ComponentKind::MeiosisAnimation,
                "减数分裂动画",
                "cell_biology",
            )
            .with_default_props(json!({"autoplay": true, "loop": true, "speed": 1})),
            ComponentRegistration::new(
                ComponentKind::ProbabilityDistribution,
                "概率分布",
                "genetics",
            ),
            ComponentRegistration::new(
                ComponentKind::ChromosomeBehavior,
                "染色体行为",
                "cell_biology",
            ),
            ComponentRegistration::new(
                ComponentKind::DnaReplication,
                "DNA复制",
                "molecular_biology",
            ),
            ComponentRegistration::new(ComponentKind::Transcription, "转录", "molecular_biology"),
            ComponentRegistration::new(ComponentKind::Translation, "翻译", "molecular_biology"),
            ComponentRegistration::new(
                ComponentKind::GeneStructure,
                "基因结构",
                "molecular_biology",
            ),
            ComponentRegistration::new(ComponentKind::Crispr, "CRISPR基因编辑", "biotechnology"),
            ComponentRegistration::new(ComponentKind::Trisomy, "三体综合征", "genetics"),
            ComponentRegistration::new(ComponentKind::Mitosis, "有丝分裂", "cell_biology"),
            ComponentRegistration::new(ComponentKind::Allele, "等位基因", "genetics"),
            ComponentRegistration::new(ComponentKind::PedigreeChart, "系谱图", "genetics"),
        ];
        for registration in registrations {
            registry.register(registration);
        }
        registry
    }

    /// Adds or replaces a registration, returning the previous one.
    pub fn register(
        &mut self,
        registration: ComponentRegistration,
    ) -> Option<ComponentRegistration> {
        self.entries.insert(registration.kind.clone(), registration)
    }

    pub fn get(&self, kind: &ComponentKind) -> Option<&ComponentRegistration> {
        self.entries.get(kind)
    }

    pub fn is_registered(&self, kind: &ComponentKind) -> bool {
        self.entries.contains_key(kind)
    }

    pub fn generic_fallback(&self, kind: &ComponentKind) -> Option<&GenericFallback> {
        self.get(kind).and_then(|r| r.generic.as_ref())
    }

    pub fn display_name(&self, kind: &ComponentKind) -> Option<&str> {
        self.get(kind).map(|r| r.display_name.as_str())
    }

    /// Registrations in `category`, ordered by tag.
    pub fn by_category(&self, category: &str) -> Vec<&ComponentRegistration> {
        let mut found: Vec<_> = self
            .entries
            .values()
            .filter(|r| r.category == category)
            .collect();
        found.sort_by(|a, b| a.kind.as_str().cmp(b.kind.as_str()));
        found
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
