//! Keyword and concept scoring of free-text questions against the catalog.
//!
//! Matching has two paths. The fast path walks the rules in order and returns
//! the first rule with a keyword inside the question, at confidence 1.0. Only
//! when no keyword hits does the slow path run: it extracts a concept, counts
//! matched keywords across all rules and ranks templates by overlap.

pub mod rules;
pub mod suggest;

pub use rules::{MatchRule, builtin_rules, extract_concept};
pub use suggest::suggested_parameters;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::catalog::{Catalog, Template};

#[derive(Debug, Clone, PartialEq)]
pub struct MatcherConfig {
    /// Slow-path matches below this confidence are rejected.
    pub min_confidence: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAnalysis {
    pub extracted_concept: Option<String>,
    pub matched_keywords: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub matched: bool,
    pub template_id: Option<String>,
    #[serde(skip)]
    pub template: Option<Template>,
    pub confidence: f64,
    pub analysis: QuestionAnalysis,
    pub required_parameters: Vec<String>,
    pub suggested_parameters: Map<String, Value>,
}

impl MatchResult {
    fn matched(question: &str, template: &Template, analysis: QuestionAnalysis) -> Self {
        Self {
            matched: true,
            template_id: Some(template.template_id.clone()),
            template: Some(template.clone()),
            confidence: analysis.confidence,
            analysis,
            required_parameters: template.required_fields(),
            suggested_parameters: suggested_parameters(question, template),
        }
    }

    fn unmatched(analysis: QuestionAnalysis) -> Self {
        Self {
            matched: false,
            template_id: None,
            template: None,
            confidence: analysis.confidence,
            analysis,
            required_parameters: Vec::new(),
            suggested_parameters: Map::new(),
        }
    }
}

pub struct TemplateMatcher {
    catalog: Arc<Catalog>,
    rules: Vec<MatchRule>,
    config: MatcherConfig,
}

impl TemplateMatcher {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            rules: builtin_rules(),
            config: MatcherConfig::default(),
        }
    }

    pub fn with_rules(mut self, rules: Vec<MatchRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_config(mut self, config: MatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn rules(&self) -> &[MatchRule] {
        &self.rules
    }

    /// Scores `question` against the rule table.
    ///
    /// A caller-supplied `concept` replaces regex extraction in the slow path.
    pub fn match_question(&self, question: &str, concept: Option<&str>) -> MatchResult {
        let lower = question.to_lowercase();

        if let Some((rule, template)) = self.direct_match(&lower) {
            info!(
                template_id = %rule.template_id,
                "Direct keyword match"
            );
            let analysis = QuestionAnalysis {
                extracted_concept: Some(template.template_id.clone()),
                matched_keywords: Vec::new(),
                confidence: 1.0,
            };
            return MatchResult::matched(question, template, analysis);
        }

        let analysis = self.analyze(&lower, concept);
        if analysis.confidence < self.config.min_confidence {
            debug!(
                confidence = analysis.confidence,
                question = %truncate(question, 50),
                "Low confidence match"
            );
            return MatchResult::unmatched(analysis);
        }

        match self.best_template(&analysis) {
            Some(template) => {
                info!(
                    template_id = %template.template_id,
                    confidence = analysis.confidence,
                    "Matched template"
                );
                MatchResult::matched(question, template, analysis)
            }
            None => {
                debug!(question = %truncate(question, 50), "No matching template");
                MatchResult::unmatched(analysis)
            }
        }
    }

    fn direct_match(&self, lower_question: &str) -> Option<(&MatchRule, &Template)> {
        self.rules.iter().find_map(|rule| {
            rule.first_keyword_in(lower_question)?;
            self.catalog
                .templates
                .get(&rule.template_id)
                .map(|template| (rule, template))
        })
    }

    fn analyze(&self, lower_question: &str, concept: Option<&str>) -> QuestionAnalysis {
        let extracted_concept = concept
            .filter(|c| !c.trim().is_empty())
            .map(str::to_string)
            .or_else(|| extract_concept(lower_question));

        let mut matched_keywords: Vec<String> = Vec::new();
        let mut concept_score = 0u32;

        for rule in &self.rules {
            for keyword in &rule.keywords {
                if lower_question.contains(&keyword.to_lowercase())
                    && !matched_keywords.contains(keyword)
                {
                    matched_keywords.push(keyword.clone());
                }
            }
            if let Some(concept) = &extracted_concept
                && rule.has_concept(concept)
            {
                concept_score = concept_score.max(rule.priority);
            }
        }

        let confidence = confidence_for(matched_keywords.len(), concept_score);
        debug!(
            concept = ?extracted_concept,
            keywords = matched_keywords.len(),
            concept_score,
            confidence,
            "Question analysis"
        );

        QuestionAnalysis {
            extracted_concept,
            matched_keywords,
            confidence,
        }
    }

    fn best_template(&self, analysis: &QuestionAnalysis) -> Option<&Template> {
        let mut scored: Vec<(u32, u32, &Template)> = self
            .rules
            .iter()
            .filter_map(|rule| {
                let template = self.catalog.templates.get(&rule.template_id)?;
                let overlap = rule
                    .keywords
                    .iter()
                    .filter(|k| {
                        analysis
                            .matched_keywords
                            .iter()
                            .any(|m| m.to_lowercase() == k.to_lowercase())
                    })
                    .count() as u32;
                let concept_bonus = match &analysis.extracted_concept {
                    Some(concept) if rule.has_concept(concept) => 3,
                    _ => 0,
                };
                Some((overlap + concept_bonus, rule.priority, template))
            })
            .collect();

        // Stable sort keeps rule order among exact ties.
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
        scored.first().map(|(_, _, template)| *template)
    }
}

/// `min((10 * keywords + concept_score) / 100, 1.0)`
pub fn confidence_for(matched_keywords: usize, concept_score: u32) -> f64 {
    let total = matched_keywords as f64 * 10.0 + f64::from(concept_score);
    (total / 100.0).min(1.0)
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> TemplateMatcher {
        TemplateMatcher::new(Catalog::builtin().unwrap())
    }

    #[test]
    fn test_okazaki_direct_match() {
        let result = matcher().match_question("请解释冈崎片段的合成过程", None);

        assert!(result.matched);
        assert_eq!(
            result.template_id.as_deref(),
            Some("dna_replication_okazaki_v1")
        );
        assert_eq!(result.confidence, 1.0);
        assert!(result.analysis.matched_keywords.is_empty());
        assert_eq!(
            result.analysis.extracted_concept.as_deref(),
            Some("dna_replication_okazaki_v1")
        );
        assert_eq!(
            result.required_parameters,
            vec!["stage", "organism", "title", "description"]
        );
        assert_eq!(result.suggested_parameters["title"], "冈崎片段合成过程");
    }

    #[test]
    fn test_direct_match_follows_rule_order() {
        // 基因型 belongs to both punnett and allele; punnett comes first.
        let result = matcher().match_question("Aa的基因型是什么", None);
        assert_eq!(result.template_id.as_deref(), Some("punnett_square_v1"));
    }

    #[test]
    fn test_direct_match_is_case_insensitive() {
        let result = matcher().match_question("What is a PUNNETT square?", None);
        assert_eq!(result.template_id.as_deref(), Some("punnett_square_v1"));
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_rules_without_template_are_skipped_in_fast_path() {
        // 核糖体 only appears in translation_v1, which has no template.
        let result = matcher().match_question("核糖体的功能", None);
        assert!(!result.matched);
    }

    #[test]
    fn test_slow_path_match() {
        // chromosome_behavior_v1 has no template but its keywords still count.
        let result = matcher().match_question("同源染色体联会", None);

        assert!(result.matched);
        assert_eq!(result.analysis.extracted_concept.as_deref(), Some("染色体"));
        assert_eq!(
            result.analysis.matched_keywords,
            vec!["染色体", "同源染色体", "联会"]
        );
        // 3 keywords * 10 + pedigree_chart priority 9
        assert!((result.confidence - 0.39).abs() < 1e-9);
        assert_eq!(result.template_id.as_deref(), Some("pedigree_chart_v1"));
    }

    #[test]
    fn test_low_confidence_rejected() {
        let result = matcher().match_question("光合作用的暗反应", None);

        assert!(!result.matched);
        assert!(result.template.is_none());
        assert_eq!(result.confidence, 0.0);
        assert!(result.suggested_parameters.is_empty());
    }

    #[test]
    fn test_caller_concept_overrides_extraction() {
        let analysis = matcher().analyze("三体", Some("孟德尔"));
        assert_eq!(analysis.extracted_concept.as_deref(), Some("孟德尔"));
    }

    #[test]
    fn test_confidence_monotonic_in_keywords() {
        for concept_score in [0, 4, 10] {
            for k in 0..12 {
                assert!(confidence_for(k + 1, concept_score) >= confidence_for(k, concept_score));
            }
        }
        assert_eq!(confidence_for(20, 10), 1.0);
    }

    #[test]
    fn test_more_evidence_never_lowers_confidence() {
        let matcher = matcher();
        let base = matcher.analyze("同源染色体", None);
        let more = matcher.analyze("同源染色体联会", None);
        assert!(more.confidence >= base.confidence);
    }
}
