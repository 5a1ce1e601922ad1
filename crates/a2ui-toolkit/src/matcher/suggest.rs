use serde_json::{Map, Value, json};

use crate::catalog::Template;
use crate::payload::KNOWLEDGE_POINT_FIELDS;

/// Template defaults overlaid with question-specific parameters.
///
/// Templates that expect pedagogical enrichment also receive the four
/// knowledge-point fields as empty arrays.
pub fn suggested_parameters(question: &str, template: &Template) -> Map<String, Value> {
    let lower = question.to_lowercase();
    let mut params = Map::new();

    match template.template_id.as_str() {
        "dna_replication_okazaki_v1" => {
            params.insert("stage".into(), json!("elongation"));
            params.insert("showLeadingStrand".into(), json!(true));
            params.insert("showLaggingStrand".into(), json!(true));
            params.insert("showOkazakiFragments".into(), json!(true));
            params.insert(
                "showEnzymes".into(),
                json!(["helicase", "primase", "polymerase", "ligase"]),
            );
            params.insert("organism".into(), json!("eukaryotic"));
            params.insert(
                "okazakiFragments".into(),
                json!([
                    {"id": "OF1", "length": 150, "hasPrimer": true, "position": 1},
                    {"id": "OF2", "length": 180, "hasPrimer": true, "position": 2},
                    {"id": "OF3", "length": 160, "hasPrimer": true, "position": 3}
                ]),
            );
            params.insert("title".into(), json!("冈崎片段合成过程"));
            params.insert(
                "description".into(),
                json!(
                    "展示冈崎片段在后随链上的合成过程：由于DNA聚合酶只能沿5'→3'方向合成，后随链必须分段合成冈崎片段，最后由DNA连接酶连接成完整的链。"
                ),
            );
        }
        "dna_replication_v1" => {
            params.insert("stage".into(), json!("elongation"));
            params.insert("showLeadingStrand".into(), json!(true));
            params.insert("showLaggingStrand".into(), json!(true));
            params.insert(
                "showOkazakiFragments".into(),
                json!(lower.contains("冈崎片段")),
            );
        }
        "punnett_square_v1" => {
            if lower.contains("显性") && lower.contains("隐性") {
                params.insert("maleGametes".into(), json!(["A", "a"]));
                params.insert("femaleGametes".into(), json!(["A", "a"]));
                params.insert(
                    "parentalCross".into(),
                    json!({
                        "male": {"genotype": "Aa", "phenotype": "显性"},
                        "female": {"genotype": "Aa", "phenotype": "显性"}
                    }),
                );
                params.insert(
                    "offspring".into(),
                    json!([
                        {"genotype": "AA", "phenotype": "显性", "probability": 0.25},
                        {"genotype": "Aa", "phenotype": "显性", "probability": 0.5},
                        {"genotype": "aa", "phenotype": "隐性", "probability": 0.25}
                    ]),
                );
            }
            insert_knowledge_placeholders(&mut params);
        }
        "inheritance_path_v1" => {
            let hemophilia = lower.contains("血友病");
            if hemophilia || lower.contains("色盲") {
                params.insert(
                    "inheritance".into(),
                    json!({
                        "pattern": "X连锁隐性遗传",
                        "chromosome": "X染色体",
                        "gene": if hemophilia { "F8" } else { "OPN1LW" }
                    }),
                );
            }
            insert_knowledge_placeholders(&mut params);
        }
        _ => {}
    }

    let mut merged = template.default_values.clone();
    merged.extend(params);
    merged
}

fn insert_knowledge_placeholders(params: &mut Map<String, Value>) {
    for field in KNOWLEDGE_POINT_FIELDS {
        params.insert(field.to_string(), json!([]));
    }
}
