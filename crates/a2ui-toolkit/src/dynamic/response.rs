//! Shape of the structured-generation reply.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::payload::KNOWLEDGE_POINT_FIELDS;
use crate::provider::KnowledgeChunk;

/// What the model decided and produced for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DynamicVizResponse {
    /// 是否适合可视化处理
    pub visualization_applicable: bool,
    /// 适用性判断的原因（一句话）
    pub applicable_reason: String,
    /// 选择的模板及原因
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_template: Option<SelectedTemplate>,
    /// 从知识点中提取的数据
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_data: Option<Map<String, Value>>,
    /// 生成的可视化数据
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization_data: Option<Map<String, Value>>,
    /// 从知识库中提取的知识点，不要生成新的知识点
    pub knowledge_points: KnowledgePoints,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_answer: Option<TextAnswer>,
    /// 引用来源
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelectedTemplate {
    /// 选择的模板ID
    pub template_id: String,
    /// 选择该模板的原因
    pub reason: String,
}

/// The four knowledge-point lists, each 0..N short strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgePoints {
    /// 3-5个关键知识点
    #[serde(default)]
    pub key_points: Vec<String>,
    /// 如何通过可视化理解概念
    #[serde(default)]
    pub understanding_points: Vec<String>,
    /// 学生常见的错误理解
    #[serde(default)]
    pub common_mistakes: Vec<String>,
    /// 帮助学生自检的问题
    #[serde(default)]
    pub check_questions: Vec<String>,
}

impl KnowledgePoints {
    pub fn is_empty(&self) -> bool {
        self.key_points.is_empty()
            && self.understanding_points.is_empty()
            && self.common_mistakes.is_empty()
            && self.check_questions.is_empty()
    }

    /// The bundle as request data keyed by the knowledge-point field names.
    pub fn to_data(&self) -> Map<String, Value> {
        let lists = [
            &self.key_points,
            &self.understanding_points,
            &self.common_mistakes,
            &self.check_questions,
        ];
        KNOWLEDGE_POINT_FIELDS
            .iter()
            .zip(lists)
            .map(|(field, list)| {
                let values = list.iter().cloned().map(Value::String).collect();
                (field.to_string(), Value::Array(values))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TextAnswer {
    /// 主要回答
    pub main_answer: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub common_mistakes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl From<&KnowledgeChunk> for Citation {
    fn from(chunk: &KnowledgeChunk) -> Self {
        Self {
            content: chunk.content.clone(),
            chapter: chunk.chapter.clone(),
            section: chunk.section.clone(),
            score: Some(chunk.score),
        }
    }
}

/// JSON Schema sent with the structured-generation request.
pub fn response_schema() -> Value {
    serde_json::to_value(schemars::schema_for!(DynamicVizResponse)).unwrap_or(Value::Null)
}

/// Reads a reply, lifting knowledge points that the model placed inside
/// `visualizationData` or `educationalAids` when the bundle itself is absent.
pub fn parse_response(mut value: Value) -> Result<DynamicVizResponse, serde_json::Error> {
    if let Some(object) = value.as_object_mut()
        && !object.contains_key("knowledgePoints")
    {
        let lifted = ["visualizationData", "educationalAids"]
            .iter()
            .filter_map(|key| object.get(*key).and_then(Value::as_object))
            .find_map(lift_knowledge_points)
            .unwrap_or_default();
        object.insert("knowledgePoints".to_string(), Value::Object(lifted));
    }
    serde_json::from_value(value)
}

fn lift_knowledge_points(source: &Map<String, Value>) -> Option<Map<String, Value>> {
    let lifted: Map<String, Value> = KNOWLEDGE_POINT_FIELDS
        .iter()
        .filter_map(|field| {
            let items = source.get(*field)?.as_array()?;
            let strings: Vec<Value> = items.iter().filter(|v| v.is_string()).cloned().collect();
            Some((field.to_string(), Value::Array(strings)))
        })
        .collect();
    (!lifted.is_empty()).then_some(lifted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_requires_core_fields() {
        let schema = response_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();

        assert!(required.contains(&"visualizationApplicable"));
        assert!(required.contains(&"applicableReason"));
        assert!(required.contains(&"knowledgePoints"));
        assert!(!required.contains(&"selectedTemplate"));
        assert!(!required.contains(&"textAnswer"));
    }

    #[test]
    fn test_parse_full_response() {
        let response = parse_response(json!({
            "visualizationApplicable": true,
            "applicableReason": "涉及杂交比例",
            "selectedTemplate": {"templateId": "punnett-monohybrid-basic", "reason": "单基因杂交"},
            "extractedData": {"maleGametes": ["A", "a"]},
            "knowledgePoints": {"keyPoints": ["等位基因分离"]}
        }))
        .unwrap();

        assert_eq!(
            response.selected_template.unwrap().template_id,
            "punnett-monohybrid-basic"
        );
        assert_eq!(response.knowledge_points.key_points, vec!["等位基因分离"]);
        assert!(response.knowledge_points.check_questions.is_empty());
    }

    #[test]
    fn test_parse_lifts_points_from_visualization_data() {
        let response = parse_response(json!({
            "visualizationApplicable": true,
            "applicableReason": "r",
            "visualizationData": {
                "keyPoints": ["a", 3, "b"],
                "checkQuestions": ["为什么?"]
            }
        }))
        .unwrap();

        assert_eq!(response.knowledge_points.key_points, vec!["a", "b"]);
        assert_eq!(response.knowledge_points.check_questions, vec!["为什么?"]);
    }

    #[test]
    fn test_parse_defaults_missing_bundle() {
        let response = parse_response(json!({
            "visualizationApplicable": false,
            "applicableReason": "纯概念辨析"
        }))
        .unwrap();
        assert!(response.knowledge_points.is_empty());
    }

    #[test]
    fn test_parse_rejects_missing_applicability() {
        assert!(parse_response(json!({"applicableReason": "r"})).is_err());
    }

    #[test]
    fn test_to_data_uses_field_names() {
        let points = KnowledgePoints {
            key_points: vec!["k".to_string()],
            ..Default::default()
        };
        let data = points.to_data();
        assert_eq!(data["keyPoints"], json!(["k"]));
        assert_eq!(data["commonMistakes"], json!([]));
        assert_eq!(data.len(), 4);
    }
}
