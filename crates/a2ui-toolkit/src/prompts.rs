//! Prompt definitions for model interactions.
//!
//! Each request type carries the data a prompt needs and a `minijinja`
//! template that renders it. Rendering goes through [`render_prompt`].

use minijinja::Environment;
use serde::Serialize;

use crate::dynamic::templates::VizTemplate;
use crate::provider::ChatMessage;

/// Renders a prompt from a template string and a serializable context.
pub fn render_prompt<T: Serialize>(template: &str, context: T) -> Result<String, minijinja::Error> {
    let mut env = Environment::new();
    env.add_template("prompt", template)?;
    let tmpl = env.get_template("prompt")?;
    tmpl.render(context)
}

/// A request type that renders itself through its template.
pub trait ToPrompt: Serialize + Sized {
    const TEMPLATE: &'static str;

    fn to_prompt(&self) -> Result<String, minijinja::Error> {
        render_prompt(Self::TEMPLATE, self)
    }
}

/// Asks a chat model to produce a complete payload for one template.
#[derive(Debug, Serialize)]
pub struct LocalSynthesisRequest {
    pub template_id: String,
    pub visualization_type: String,
    pub complexity: String,
    pub question: Option<String>,
    /// Pretty-printed request data.
    pub data_json: String,
}

impl ToPrompt for LocalSynthesisRequest {
    const TEMPLATE: &'static str = r##"你是一个A2UI（Agent-to-User Interface）可视化生成专家。请根据以下信息生成符合A2UI规范的JSON格式可视化内容。

## 模板信息
- 模板ID: {{ template_id }}
- 可视化类型: {{ visualization_type }}
- 复杂度: {{ complexity }}

## 用户问题
{{ question or "无特定问题" }}

## 原始数据
```json
{{ data_json }}
```

## 任务要求
1. 保持模板结构：使用模板定义的组件类型和层次
2. 丰富数据内容：根据用户问题补充解释性文字
3. 教育价值：内容要帮助学生理解遗传学概念
4. 格式正确：输出必须是合法的JSON

## 输出格式
{% raw %}```json
{
  "version": "1.0",
  "surface": {
    "rootId": "root",
    "components": {
      "root": {"type": "card", "id": "root", "properties": {"title": "标题"}, "children": ["content"]},
      "content": {"type": "text", "id": "content", "properties": {"content": "说明"}}
    }
  },
  "dataModel": {}
}
```{% endraw %}

只输出JSON，不要添加其他说明。
"##;
}

/// Asks a chat model to improve descriptions in request data.
#[derive(Debug, Serialize)]
pub struct EnrichmentRequest {
    pub question: String,
    pub data_json: String,
}

impl ToPrompt for EnrichmentRequest {
    const TEMPLATE: &'static str = r##"Enhance the following genetics visualization data with better descriptions and explanations based on this question: "{{ question }}"

Data: {{ data_json }}"##;
}

/// Short extraction of the core concept in a question.
#[derive(Debug, Serialize)]
pub struct ConceptExtractionRequest {
    pub question: String,
}

impl ToPrompt for ConceptExtractionRequest {
    const TEMPLATE: &'static str = "从以下问题中提取核心遗传学概念（不超过10个字）：\n{{ question }}";
}

/// A near-match template as shown to the model.
#[derive(Debug, Serialize)]
pub struct CandidateTemplate {
    pub template_id: String,
    pub title: String,
    pub concept: String,
    /// Two-decimal weighted similarity.
    pub similarity: String,
    pub description: String,
    pub applicable_scenarios: String,
    pub match_reason: String,
    pub key_points: String,
}

impl CandidateTemplate {
    pub fn new(template: &VizTemplate, similarity: f32, match_reason: &str) -> Self {
        Self {
            template_id: template.template_id.clone(),
            title: template.title.clone(),
            concept: template.concept.clone(),
            similarity: format!("{similarity:.2}"),
            description: template.description.clone(),
            applicable_scenarios: template.applicable_scenarios.join(", "),
            match_reason: match_reason.to_string(),
            key_points: if template.key_points.is_empty() {
                "暂无".to_string()
            } else {
                template.key_points.join(", ")
            },
        }
    }
}

/// Structured generation of a visualization from retrieved knowledge.
#[derive(Debug, Serialize)]
pub struct DynamicGenerationRequest {
    pub knowledge: String,
    pub question: String,
    pub concept: String,
    pub user_level: String,
    pub templates: Vec<CandidateTemplate>,
    pub history: Vec<ChatMessage>,
}

impl ToPrompt for DynamicGenerationRequest {
    const TEMPLATE: &'static str = r##"你是一个遗传学可视化生成专家。请基于提供的知识点、问题信息和可视化模板，生成适合的可视化内容。

## 输入信息

### 1. 知识点内容
{{ knowledge or "（知识库未返回相关内容）" }}

### 2. 用户问题
{{ question }}

### 3. 核心概念
{{ concept }}

### 4. 用户水平
{{ user_level }}

### 5. 推荐的可视化模板
{% for t in templates %}
**模板 {{ loop.index }}: {{ t.template_id }}**
- 标题: {{ t.title }}
- 适用概念: {{ t.concept }}
- 相似度: {{ t.similarity }}
- 描述: {{ t.description }}
- 适用场景: {{ t.applicable_scenarios }}
- 匹配原因: {{ t.match_reason }}
- 教学要点: {{ t.key_points }}
{% else %}
（没有达到相似度阈值的模板）
{% endfor %}
{% if history %}
### 6. 对话历史
{% for turn in history %}
- {{ turn.role }}: {{ turn.content }}
{% endfor %}
{% endif %}
## 任务要求

### 第一步：评估可视化适用性
分析用户问题是否适合可视化处理，考虑：
1. 问题是否涉及具体遗传学概念或过程？
2. 是否可以通过图形、动画或图表帮助理解？
3. 可视化是否能提供比纯文本更好的解释？

如果适合，选择最佳模板；如果不适合，说明原因。

### 第二步：选择和调整模板
从推荐的模板中选择最合适的，并根据具体问题进行调整：
- 提取模板需要的参数值
- 从知识点内容中获取相关数据
- 调整模板结构以适应具体问题

### 第三步：生成可视化数据
基于选择的模板和提取的数据，生成完整的可视化数据，并从知识库提取知识点内容填充到模板。

### 第四步：回答用户问题
直接回答问题的核心，引用知识点中的关键信息，结合可视化进行解释。

## 重要要求

1. **严格基于输入内容**：不要使用知识点之外的信息
2. **模板适配**：确保生成的可视化数据符合所选模板的结构
3. **教学价值**：生成的内容要有助于{{ user_level }}水平的学生理解概念
4. **格式规范**：严格遵循JSON输出格式，确保可解析
5. **从知识库提取知识点**：
   - keyPoints: 提取3-5个关键知识点
   - understandingPoints: 提取理解要点
   - commonMistakes: 提取常见错误
   - checkQuestions: 提取自检问题
   - **不要生成新的知识点，使用知识库中已有的内容**

请严格按照给定的JSON Schema输出，不要添加任何其他文本。
"##;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ChatMessage;

    #[test]
    fn test_render_prompt_simple() {
        let rendered = render_prompt(
            "概念: {{ concept }}",
            minijinja::context!(concept => "冈崎片段"),
        )
        .unwrap();
        assert_eq!(rendered, "概念: 冈崎片段");
    }

    #[test]
    fn test_local_synthesis_prompt() {
        let request = LocalSynthesisRequest {
            template_id: "punnett_square_v1".to_string(),
            visualization_type: "punnett_square".to_string(),
            complexity: "low".to_string(),
            question: None,
            data_json: "{\n  \"maleGametes\": [\"A\", \"a\"]\n}".to_string(),
        };
        let prompt = request.to_prompt().unwrap();

        assert!(prompt.contains("- 模板ID: punnett_square_v1"));
        assert!(prompt.contains("无特定问题"));
        assert!(prompt.contains("\"maleGametes\": [\"A\", \"a\"]"));
        // The output example is emitted literally.
        assert!(prompt.contains("\"rootId\": \"root\""));
    }

    #[test]
    fn test_enrichment_prompt() {
        let request = EnrichmentRequest {
            question: "为什么是3:1".to_string(),
            data_json: "{\"title\":\"杂交\"}".to_string(),
        };
        assert_eq!(
            request.to_prompt().unwrap(),
            "Enhance the following genetics visualization data with better descriptions and explanations based on this question: \"为什么是3:1\"\n\nData: {\"title\":\"杂交\"}"
        );
    }

    #[test]
    fn test_concept_prompt() {
        let request = ConceptExtractionRequest {
            question: "什么是伴性遗传".to_string(),
        };
        assert_eq!(
            request.to_prompt().unwrap(),
            "从以下问题中提取核心遗传学概念（不超过10个字）：\n什么是伴性遗传"
        );
    }

    #[test]
    fn test_dynamic_prompt_lists_templates_and_history() {
        let request = DynamicGenerationRequest {
            knowledge: "DNA复制是半保留的".to_string(),
            question: "DNA怎么复制".to_string(),
            concept: "DNA复制".to_string(),
            user_level: "beginner".to_string(),
            templates: vec![CandidateTemplate {
                template_id: "dna_replication_v1".to_string(),
                title: "DNA复制".to_string(),
                concept: "DNA复制".to_string(),
                similarity: "0.87".to_string(),
                description: "复制叉".to_string(),
                applicable_scenarios: "复制机制".to_string(),
                match_reason: "概念相似度: 0.90, 问题相似度: 0.80".to_string(),
                key_points: "暂无".to_string(),
            }],
            history: vec![ChatMessage::user("上一个问题")],
        };
        let prompt = request.to_prompt().unwrap();

        assert!(prompt.contains("**模板 1: dna_replication_v1**"));
        assert!(prompt.contains("- 相似度: 0.87"));
        assert!(prompt.contains("- user: 上一个问题"));
        assert!(prompt.contains("beginner水平"));
    }

    #[test]
    fn test_dynamic_prompt_without_candidates() {
        let request = DynamicGenerationRequest {
            knowledge: String::new(),
            question: "q".to_string(),
            concept: "c".to_string(),
            user_level: "intermediate".to_string(),
            templates: Vec::new(),
            history: Vec::new(),
        };
        let prompt = request.to_prompt().unwrap();
        assert!(prompt.contains("没有达到相似度阈值的模板"));
        assert!(prompt.contains("知识库未返回相关内容"));
        assert!(!prompt.contains("对话历史"));
    }
}
