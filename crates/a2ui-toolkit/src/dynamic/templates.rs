//! Visualization templates used for embedding-based retrieval.
//!
//! These describe teaching scenarios rather than component skeletons. A
//! template may point at a catalog template that can render it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VizTemplate {
    pub template_id: String,
    pub concept: String,
    pub concept_keywords: Vec<String>,
    pub viz_type: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub applicable_scenarios: Vec<String>,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub common_mistakes: Vec<String>,
    /// Catalog template able to render this scenario.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_template_id: Option<String>,
}

impl VizTemplate {
    pub fn new(
        template_id: impl Into<String>,
        concept: impl Into<String>,
        viz_type: impl Into<String>,
    ) -> Self {
        Self {
            template_id: template_id.into(),
            concept: concept.into(),
            concept_keywords: Vec::new(),
            viz_type: viz_type.into(),
            title: String::new(),
            description: String::new(),
            applicable_scenarios: Vec::new(),
            key_points: Vec::new(),
            common_mistakes: Vec::new(),
            catalog_template_id: None,
        }
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.concept_keywords = to_strings(keywords);
        self
    }

    pub fn with_text(mut self, title: impl Into<String>, description: impl Into<String>) -> Self {
        self.title = title.into();
        self.description = description.into();
        self
    }

    pub fn with_scenarios(mut self, scenarios: &[&str]) -> Self {
        self.applicable_scenarios = to_strings(scenarios);
        self
    }

    pub fn with_key_points(mut self, points: &[&str]) -> Self {
        self.key_points = to_strings(points);
        self
    }

    pub fn with_common_mistakes(mut self, mistakes: &[&str]) -> Self {
        self.common_mistakes = to_strings(mistakes);
        self
    }

    pub fn rendered_by(mut self, catalog_template_id: impl Into<String>) -> Self {
        self.catalog_template_id = Some(catalog_template_id.into());
        self
    }

    /// Text embedded for retrieval: the concept followed by its keywords.
    pub fn embedding_text(&self) -> String {
        let mut text = self.concept.clone();
        for keyword in &self.concept_keywords {
            text.push(' ');
            text.push_str(keyword);
        }
        text
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn builtin() -> Vec<VizTemplate> {
    vec![
        VizTemplate::new("punnett-monohybrid-basic", "孟德尔第一定律", "punnett_square")
            .with_keywords(&[
                "孟德尔", "分离定律", "单基因杂交", "显隐性", "基因型", "表型", "配子",
            ])
            .with_text("单基因杂交Punnett方格", "展示一对等位基因杂交后代的基因型和表型分布")
            .with_scenarios(&["单基因杂交预测", "显隐性遗传分析", "基因型表型比例计算"])
            .with_key_points(&[
                "配子形成时等位基因分离",
                "受精时雌雄配子随机结合",
                "F2代出现3:1表型比例",
            ])
            .with_common_mistakes(&[
                "认为F1代全部是显性个体",
                "忽略基因型和表型的区别",
                "错误计算概率",
            ])
            .rendered_by("punnett_square_v1"),
        VizTemplate::new("meiosis-prophase-i", "减数分裂前期I", "chromosome_behavior")
            .with_keywords(&["减数分裂", "前期", "同源染色体", "联会", "四分体", "交叉"])
            .with_text("减数分裂前期I染色体行为", "展示同源染色体配对和联会过程")
            .with_scenarios(&["减数分裂过程学习", "同源染色体行为分析", "联会和交叉过程"])
            .with_key_points(&[
                "同源染色体在前期I配对",
                "联会形成四分体",
                "非姐妹染色单体可能交叉",
                "同源染色体分离发生在中期I",
            ])
            .with_common_mistakes(&["混淆姐妹染色单体和非姐妹染色单体", "认为交叉发生在任何阶段"])
            .rendered_by("meiosis_animation_v1"),
        VizTemplate::new("probability-binomial", "二项分布", "probability_distribution")
            .with_keywords(&["二项分布", "概率", "分布", "独立事件", "重复试验", "伯努利"])
            .with_text("二项分布概率图", "展示多次独立重复试验的概率分布")
            .with_scenarios(&["遗传概率计算", "独立事件分析", "多次重复试验"])
            .with_key_points(&[
                "二项分布适用于n次独立重复试验",
                "每次试验只有成功/失败两种结果",
                "成功概率p保持不变",
            ])
            .with_common_mistakes(&["忽略试验的独立性条件", "错误计算组合数"])
            .rendered_by("probability_distribution_v1"),
        VizTemplate::new("okazaki-lagging-strand", "冈崎片段", "diagram")
            .with_keywords(&["冈崎片段", "后随链", "不连续复制", "DNA连接酶", "引物"])
            .with_text("后随链上的冈崎片段", "展示后随链分段合成及连接的过程")
            .with_scenarios(&["DNA复制机制", "前导链与后随链比较"])
            .with_key_points(&[
                "DNA聚合酶只能沿5'→3'方向合成",
                "后随链以冈崎片段形式不连续合成",
                "DNA连接酶连接相邻片段",
            ])
            .rendered_by("dna_replication_okazaki_v1"),
        VizTemplate::new("pedigree-x-linked", "伴性遗传", "pedigree_chart")
            .with_keywords(&["伴性遗传", "X连锁", "系谱图", "携带者", "血友病", "色盲"])
            .with_text("X连锁隐性遗传系谱", "在家系中追踪X连锁隐性性状的传递")
            .with_scenarios(&["系谱分析", "携带者判断", "患病概率推算"])
            .with_key_points(&["男性患者多于女性", "女性携带者表型正常", "交叉遗传"])
            .rendered_by("pedigree_chart_v1"),
    ]
}
