use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Keyword and concept evidence tying free text to one template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRule {
    pub template_id: String,
    pub keywords: Vec<String>,
    pub concepts: Vec<String>,
    pub priority: u32,
    pub required_parameters: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

impl MatchRule {
    pub fn new(template_id: impl Into<String>, priority: u32) -> Self {
        Self {
            template_id: template_id.into(),
            keywords: Vec::new(),
            concepts: Vec::new(),
            priority,
            required_parameters: Vec::new(),
            examples: Vec::new(),
        }
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_concepts(mut self, concepts: &[&str]) -> Self {
        self.concepts = concepts.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_required_parameters(mut self, params: &[&str]) -> Self {
        self.required_parameters = params.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_examples(mut self, examples: &[&str]) -> Self {
        self.examples = examples.iter().map(|s| s.to_string()).collect();
        self
    }

    /// First keyword contained in the already-lowercased question.
    pub fn first_keyword_in(&self, lower_question: &str) -> Option<&str> {
        self.keywords
            .iter()
            .find(|k| lower_question.contains(&k.to_lowercase()))
            .map(String::as_str)
    }

    pub fn has_concept(&self, concept: &str) -> bool {
        let concept = concept.to_lowercase();
        self.concepts
            .iter()
            .any(|c| c.to_lowercase().contains(&concept))
    }
}

/// Rule table for the genetics catalog, in evaluation order.
pub fn builtin_rules() -> Vec<MatchRule> {
    vec![
        MatchRule::new("punnett_square_v1", 10)
            .with_keywords(&[
                "punnett", "杂交", "配子", "基因型", "表型", "分离比", "遗传比例", "杂交实验",
            ])
            .with_concepts(&[
                "孟德尔定律",
                "分离定律",
                "自由组合定律",
                "单基因遗传",
                "双基因遗传",
            ])
            .with_required_parameters(&[
                "maleGametes",
                "femaleGametes",
                "parentalCross",
                "offspring",
            ])
            .with_examples(&["孟德尔杂交实验", "Aa × aa杂交", "Punnett方格表", "基因型分离比"]),
        MatchRule::new("inheritance_path_v1", 8)
            .with_keywords(&["遗传路径", "传递", "多世代", "遗传模式"])
            .with_concepts(&["常染色体遗传", "性染色体遗传", "X连锁遗传", "Y连锁遗传"])
            .with_required_parameters(&["generations", "inheritance", "explanation"])
            .with_examples(&["血友病遗传路径", "亨廷顿舞蹈病遗传", "囊性纤维化遗传", "色盲遗传"]),
        MatchRule::new("pedigree_chart_v1", 9)
            .with_keywords(&[
                "系谱", "系谱图", "家族遗传", "遗传病", "家系图", "遗传系谱", "血友病", "色盲",
                "遗传图谱",
            ])
            .with_concepts(&["系谱图", "家系图", "遗传病系谱", "X连锁遗传", "常染色体遗传"])
            .with_required_parameters(&[
                "individuals",
                "relationships",
                "inheritance",
                "explanation",
            ])
            .with_examples(&["血友病系谱", "色盲家系图", "亨廷顿舞蹈病系谱", "囊性纤维化系谱"]),
        MatchRule::new("dna_replication_okazaki_v1", 9)
            .with_keywords(&[
                "冈崎片段", "后随链", "前导链", "dna复制", "复制叉", "半保留复制", "rna引物",
                "连接酶",
            ])
            .with_concepts(&["DNA复制", "半不连续复制", "冈崎片段", "前导链", "后随链"])
            .with_required_parameters(&[
                "stage",
                "showLeadingStrand",
                "showLaggingStrand",
                "showOkazakiFragments",
                "organism",
            ])
            .with_examples(&["冈崎片段合成", "冈崎片段", "DNA半保留复制", "复制叉结构"]),
        MatchRule::new("dna_replication_v1", 7)
            .with_keywords(&[
                "dna复制", "复制叉", "前导链", "后随链", "半保留复制", "复制酶", "聚合酶",
            ])
            .with_concepts(&["DNA复制", "半不连续复制", "前导链", "后随链"])
            .with_required_parameters(&[
                "stage",
                "showLeadingStrand",
                "showLaggingStrand",
                "showOkazakiFragments",
            ])
            .with_examples(&["DNA半保留复制", "复制叉结构", "DNA复制过程"]),
        MatchRule::new("transcription_v1", 7)
            .with_keywords(&["转录", "rna聚合酶", "启动子", "mrna", "转录过程", "模板链"])
            .with_concepts(&["转录", "RNA聚合酶", "启动子", "终止子", "mRNA合成"])
            .with_required_parameters(&["dnaTemplate", "rnaPolymerase", "promoter", "transcript"])
            .with_examples(&["基因转录过程", "mRNA合成", "RNA聚合酶作用"]),
        MatchRule::new("translation_v1", 7)
            .with_keywords(&["翻译", "核糖体", "密码子", "氨基酸", "trna", "多肽链", "蛋白质合成"])
            .with_concepts(&["翻译", "核糖体", "密码子", "tRNA", "蛋白质合成"])
            .with_required_parameters(&["mrna", "ribosome", "trna", "aminoAcids", "polypeptide"])
            .with_examples(&["蛋白质翻译过程", "核糖体合成", "密码子翻译"]),
        MatchRule::new("gene_structure_v1", 6)
            .with_keywords(&[
                "基因结构", "外显子", "内含子", "启动子", "增强子", "编码区", "非编码区",
            ])
            .with_concepts(&["基因结构", "外显子", "内含子", "启动子", "增强子"])
            .with_required_parameters(&["geneName", "exons", "introns", "promoter", "utr"])
            .with_examples(&["基因结构示意图", "外显子内含子结构", "启动子区域"]),
        MatchRule::new("chromosome_behavior_v1", 6)
            .with_keywords(&[
                "染色体", "同源染色体", "减数分裂", "有丝分裂", "联会", "交换", "配对",
            ])
            .with_concepts(&["染色体行为", "减数分裂", "有丝分裂", "同源染色体", "交叉"])
            .with_required_parameters(&["organism", "chromosomeNumber", "stages", "showCrossover"])
            .with_examples(&["减数分裂过程", "染色体配对", "同源染色体交换"]),
        MatchRule::new("crispr_v1", 5)
            .with_keywords(&["crispr", "基因编辑", "gRNA", "cas9", "sgrna", "基因敲除"])
            .with_concepts(&["CRISPR", "基因编辑", "gRNA", "Cas9", "基因敲除"])
            .with_required_parameters(&["targetGene", "gRNA", "cas9", "editType"])
            .with_examples(&["CRISPR基因编辑", "Cas9切割", "gRNA设计"]),
        MatchRule::new("trisomy_v1", 5)
            .with_keywords(&["三体", "唐氏综合征", "染色体异常", "非整倍体", "额外染色体"])
            .with_concepts(&["染色体数目变异", "三体综合征", "非整倍体", "唐氏综合征"])
            .with_required_parameters(&["chromosomeNumber", "condition", "mechanism", "symptoms"])
            .with_examples(&["唐氏综合征", "21三体", "18三体"]),
        MatchRule::new("mitosis_v1", 5)
            .with_keywords(&["有丝分裂", "细胞分裂", "间期", "前期", "中期", "后期", "末期"])
            .with_concepts(&["有丝分裂", "细胞周期", "染色体分离", "细胞质分裂"])
            .with_required_parameters(&["organism", "stages", "showChromosomes", "showCentrosomes"])
            .with_examples(&["有丝分裂过程", "细胞分裂周期", "染色体分离"]),
        MatchRule::new("allele_v1", 4)
            .with_keywords(&["等位基因", "显性", "隐性", "纯合子", "杂合子", "基因型"])
            .with_concepts(&["等位基因", "显性", "隐性", "基因型", "表型"])
            .with_required_parameters(&["gene", "alleles", "genotypes", "phenotypes"])
            .with_examples(&["等位基因概念", "显性隐性关系", "基因型表型"]),
    ]
}

static CONCEPT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        "冈崎片段",
        "dna复制",
        "转录",
        "翻译",
        "孟德尔",
        "系谱",
        "家系",
        "punnett",
        "染色体",
        "减数分裂",
        "有丝分裂",
        "等位基因",
        "基因结构",
        "crispr",
        "三体",
    ]
    .iter()
    .filter_map(|p| Regex::new(&format!("(?i){p}")).ok())
    .collect()
});

/// First concept pattern found in the question, as written there.
pub fn extract_concept(question: &str) -> Option<String> {
    CONCEPT_PATTERNS
        .iter()
        .find_map(|pattern| pattern.find(question))
        .map(|m| m.as_str().to_string())
}
