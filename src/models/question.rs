use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 题型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    /// 单选题
    Choice,
    /// 简答题
    Short,
    /// 论述题
    Long,
}

impl QuestionKind {
    /// 每个题集固定的题目数量
    pub fn question_count(self) -> usize {
        match self {
            QuestionKind::Choice => 3,
            QuestionKind::Short => 3,
            QuestionKind::Long => 2,
        }
    }

    /// 选择题的选项数量，其他题型为 0
    pub fn option_count(self) -> usize {
        match self {
            QuestionKind::Choice => 4,
            QuestionKind::Short | QuestionKind::Long => 0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            QuestionKind::Choice => "Multiple choice",
            QuestionKind::Short => "Short answer",
            QuestionKind::Long => "Long answer",
        }
    }
}

impl std::fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// 一道题
///
/// `id` 在本地生成，不信任响应中的任何标识。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub kind: QuestionKind,
    pub prompt: String,
    /// 只有选择题有选项
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// 选择题为正确选项原文；简答/论述为要点
    pub canonical_answer: String,
    /// 简答/论述的参考答案
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_answer: Option<String>,
    pub explanation: String,
}

impl Question {
    /// 用于展示的参考答案：优先 model_answer
    pub fn reference_answer(&self) -> &str {
        self.model_answer
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(&self.canonical_answer)
    }
}

/// 题集，生成后整体替换，不远程保存
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSet {
    pub title: String,
    pub kind: QuestionKind,
    pub questions: Vec<Question>,
}

impl QuestionSet {
    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// 用户作答：题目 id → 答案
pub type Answers = HashMap<String, String>;

/// 单题评分结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionResult {
    pub question_id: String,
    pub correct: bool,
    pub user_answer: Option<String>,
}

/// 提交后的评分报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreReport {
    pub title: String,
    pub kind: QuestionKind,
    pub score: u32,
    pub total: u32,
    pub results: Vec<QuestionResult>,
    /// 逐题反馈文本
    pub transcript: String,
}

impl ScoreReport {
    /// 得分百分比（0-100）
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.score) * 100.0 / f64::from(self.total)
        }
    }
}
