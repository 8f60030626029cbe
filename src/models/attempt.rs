use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::question::QuestionKind;

/// 用户作用域（身份提供方给出的不透明 id）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserScope(String);

impl UserScope {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self(user_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 一次完成的测验记录，创建后不可修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: String,
    pub kind: QuestionKind,
    pub score: u32,
    pub total: u32,
    pub timestamp: DateTime<Utc>,
    pub title: String,
}

impl Attempt {
    /// 创建记录；`score > total` 时返回 None
    pub fn new(kind: QuestionKind, score: u32, total: u32, title: impl Into<String>) -> Option<Self> {
        Self::at(kind, score, total, title, Utc::now())
    }

    /// 指定时间创建记录
    pub fn at(
        kind: QuestionKind,
        score: u32,
        total: u32,
        title: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Option<Self> {
        if score > total {
            return None;
        }
        Some(Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            score,
            total,
            timestamp,
            title: title.into(),
        })
    }

    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.score) * 100.0 / f64::from(self.total)
        }
    }
}

/// 历史记录汇总
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSummary {
    pub attempts: usize,
    pub total_score: u32,
    pub total_possible: u32,
    pub average_percentage: f64,
    pub best_percentage: f64,
    pub by_kind: HashMap<QuestionKind, usize>,
}

impl ProgressSummary {
    pub fn from_attempts(attempts: &[Attempt]) -> Self {
        if attempts.is_empty() {
            return Self::default();
        }

        let mut summary = Self {
            attempts: attempts.len(),
            ..Default::default()
        };
        let mut percentage_sum = 0.0;
        for attempt in attempts {
            summary.total_score += attempt.score;
            summary.total_possible += attempt.total;
            let pct = attempt.percentage();
            percentage_sum += pct;
            summary.best_percentage = summary.best_percentage.max(pct);
            *summary.by_kind.entry(attempt.kind).or_insert(0) += 1;
        }
        summary.average_percentage = percentage_sum / attempts.len() as f64;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_rejects_score_above_total() {
        assert!(Attempt::new(QuestionKind::Choice, 4, 3, "Quiz").is_none());
        assert!(Attempt::new(QuestionKind::Choice, 3, 3, "Quiz").is_some());
    }

    #[test]
    fn test_summary_over_attempts() {
        let attempts = vec![
            Attempt::new(QuestionKind::Choice, 1, 3, "a").unwrap(),
            Attempt::new(QuestionKind::Choice, 3, 3, "b").unwrap(),
            Attempt::new(QuestionKind::Long, 1, 2, "c").unwrap(),
        ];
        let summary = ProgressSummary::from_attempts(&attempts);

        assert_eq!(summary.attempts, 3);
        assert_eq!(summary.total_score, 5);
        assert_eq!(summary.total_possible, 8);
        assert_eq!(summary.best_percentage, 100.0);
        assert_eq!(summary.by_kind[&QuestionKind::Choice], 2);
        assert_eq!(summary.by_kind[&QuestionKind::Long], 1);
        let expected = (100.0 / 3.0 + 100.0 + 50.0) / 3.0;
        assert!((summary.average_percentage - expected).abs() < 1e-9);
    }

    #[test]
    fn test_summary_empty() {
        assert_eq!(ProgressSummary::from_attempts(&[]), ProgressSummary::default());
    }
}
