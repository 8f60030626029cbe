//! 测验引擎 - 流程层
//!
//! 持有当前题集和作答状态：
//! 1. 文档就绪检查（不满足直接返回，不发请求）
//! 2. 单飞生成，失败时原状态不变
//! 3. 作答 → 提交评分 → 记录进度
//!
//! 提交之后题集冻结，只有重新生成或切换视图才会重置。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};

use crate::error::QuizError;
use crate::models::{
    Answers, Attempt, QuestionKind, QuestionResult, QuestionSet, ScoreReport,
};
use crate::services::{ProgressSync, StructuredClient};
use crate::utils::{truncate_text, BusyFlag};
use crate::workflow::quiz_prompt::{build_request, check_shape, into_question_set, RawQuiz};

/// 生成题目所需的最少文档字符数
pub const MIN_DOCUMENT_CHARS: usize = 50;

/// 简答/论述判为通过的最少字符数（不含）
///
/// 只看长度，不评判内容，是真正阅卷的简化替代。
pub const MIN_FREE_TEXT_CHARS: usize = 5;

/// 反馈中展示用户作答的最大字符数
const FEEDBACK_ANSWER_CHARS: usize = 50;

#[derive(Default)]
struct QuizState {
    set: Option<QuestionSet>,
    answers: Answers,
    report: Option<ScoreReport>,
    /// 每次丢弃或生成成功时递增，用来识别过期的生成结果
    epoch: u64,
}

/// 测验引擎
pub struct QuizEngine {
    client: StructuredClient,
    progress: Arc<ProgressSync>,
    state: Mutex<QuizState>,
    busy: BusyFlag,
}

impl QuizEngine {
    pub fn new(client: StructuredClient, progress: Arc<ProgressSync>) -> Self {
        Self {
            client,
            progress,
            state: Mutex::new(QuizState::default()),
            busy: BusyFlag::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, QuizState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 根据文档生成新题集
    ///
    /// # 参数
    /// - `document_text`: 当前文档文本
    /// - `kind`: 题型，决定题量和指令模板
    ///
    /// # 返回
    /// 成功时新题集替换旧题集并清空作答；失败时旧状态保持不变
    pub async fn generate(
        &self,
        document_text: &str,
        kind: QuestionKind,
    ) -> Result<QuestionSet, QuizError> {
        let document_text = document_text.trim();
        let actual = document_text.chars().count();
        if actual < MIN_DOCUMENT_CHARS {
            warn!("⚠️ 文档内容不足（{} 字符），跳过出题", actual);
            return Err(QuizError::Readiness {
                required: MIN_DOCUMENT_CHARS,
                actual,
            });
        }

        let Some(_guard) = self.busy.try_acquire() else {
            warn!("⚠️ 已有出题任务在进行，忽略本次请求");
            return Err(QuizError::Busy);
        };

        let epoch = self.state().epoch;
        info!("📝 开始出题: {}（文档 {} 字符）", kind, actual);

        let request = build_request(document_text, kind);
        let raw: RawQuiz = self
            .client
            .request_structured(&request, |quiz: &RawQuiz| check_shape(kind, quiz))
            .await?;
        let set = into_question_set(kind, raw);

        let mut state = self.state();
        if state.epoch != epoch {
            info!("视图已切换，丢弃生成结果: {}", set.title);
            return Err(QuizError::Superseded);
        }
        state.epoch += 1;
        state.set = Some(set.clone());
        state.answers.clear();
        state.report = None;

        info!("✓ 题集已生成: {}（{} 道）", set.title, set.len());
        Ok(set)
    }

    /// 记录一道题的作答
    pub fn answer(&self, question_id: &str, text: impl Into<String>) -> Result<(), QuizError> {
        let text = text.into();
        let mut state = self.state();
        if state.report.is_some() {
            return Err(QuizError::AlreadySubmitted);
        }
        let set = state.set.as_ref().ok_or(QuizError::NoActiveSet)?;
        let question = set
            .question(question_id)
            .ok_or_else(|| QuizError::UnknownQuestion(question_id.to_string()))?;

        if question.kind == QuestionKind::Choice && !question.options.contains(&text) {
            return Err(QuizError::InvalidOption {
                question_id: question_id.to_string(),
                answer: text,
            });
        }

        state.answers.insert(question_id.to_string(), text);
        Ok(())
    }

    /// 提交当前题集
    ///
    /// 评分后题集冻结，并把记录交给进度同步（不等待写入结果）。
    pub fn submit(&self) -> Result<ScoreReport, QuizError> {
        let report = {
            let mut state = self.state();
            if state.report.is_some() {
                return Err(QuizError::AlreadySubmitted);
            }
            let set = state.set.as_ref().ok_or(QuizError::NoActiveSet)?;
            let report = grade(set, &state.answers);
            state.report = Some(report.clone());
            report
        };

        info!(
            "✓ 提交测验: {} 得分 {}/{}",
            report.title, report.score, report.total
        );

        match Attempt::new(report.kind, report.score, report.total, report.title.clone()) {
            Some(attempt) => self.progress.record(attempt),
            None => warn!("⚠️ 得分超过总分，未记录进度"),
        }
        Ok(report)
    }

    /// 切换视图：丢弃题集和作答，进行中的生成结果也不再采用
    pub fn discard(&self) {
        let mut state = self.state();
        state.epoch += 1;
        if let Some(set) = state.set.take() {
            info!("丢弃题集: {}", set.title);
        }
        state.answers.clear();
        state.report = None;
    }

    pub fn current(&self) -> Option<QuestionSet> {
        self.state().set.clone()
    }

    pub fn answers(&self) -> Answers {
        self.state().answers.clone()
    }

    /// 已提交时的评分报告
    pub fn report(&self) -> Option<ScoreReport> {
        self.state().report.clone()
    }

    pub fn is_generating(&self) -> bool {
        self.busy.is_busy()
    }
}

/// 评分（纯函数，相同输入得到相同报告）
///
/// - 选择题：所选选项与标准答案完全相同（区分大小写）
/// - 简答/论述：去掉首尾空白后超过 5 个字符即通过
pub fn grade(set: &QuestionSet, answers: &Answers) -> ScoreReport {
    let mut results = Vec::with_capacity(set.len());
    let mut transcript = String::new();

    for (i, question) in set.questions.iter().enumerate() {
        let user_answer = answers.get(&question.id);
        let correct = match (question.kind, user_answer) {
            (_, None) => false,
            (QuestionKind::Choice, Some(answer)) => *answer == question.canonical_answer,
            (QuestionKind::Short | QuestionKind::Long, Some(answer)) => {
                answer.trim().chars().count() > MIN_FREE_TEXT_CHARS
            }
        };

        let shown = match user_answer {
            None => "(no answer)".to_string(),
            Some(answer) if question.kind == QuestionKind::Choice => answer.clone(),
            Some(answer) => truncate_text(answer.trim(), FEEDBACK_ANSWER_CHARS),
        };
        let reference_label = match question.kind {
            QuestionKind::Choice => "Correct answer",
            QuestionKind::Short | QuestionKind::Long => "Model answer",
        };

        if i > 0 {
            transcript.push('\n');
        }
        transcript.push_str(&format!(
            "Q{}. {}\nYour answer: {}\n{}: {}\nResult: {}\nExplanation: {}\n",
            i + 1,
            question.prompt,
            shown,
            reference_label,
            question.reference_answer(),
            if correct { "Correct" } else { "Incorrect" },
            question.explanation
        ));

        results.push(QuestionResult {
            question_id: question.id.clone(),
            correct,
            user_answer: user_answer.cloned(),
        });
    }

    let score = results.iter().filter(|r| r.correct).count() as u32;
    ScoreReport {
        title: set.title.clone(),
        kind: set.kind,
        score,
        total: set.len() as u32,
        results,
        transcript,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ScriptedBackend;
    use crate::infrastructure::LocalDocumentStore;
    use crate::models::{Question, UserScope};
    use serde_json::json;
    use tokio::sync::Semaphore;

    const DOC: &str = "Prolog programs are made of facts and rules. Queries are answered by \
unification and backtracking over the clause database.";

    fn choice_reply(title: &str) -> String {
        json!({
            "title": title,
            "questions": [
                {"question": "What does Prolog use to answer queries?", "options": ["Unification", "Recursion only", "Loops", "Lambdas"], "answer": "Unification", "explanation": "Stated in the notes."},
                {"question": "Programs are made of?", "options": ["Facts and rules", "Classes", "Modules", "Objects"], "answer": "Facts and rules", "explanation": "First sentence."},
                {"question": "How are alternatives explored?", "options": ["Backtracking", "Threads", "Polling", "Caching"], "answer": "Backtracking", "explanation": "Second sentence."}
            ]
        })
        .to_string()
    }

    fn engine(backend: Arc<ScriptedBackend>) -> QuizEngine {
        let store = Arc::new(LocalDocumentStore::in_memory());
        let progress = Arc::new(ProgressSync::new(store, UserScope::new("u1")));
        QuizEngine::new(StructuredClient::new(backend), progress)
    }

    fn question(id: &str, kind: QuestionKind, answer: &str) -> Question {
        Question {
            id: id.into(),
            kind,
            prompt: format!("prompt {}", id),
            options: if kind == QuestionKind::Choice {
                vec!["A".into(), "B".into(), "C".into(), "D".into()]
            } else {
                Vec::new()
            },
            canonical_answer: answer.into(),
            model_answer: None,
            explanation: "because".into(),
        }
    }

    fn choice_set() -> QuestionSet {
        QuestionSet {
            title: "Logic".into(),
            kind: QuestionKind::Choice,
            questions: vec![
                question("q1", QuestionKind::Choice, "A"),
                question("q2", QuestionKind::Choice, "B"),
                question("q3", QuestionKind::Choice, "C"),
            ],
        }
    }

    #[test]
    fn test_grade_choice_partial() {
        let answers = Answers::from([
            ("q1".to_string(), "A".to_string()),
            ("q2".to_string(), "D".to_string()),
        ]);
        let report = grade(&choice_set(), &answers);

        assert_eq!((report.score, report.total), (1, 3));
        assert!(report.results[0].correct);
        assert!(!report.results[1].correct);
        assert_eq!(report.results[2].user_answer, None);
        assert!(report.transcript.contains("Your answer: (no answer)"));
    }

    #[test]
    fn test_grade_choice_is_case_sensitive() {
        let answers = Answers::from([("q1".to_string(), "a".to_string())]);
        assert_eq!(grade(&choice_set(), &answers).score, 0);
    }

    #[test]
    fn test_grade_free_text_by_length() {
        let set = QuestionSet {
            title: "Short".into(),
            kind: QuestionKind::Short,
            questions: vec![
                question("s1", QuestionKind::Short, "unification"),
                question("s2", QuestionKind::Short, "x"),
                question("s3", QuestionKind::Short, "x"),
            ],
        };
        let answers = Answers::from([
            ("s1".to_string(), "It is unification.".to_string()),
            ("s2".to_string(), "  five  ".to_string()),
            ("s3".to_string(), "sixchr".to_string()),
        ]);
        let report = grade(&set, &answers);
        let verdicts: Vec<bool> = report.results.iter().map(|r| r.correct).collect();
        assert_eq!(verdicts, vec![true, false, true]);
    }

    #[test]
    fn test_transcript_truncates_long_answers() {
        let set = QuestionSet {
            title: "Essay".into(),
            kind: QuestionKind::Long,
            questions: vec![question("l1", QuestionKind::Long, "points")],
        };
        let answers = Answers::from([("l1".to_string(), "w".repeat(80))]);
        let report = grade(&set, &answers);

        let expected = format!("Your answer: {}...", "w".repeat(50));
        assert!(report.transcript.contains(&expected));
        assert!(report.transcript.contains("Model answer: points"));
        assert!(report.transcript.contains("Explanation: because"));
    }

    #[test]
    fn test_grade_is_deterministic() {
        let answers = Answers::from([("q2".to_string(), "B".to_string())]);
        assert_eq!(grade(&choice_set(), &answers), grade(&choice_set(), &answers));
    }

    #[tokio::test]
    async fn test_short_document_fails_without_network_call() {
        let backend = Arc::new(ScriptedBackend::new());
        let quiz = engine(backend.clone());

        let err = quiz.generate(&"a".repeat(40), QuestionKind::Choice).await.unwrap_err();
        assert!(matches!(err, QuizError::Readiness { required: 50, actual: 40 }));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_generate_installs_set_with_local_ids() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_text(choice_reply("Prolog basics"));
        let quiz = engine(backend);

        let set = quiz.generate(DOC, QuestionKind::Choice).await.unwrap();
        assert_eq!(set.len(), 3);
        for q in &set.questions {
            assert_eq!(q.options.len(), 4);
            assert!(q.options.contains(&q.canonical_answer));
            assert!(uuid::Uuid::parse_str(&q.id).is_ok());
        }
        assert_eq!(quiz.current(), Some(set));
    }

    #[tokio::test]
    async fn test_answer_rules() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_text(choice_reply("Prolog basics"));
        let quiz = engine(backend);

        assert!(matches!(quiz.answer("q1", "x"), Err(QuizError::NoActiveSet)));

        let set = quiz.generate(DOC, QuestionKind::Choice).await.unwrap();
        let first = &set.questions[0];
        assert!(matches!(
            quiz.answer(&first.id, "Not an option"),
            Err(QuizError::InvalidOption { .. })
        ));
        assert!(matches!(quiz.answer("missing", "Loops"), Err(QuizError::UnknownQuestion(_))));

        quiz.answer(&first.id, "Loops").unwrap();
        quiz.answer(&first.id, "Unification").unwrap();
        assert_eq!(quiz.answers().get(&first.id).map(String::as_str), Some("Unification"));

        let report = quiz.submit().unwrap();
        assert_eq!(report.score, 1);
        assert!(matches!(quiz.answer(&first.id, "Loops"), Err(QuizError::AlreadySubmitted)));
        assert!(matches!(quiz.submit(), Err(QuizError::AlreadySubmitted)));
        assert_eq!(quiz.report(), Some(report));
    }

    #[tokio::test]
    async fn test_submit_records_progress() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_text(choice_reply("Prolog basics"));
        let store = Arc::new(LocalDocumentStore::in_memory());
        let progress = Arc::new(ProgressSync::new(store, UserScope::new("u1")));
        let quiz = QuizEngine::new(StructuredClient::new(backend), progress.clone());

        quiz.generate(DOC, QuestionKind::Choice).await.unwrap();
        quiz.submit().unwrap();
        progress.flush().await;

        let history = progress.subscribe(progress.scope()).current();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].title, "Prolog basics");
        assert_eq!((history[0].score, history[0].total), (0, 3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_generation_keeps_previous_set() {
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .push_text(choice_reply("First"))
            .push_text("not json")
            .push_text("{}")
            .push_text("still not a quiz");
        let quiz = engine(backend.clone());

        let first = quiz.generate(DOC, QuestionKind::Choice).await.unwrap();
        quiz.answer(&first.questions[0].id, "Unification").unwrap();

        let err = quiz.generate(DOC, QuestionKind::Choice).await.unwrap_err();
        assert!(matches!(err, QuizError::Generation(_)));
        assert_eq!(backend.call_count(), 4);
        assert_eq!(quiz.current(), Some(first));
        assert_eq!(quiz.answers().len(), 1);
    }

    #[tokio::test]
    async fn test_second_generate_while_pending_is_busy() {
        let gate = Arc::new(Semaphore::new(0));
        let backend = Arc::new(ScriptedBackend::gated(gate.clone()));
        backend.push_text(choice_reply("Gated"));
        let quiz = engine(backend.clone());

        let first = quiz.generate(DOC, QuestionKind::Choice);
        tokio::pin!(first);
        assert!(futures::poll!(first.as_mut()).is_pending());
        assert!(quiz.is_generating());

        let second = quiz.generate(DOC, QuestionKind::Choice).await;
        assert!(matches!(second, Err(QuizError::Busy)));

        gate.add_permits(1);
        assert!(first.await.is_ok());
        assert_eq!(backend.call_count(), 1);
        assert!(!quiz.is_generating());
    }

    #[tokio::test]
    async fn test_discard_during_generation_supersedes_result() {
        let gate = Arc::new(Semaphore::new(0));
        let backend = Arc::new(ScriptedBackend::gated(gate.clone()));
        backend.push_text(choice_reply("Late"));
        let quiz = engine(backend);

        let pending = quiz.generate(DOC, QuestionKind::Choice);
        tokio::pin!(pending);
        assert!(futures::poll!(pending.as_mut()).is_pending());

        quiz.discard();
        gate.add_permits(1);
        assert!(matches!(pending.await, Err(QuizError::Superseded)));
        assert_eq!(quiz.current(), None);
    }
}
