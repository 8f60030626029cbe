//! 出题请求 - 流程层
//!
//! 每种题型一套指令模板和输出结构，题量写死，不让模型自己决定。

use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::models::{Content, GenerationRequest, Question, QuestionKind, QuestionSet};
use crate::services::context_assembler::excerpt;

/// 出题时注入文档的字符上限
pub const PROMPT_DOCUMENT_BUDGET: usize = 20_000;

const QUIZ_SYSTEM_INSTRUCTION: &str = "You write revision questions for a student. \
Only use facts stated in the supplied document. Reply with JSON matching the declared schema and nothing else.";

/// 模型返回的题集
#[derive(Debug, Clone, Deserialize)]
pub struct RawQuiz {
    pub title: String,
    pub questions: Vec<RawQuestion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawQuestion {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub answer: String,
    #[serde(default)]
    pub model_answer: Option<String>,
    #[serde(default)]
    pub explanation: String,
}

/// 题型对应的指令
fn instruction(kind: QuestionKind) -> String {
    let count = kind.question_count();
    match kind {
        QuestionKind::Choice => format!(
            "Write exactly {count} multiple-choice questions about the document. \
Each question has exactly {options} distinct options. \
`answer` must repeat the correct option word for word. \
`explanation` says in one sentence why that option is correct.",
            options = kind.option_count()
        ),
        QuestionKind::Short => format!(
            "Write exactly {count} short-answer questions about the document, \
each answerable in one or two sentences. \
`answer` lists the key points a good answer mentions. \
`model_answer` is a one or two sentence answer. \
`explanation` points to the part of the document that covers it."
        ),
        QuestionKind::Long => format!(
            "Write exactly {count} long-answer questions about the document, \
each needing a developed paragraph that compares, evaluates or explains. \
`answer` lists the key points a strong answer covers. \
`model_answer` is a full paragraph answer. \
`explanation` summarises what the marker looks for."
        ),
    }
}

/// 题型对应的输出结构，题量和选项数用 minItems/maxItems 固定
pub fn output_schema(kind: QuestionKind) -> JsonValue {
    let count = kind.question_count();
    let mut properties = json!({
        "question": {"type": "string"},
        "answer": {"type": "string"},
        "explanation": {"type": "string"}
    });
    let mut required = vec!["question", "answer", "explanation"];

    match kind {
        QuestionKind::Choice => {
            let options = kind.option_count();
            properties["options"] = json!({
                "type": "array",
                "items": {"type": "string"},
                "minItems": options,
                "maxItems": options
            });
            required.push("options");
        }
        QuestionKind::Short | QuestionKind::Long => {
            properties["model_answer"] = json!({"type": "string"});
            required.push("model_answer");
        }
    }

    json!({
        "type": "object",
        "properties": {
            "title": {"type": "string"},
            "questions": {
                "type": "array",
                "minItems": count,
                "maxItems": count,
                "items": {
                    "type": "object",
                    "properties": properties,
                    "required": required
                }
            }
        },
        "required": ["title", "questions"]
    })
}

/// 构建出题请求
pub fn build_request(document_text: &str, kind: QuestionKind) -> GenerationRequest {
    let prompt = format!(
        "{}\n\nDocument:\n\"\"\"\n{}\n\"\"\"",
        instruction(kind),
        excerpt(document_text, PROMPT_DOCUMENT_BUDGET)
    );
    GenerationRequest::new(vec![Content::user(prompt)])
        .with_system_instruction(QUIZ_SYSTEM_INSTRUCTION)
        .with_output_schema(output_schema(kind))
}

/// 解码后的形状检查
///
/// 结构校验之外还要求：题目非空、选项互不相同、答案是选项之一。
pub fn check_shape(kind: QuestionKind, quiz: &RawQuiz) -> Result<(), String> {
    let expected = kind.question_count();
    if quiz.questions.len() != expected {
        return Err(format!("应有 {} 道题，实际 {} 道", expected, quiz.questions.len()));
    }

    for (i, q) in quiz.questions.iter().enumerate() {
        let n = i + 1;
        if q.question.trim().is_empty() {
            return Err(format!("第 {} 题题干为空", n));
        }
        if q.answer.trim().is_empty() {
            return Err(format!("第 {} 题缺少答案", n));
        }
        if kind != QuestionKind::Choice {
            continue;
        }

        if q.options.len() != kind.option_count() {
            return Err(format!(
                "第 {} 题应有 {} 个选项，实际 {} 个",
                n,
                kind.option_count(),
                q.options.len()
            ));
        }
        let distinct = q
            .options
            .iter()
            .enumerate()
            .all(|(j, opt)| !q.options[..j].contains(opt));
        if !distinct {
            return Err(format!("第 {} 题选项重复", n));
        }
        if !q.options.contains(&q.answer) {
            return Err(format!("第 {} 题的答案不在选项中", n));
        }
    }
    Ok(())
}

/// 转为本地题集，题目 id 重新生成
pub fn into_question_set(kind: QuestionKind, quiz: RawQuiz) -> QuestionSet {
    let title = match quiz.title.trim() {
        "" => format!("{} quiz", kind.label()),
        t => t.to_string(),
    };
    let questions = quiz
        .questions
        .into_iter()
        .map(|q| Question {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            prompt: q.question.trim().to_string(),
            options: q.options,
            canonical_answer: q.answer,
            model_answer: q.model_answer.filter(|a| !a.trim().is_empty()),
            explanation: q.explanation,
        })
        .collect();

    QuestionSet {
        title,
        kind,
        questions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::decode;

    fn choice_json() -> String {
        json!({
            "title": "Logic",
            "questions": [
                {"question": "q1", "options": ["A", "B", "C", "D"], "answer": "A", "explanation": "e"},
                {"question": "q2", "options": ["A", "B", "C", "D"], "answer": "B", "explanation": "e"},
                {"question": "q3", "options": ["A", "B", "C", "D"], "answer": "C", "explanation": "e"}
            ]
        })
        .to_string()
    }

    #[test]
    fn test_schema_fixes_cardinality() {
        let schema = output_schema(QuestionKind::Long);
        let questions = &schema["properties"]["questions"];
        assert_eq!(questions["minItems"], 2);
        assert_eq!(questions["maxItems"], 2);
        assert!(questions["items"]["properties"].get("options").is_none());

        let choice = output_schema(QuestionKind::Choice);
        let options = &choice["properties"]["questions"]["items"]["properties"]["options"];
        assert_eq!(options["minItems"], 4);
        assert_eq!(options["maxItems"], 4);
    }

    #[test]
    fn test_templates_differ_per_kind() {
        let choice = instruction(QuestionKind::Choice);
        let short = instruction(QuestionKind::Short);
        let long = instruction(QuestionKind::Long);
        assert!(choice.contains("exactly 3 multiple-choice"));
        assert!(short.contains("one or two sentences"));
        assert!(long.contains("exactly 2 long-answer"));
    }

    #[test]
    fn test_request_truncates_document() {
        let doc = "x".repeat(PROMPT_DOCUMENT_BUDGET + 500);
        let request = build_request(&doc, QuestionKind::Short);
        let prompt = request.contents[0].text();
        assert_eq!(prompt.matches('x').count(), PROMPT_DOCUMENT_BUDGET);
        assert!(request.output_schema.is_some());
    }

    #[test]
    fn test_valid_choice_quiz_passes_check() {
        let quiz: RawQuiz = decode(&choice_json(), Some(&output_schema(QuestionKind::Choice)))
            .into_result()
            .unwrap();
        assert!(check_shape(QuestionKind::Choice, &quiz).is_ok());
    }

    #[test]
    fn test_answer_outside_options_rejected() {
        let mut quiz: RawQuiz = serde_json::from_str(&choice_json()).unwrap();
        quiz.questions[1].answer = "E".into();
        assert!(check_shape(QuestionKind::Choice, &quiz).is_err());
    }

    #[test]
    fn test_duplicate_options_rejected() {
        let mut quiz: RawQuiz = serde_json::from_str(&choice_json()).unwrap();
        quiz.questions[0].options = vec!["A".into(), "A".into(), "B".into(), "C".into()];
        let err = check_shape(QuestionKind::Choice, &quiz).unwrap_err();
        assert!(err.contains("重复"));
    }

    #[test]
    fn test_wrong_question_count_rejected() {
        let mut quiz: RawQuiz = serde_json::from_str(&choice_json()).unwrap();
        quiz.questions.pop();
        assert!(check_shape(QuestionKind::Choice, &quiz).is_err());
    }

    #[test]
    fn test_ids_are_fresh_and_blank_title_defaulted() {
        let mut quiz: RawQuiz = serde_json::from_str(&choice_json()).unwrap();
        quiz.title = "  ".into();
        let a = into_question_set(QuestionKind::Choice, quiz.clone());
        let b = into_question_set(QuestionKind::Choice, quiz);

        assert_eq!(a.title, "Multiple choice quiz");
        assert_ne!(a.questions[0].id, b.questions[0].id);
        assert_ne!(a.questions[0].id, a.questions[1].id);
    }
}
