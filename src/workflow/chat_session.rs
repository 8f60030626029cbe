//! 对话会话管理 - 流程层
//!
//! 管理本次会话内的所有对话线程。每个线程同时只允许一次发送；
//! 不同线程之间互不影响，可以同时等待回复。

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::models::{ChatThread, GroundingSource, Message, Source, ThreadId};
use crate::services::{ContextAssembler, StructuredClient};
use crate::utils::{truncate_text, BusyFlag};

/// 生成失败时追加的固定回复
pub const FALLBACK_REPLY: &str =
    "Sorry, I couldn't get an answer right now. Please try sending your message again.";

struct ThreadSlot {
    thread: ChatThread,
    busy: BusyFlag,
}

#[derive(Default)]
struct Threads {
    /// 创建顺序
    order: Vec<ThreadId>,
    slots: HashMap<ThreadId, ThreadSlot>,
    created: usize,
}

/// 对话会话管理器
pub struct ChatSessionManager {
    client: StructuredClient,
    assembler: ContextAssembler,
    threads: Mutex<Threads>,
}

impl ChatSessionManager {
    pub fn new(client: StructuredClient) -> Self {
        Self {
            client,
            assembler: ContextAssembler::new(),
            threads: Mutex::new(Threads::default()),
        }
    }

    fn lock_threads(&self) -> MutexGuard<'_, Threads> {
        self.threads.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 新建线程，未给名字时按序号命名
    pub fn create_thread(&self, name: Option<&str>) -> ThreadId {
        let mut threads = self.lock_threads();
        threads.created += 1;

        let id = uuid::Uuid::new_v4().to_string();
        let name = match name.map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => format!("Chat {}", threads.created),
        };
        info!("💬 新建对话: {}", name);

        threads.order.push(id.clone());
        threads.slots.insert(
            id.clone(),
            ThreadSlot {
                thread: ChatThread::new(id.clone(), name),
                busy: BusyFlag::new(),
            },
        );
        id
    }

    /// 所有线程，按创建顺序
    pub fn threads(&self) -> Vec<ChatThread> {
        let threads = self.lock_threads();
        threads
            .order
            .iter()
            .filter_map(|id| threads.slots.get(id))
            .map(|slot| slot.thread.clone())
            .collect()
    }

    pub fn thread(&self, id: &str) -> Option<ChatThread> {
        self.lock_threads().slots.get(id).map(|slot| slot.thread.clone())
    }

    pub fn is_busy(&self, id: &str) -> bool {
        self.lock_threads()
            .slots
            .get(id)
            .is_some_and(|slot| slot.busy.is_busy())
    }

    pub fn rename_thread(&self, id: &str, name: &str) -> Result<(), ChatError> {
        let mut threads = self.lock_threads();
        let slot = threads
            .slots
            .get_mut(id)
            .ok_or_else(|| ChatError::UnknownThread(id.to_string()))?;
        let name = name.trim();
        if !name.is_empty() {
            slot.thread.name = name.to_string();
        }
        Ok(())
    }

    /// 删除线程；等待回复中的线程不能删除
    pub fn delete_thread(&self, id: &str) -> Result<ChatThread, ChatError> {
        let mut threads = self.lock_threads();
        match threads.slots.get(id) {
            None => return Err(ChatError::UnknownThread(id.to_string())),
            Some(slot) if slot.busy.is_busy() => return Err(ChatError::Busy(id.to_string())),
            Some(_) => {}
        }

        threads.order.retain(|t| t != id);
        let slot = threads
            .slots
            .remove(id)
            .ok_or_else(|| ChatError::UnknownThread(id.to_string()))?;
        info!("删除对话: {}", slot.thread.name);
        Ok(slot.thread)
    }

    /// 发送消息
    ///
    /// 用户消息立即追加；生成成功追加回复和来源，失败追加固定提示。
    /// 无论成败用户消息都保留。
    ///
    /// # 参数
    /// - `id`: 线程 id
    /// - `text`: 用户输入
    /// - `document_text`: 当前文档文本（可能没有）
    ///
    /// # 返回
    /// 追加回复后的线程
    pub async fn send(
        &self,
        id: &str,
        text: &str,
        document_text: Option<&str>,
    ) -> Result<ChatThread, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let (_guard, history) = {
            let mut threads = self.lock_threads();
            let slot = threads
                .slots
                .get_mut(id)
                .ok_or_else(|| ChatError::UnknownThread(id.to_string()))?;
            let guard = slot.busy.try_acquire().ok_or_else(|| {
                warn!("⚠️ 对话 {} 正在等待回复，忽略新消息", slot.thread.name);
                ChatError::Busy(id.to_string())
            })?;
            let history = slot.thread.history.clone();
            slot.thread.history.push(Message::user(text));
            (guard, history)
        };

        debug!("发送消息: {}", truncate_text(text, 80));
        let context = self.assembler.build(document_text, &history, text);

        let reply = match self.client.request_text(&context.request).await {
            Ok(response) => {
                let sources = if context.use_external_tool {
                    extract_sources(&response.grounding)
                } else {
                    Vec::new()
                };
                debug!("收到回复: {} 字符, {} 个来源", response.text.chars().count(), sources.len());
                Message::assistant(response.text.trim(), sources)
            }
            Err(e) => {
                warn!("⚠️ 对话生成失败，使用兜底回复: {}", e);
                Message::assistant(FALLBACK_REPLY, Vec::new())
            }
        };

        let mut threads = self.lock_threads();
        let slot = threads
            .slots
            .get_mut(id)
            .ok_or_else(|| ChatError::UnknownThread(id.to_string()))?;
        slot.thread.history.push(reply);
        Ok(slot.thread.clone())
    }
}

/// 来源标注转为引用：没有可用 uri 的丢弃，缺标题时用 uri 代替
pub fn extract_sources(grounding: &[GroundingSource]) -> Vec<Source> {
    grounding
        .iter()
        .filter_map(|g| {
            let uri = g.uri.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
            let title = g
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(uri);
            Some(Source {
                uri: uri.to_string(),
                title: title.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ScriptedBackend;
    use crate::models::{GenerationResponse, MessageRole, Role, Tool};
    use std::sync::Arc;
    use tokio::sync::Semaphore;

    fn manager(backend: Arc<ScriptedBackend>) -> ChatSessionManager {
        ChatSessionManager::new(StructuredClient::new(backend))
    }

    fn grounded(text: &str) -> GenerationResponse {
        GenerationResponse {
            text: text.to_string(),
            grounding: vec![
                GroundingSource {
                    uri: Some("https://example.org/a".into()),
                    title: Some("Article".into()),
                },
                GroundingSource {
                    uri: None,
                    title: Some("No link".into()),
                },
                GroundingSource {
                    uri: Some("https://example.org/b".into()),
                    title: None,
                },
            ],
        }
    }

    #[test]
    fn test_thread_lifecycle() {
        let chat = manager(Arc::new(ScriptedBackend::new()));
        let first = chat.create_thread(None);
        let second = chat.create_thread(Some("Prolog"));

        let names: Vec<String> = chat.threads().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Chat 1", "Prolog"]);

        chat.rename_thread(&first, "Logic").unwrap();
        assert_eq!(chat.thread(&first).unwrap().name, "Logic");

        chat.delete_thread(&second).unwrap();
        assert!(chat.thread(&second).is_none());
        assert!(matches!(chat.delete_thread(&second), Err(ChatError::UnknownThread(_))));
        assert_eq!(chat.threads().len(), 1);
    }

    #[tokio::test]
    async fn test_send_appends_user_and_reply() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_text("Unification binds variables.");
        let chat = manager(backend.clone());
        let id = chat.create_thread(None);

        let thread = chat.send(&id, "  What is unification?  ", Some("Prolog notes")).await.unwrap();
        assert_eq!(thread.history.len(), 2);
        assert_eq!(thread.history[0].role, MessageRole::User);
        assert_eq!(thread.history[0].text, "What is unification?");
        assert_eq!(thread.history[1].text, "Unification binds variables.");

        let request = &backend.requests()[0];
        assert!(request.tools.is_empty());
        assert_eq!(request.contents.len(), 1);
    }

    #[tokio::test]
    async fn test_history_is_sent_in_order() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_text("a1").push_text("a2");
        let chat = manager(backend.clone());
        let id = chat.create_thread(None);

        chat.send(&id, "q1", Some("doc")).await.unwrap();
        chat.send(&id, "q2", Some("doc")).await.unwrap();

        let request = &backend.requests()[1];
        let roles: Vec<Role> = request.contents.iter().map(|c| c.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Model, Role::User]);
        assert_eq!(request.contents[2].text(), "q2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_appends_fallback_and_keeps_user_message() {
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .push_failure("timeout")
            .push_failure("timeout")
            .push_failure("timeout");
        let chat = manager(backend.clone());
        let id = chat.create_thread(None);

        let thread = chat.send(&id, "hello", None).await.unwrap();
        assert_eq!(backend.call_count(), 3);
        assert_eq!(thread.history.len(), 2);
        assert_eq!(thread.history[0].text, "hello");
        assert_eq!(thread.history[1].text, FALLBACK_REPLY);
        let last = thread.last_message().unwrap();
        assert_eq!(last.role, MessageRole::Assistant);
        assert!(last.sources.is_empty());
        assert!(!chat.is_busy(&id));
    }

    #[tokio::test]
    async fn test_sources_kept_only_when_search_used() {
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .push_response(grounded("with search"))
            .push_response(grounded("from the document"));
        let chat = manager(backend.clone());
        let id = chat.create_thread(None);

        let thread = chat.send(&id, "latest news on Prolog?", None).await.unwrap();
        assert_eq!(backend.requests()[0].tools, vec![Tool::WebSearch]);
        let sources = &thread.history[1].sources;
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[1].title, "https://example.org/b");

        let thread = chat.send(&id, "explain clauses", Some("notes")).await.unwrap();
        assert!(thread.history[3].sources.is_empty());
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let chat = manager(Arc::new(ScriptedBackend::new()));
        let id = chat.create_thread(None);
        assert!(matches!(chat.send(&id, "   ", None).await, Err(ChatError::EmptyMessage)));
        assert!(chat.thread(&id).unwrap().history.is_empty());
        assert!(matches!(chat.send("nope", "hi", None).await, Err(ChatError::UnknownThread(_))));
    }

    #[tokio::test]
    async fn test_second_send_on_busy_thread_rejected() {
        let gate = Arc::new(Semaphore::new(0));
        let backend = Arc::new(ScriptedBackend::gated(gate.clone()));
        backend.push_text("first reply").push_text("other reply");
        let chat = manager(backend.clone());
        let id = chat.create_thread(None);
        let other = chat.create_thread(None);

        let first = chat.send(&id, "first", None);
        tokio::pin!(first);
        assert!(futures::poll!(first.as_mut()).is_pending());

        // 用户消息已经先行追加
        assert_eq!(chat.thread(&id).unwrap().history.len(), 1);
        assert!(matches!(chat.send(&id, "second", None).await, Err(ChatError::Busy(_))));
        assert!(matches!(chat.delete_thread(&id), Err(ChatError::Busy(_))));

        // 其他线程不受影响
        let second = chat.send(&other, "hello", None);
        tokio::pin!(second);
        assert!(futures::poll!(second.as_mut()).is_pending());
        assert_eq!(backend.call_count(), 2);

        gate.add_permits(2);
        let thread = first.await.unwrap();
        assert_eq!(thread.history.len(), 2);
        assert_eq!(thread.history[1].text, "first reply");
        assert!(second.await.is_ok());
        assert!(!chat.is_busy(&id));
    }

    #[test]
    fn test_extract_sources_drops_blank_uri() {
        let grounding = vec![
            GroundingSource {
                uri: Some("  ".into()),
                title: Some("Blank".into()),
            },
            GroundingSource {
                uri: Some("https://example.org".into()),
                title: Some("  ".into()),
            },
        ];
        let sources = extract_sources(&grounding);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].title, "https://example.org");
    }
}
