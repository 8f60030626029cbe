//! 错误类型
//!
//! 按失败来源分类：传输、输出格式、前置条件、持久化、配置。
//! 生成相关的失败在 `StructuredClient` 内部重试，其余直接返回给调用方。

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 生成服务错误（重试耗尽后）
    #[error("生成错误: {0}")]
    Generation(#[from] GenerationError),
    /// 测验错误
    #[error("测验错误: {0}")]
    Quiz(#[from] QuizError),
    /// 对话错误
    #[error("对话错误: {0}")]
    Chat(#[from] ChatError),
    /// 持久化错误
    #[error("持久化错误: {0}")]
    Persist(#[from] PersistError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 身份提供方错误
    #[error("身份错误: {0}")]
    Identity(String),
}

/// 单次调用生成后端时的传输失败
#[derive(Debug, Error)]
pub enum TransportError {
    /// 网络请求失败
    #[error("请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    /// 服务返回非成功状态码
    #[error("服务返回错误状态 {status}: {body}")]
    BadStatus { status: u16, body: String },
    /// 返回结果中没有候选内容
    #[error("生成服务返回结果为空 (模型: {model})")]
    EmptyResponse { model: String },
    /// 服务端 SDK 报告的其他错误
    #[error("生成服务调用失败: {0}")]
    Api(String),
}

/// 重试耗尽后对调用方可见的生成失败
#[derive(Debug, Error)]
pub enum GenerationError {
    /// 网络或服务端失败
    #[error("传输失败，已尝试 {attempts} 次: {message}")]
    Transport { attempts: u32, message: String },
    /// 返回文本无法解析为声明的结构
    #[error("模型输出格式错误，已尝试 {attempts} 次: {message}")]
    MalformedOutput { attempts: u32, message: String },
}

impl GenerationError {
    /// 实际尝试次数
    pub fn attempts(&self) -> u32 {
        match self {
            GenerationError::Transport { attempts, .. }
            | GenerationError::MalformedOutput { attempts, .. } => *attempts,
        }
    }
}

/// 测验相关错误
#[derive(Debug, Error)]
pub enum QuizError {
    /// 文档文本不足，未发起任何网络请求
    #[error("文档内容不足: 需要至少 {required} 个字符，实际 {actual} 个")]
    Readiness { required: usize, actual: usize },
    /// 已有一次生成正在进行
    #[error("已有题目生成任务正在进行")]
    Busy,
    /// 已提交的题集不能再修改
    #[error("题集已提交，不能再修改答案")]
    AlreadySubmitted,
    /// 当前没有题集
    #[error("当前没有可用的题集")]
    NoActiveSet,
    /// 题目不存在
    #[error("题目不存在: {0}")]
    UnknownQuestion(String),
    /// 选择题答案不在选项中
    #[error("答案 '{answer}' 不是题目 {question_id} 的选项")]
    InvalidOption { question_id: String, answer: String },
    /// 生成期间视图已切换，结果被丢弃
    #[error("生成结果已过期（视图已切换）")]
    Superseded,
    /// 生成失败
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// 对话相关错误
#[derive(Debug, Error)]
pub enum ChatError {
    /// 会话不存在
    #[error("会话不存在: {0}")]
    UnknownThread(String),
    /// 该会话已有消息正在发送
    #[error("会话 {0} 正在等待回复")]
    Busy(String),
    /// 空消息
    #[error("消息内容不能为空")]
    EmptyMessage,
}

/// 进度记录写入失败
#[derive(Debug, Error)]
pub enum PersistError {
    /// 存储拒绝写入
    #[error("存储拒绝写入: {0}")]
    Rejected(String),
    /// 序列化失败
    #[error("序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
    /// 文件读写失败
    #[error("文件读写失败 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件读取失败
    #[error("读取配置文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 未知的生成服务提供方
    #[error("未知的生成服务提供方: {0}")]
    UnknownProvider(String),
}

// ========== 便捷构造函数 ==========

impl TransportError {
    /// 创建请求失败错误
    pub fn request_failed(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        TransportError::RequestFailed {
            endpoint: endpoint.into(),
            source,
        }
    }
}

impl PersistError {
    /// 创建文件读写错误
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        PersistError::Io {
            path: path.into(),
            source,
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
