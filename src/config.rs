use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// 生成服务提供方
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// generateContent 风格的 REST 接口（支持联网检索与来源标注）
    Gemini,
    /// 兼容 OpenAI Chat Completions 的服务
    OpenAi,
}

impl Provider {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Provider::Gemini),
            "openai" | "open_ai" => Ok(Provider::OpenAi),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 生成服务配置 ---
    pub provider: Provider,
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub temperature: f32,
    /// 进度记录持久化目录，为空时只保存在内存中
    pub store_dir: Option<String>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: Provider::Gemini,
            llm_api_key: String::new(),
            llm_api_base_url: "https://generativelanguage.googleapis.com".to_string(),
            llm_model_name: "gemini-2.5-flash".to_string(),
            temperature: 0.3,
            store_dir: None,
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 从环境变量读取配置，未设置的项使用默认值
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// 从 TOML 文件读取配置，再用环境变量覆盖
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::TomlParseFailed {
                path: path.display().to_string(),
                source,
            })?;
        config.apply_env()
    }

    fn apply_env(self) -> Result<Self, ConfigError> {
        let provider = match std::env::var("LLM_PROVIDER") {
            Ok(v) => Provider::parse(&v)?,
            Err(_) => self.provider,
        };
        let temperature = match std::env::var("LLM_TEMPERATURE") {
            Ok(v) => v.parse().map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: "LLM_TEMPERATURE".to_string(),
                value: v.clone(),
                expected_type: "f32".to_string(),
            })?,
            Err(_) => self.temperature,
        };

        Ok(Self {
            provider,
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(self.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(self.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(self.llm_model_name),
            temperature,
            store_dir: std::env::var("PROGRESS_STORE_DIR").ok().or(self.store_dir),
            verbose_logging: std::env::var("VERBOSE_LOGGING")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(self.verbose_logging),
        })
    }
}
