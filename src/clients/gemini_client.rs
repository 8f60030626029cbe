//! generateContent REST 客户端
//!
//! 支持系统指令、输出结构声明和联网检索工具，
//! 联网检索时从 groundingMetadata 中取出来源标注。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};

use crate::clients::GenerationBackend;
use crate::config::Config;
use crate::error::TransportError;
use crate::models::{Content, GenerationRequest, GenerationResponse, GroundingSource, Role, Tool};

/// generateContent 客户端
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    api_base_url: String,
    model_name: String,
    temperature: f32,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.llm_api_key.clone(),
            api_base_url: config.llm_api_base_url.trim_end_matches('/').to_string(),
            model_name: config.llm_model_name.clone(),
            temperature: config.temperature,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base_url, self.model_name
        )
    }

    fn build_body(&self, request: &GenerationRequest) -> WireRequest {
        let contents = request.contents.iter().map(WireContent::from).collect();

        let system_instruction = request
            .system_instruction
            .as_ref()
            .map(|text| WireContent {
                role: None,
                parts: vec![WirePart { text: text.clone() }],
            });

        let tools = request
            .tools
            .iter()
            .map(|tool| match tool {
                Tool::WebSearch => json!({ "googleSearch": {} }),
            })
            .collect();

        let (response_mime_type, response_schema) = match &request.output_schema {
            Some(schema) => (
                Some("application/json".to_string()),
                Some(to_wire_schema(schema)),
            ),
            None => (None, None),
        };

        WireRequest {
            contents,
            system_instruction,
            tools,
            generation_config: WireGenerationConfig {
                temperature: self.temperature,
                response_mime_type,
                response_schema,
            },
        }
    }
}

#[async_trait]
impl GenerationBackend for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, TransportError> {
        let endpoint = self.endpoint();
        debug!("调用生成接口，模型: {}", self.model_name);

        let body = self.build_body(request);
        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::request_failed(&endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("生成接口返回错误状态 {}", status);
            return Err(TransportError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| TransportError::request_failed(&endpoint, e))?;

        into_generation_response(parsed, &self.model_name)
    }
}

/// 取第一个候选的文本和来源标注
fn into_generation_response(
    parsed: WireResponse,
    model: &str,
) -> Result<GenerationResponse, TransportError> {
    let candidate = parsed
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| TransportError::EmptyResponse {
            model: model.to_string(),
        })?;

    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let grounding = candidate
        .grounding_metadata
        .map(|m| {
            m.grounding_chunks
                .into_iter()
                .filter_map(|chunk| chunk.web)
                .map(|web| GroundingSource {
                    uri: web.uri,
                    title: web.title,
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(GenerationResponse {
        text: text.trim().to_string(),
        grounding,
    })
}

/// 结构声明中的类型名改为服务端要求的大写形式
fn to_wire_schema(schema: &JsonValue) -> JsonValue {
    match schema {
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .map(|(key, value)| {
                    let converted = match (key.as_str(), value) {
                        ("type", JsonValue::String(t)) => JsonValue::String(t.to_uppercase()),
                        _ => to_wire_schema(value),
                    };
                    (key.clone(), converted)
                })
                .collect(),
        ),
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(to_wire_schema).collect()),
        other => other.clone(),
    }
}

// ========== 线上格式 ==========

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<JsonValue>,
    generation_config: WireGenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<JsonValue>,
}

#[derive(Debug, Serialize)]
struct WireContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<WirePart>,
}

impl From<&Content> for WireContent {
    fn from(content: &Content) -> Self {
        Self {
            role: Some(match content.role {
                Role::User => "user",
                Role::Model => "model",
            }),
            parts: content
                .parts
                .iter()
                .map(|p| WirePart {
                    text: p.text.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WirePart {
    text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    content: Option<WireCandidateContent>,
    grounding_metadata: Option<WireGroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct WireCandidateContent {
    #[serde(default)]
    parts: Vec<WireResponsePart>,
}

#[derive(Debug, Deserialize)]
struct WireResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireGroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<WireGroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct WireGroundingChunk {
    web: Option<WireWebChunk>,
}

#[derive(Debug, Deserialize)]
struct WireWebChunk {
    uri: Option<String>,
    title: Option<String>,
}
