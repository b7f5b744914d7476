//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! 默认回复一个包含全部五个 result 字段的 JSON 对象，任何 Agent 都能从中取到自己的结果；
//! 测试可用 `with_reply` 注入指定回复（包括坏 JSON）。

use async_trait::async_trait;

use crate::llm::{ChatMessage, LlmClient};

/// Mock 客户端：固定回复，不访问网络
#[derive(Debug, Default)]
pub struct MockLlmClient {
    canned: Option<String>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定固定回复（测试坏响应、缺字段等场景）
    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self {
            canned: Some(reply.into()),
        }
    }

    fn default_reply() -> String {
        serde_json::json!({
            "recommendations": {
                "summary": "Water the tomatoes and check the basil for aphids.",
                "tasks": [
                    { "plant": "tomato", "task": "water deeply in the morning" },
                    { "plant": "basil", "task": "inspect leaf undersides for aphids" }
                ]
            },
            "healthAssessment": {
                "overall": "good",
                "flags": []
            },
            "harvestSchedule": {
                "upcoming": [
                    { "plant": "tomato", "window": "within 10 days" }
                ]
            },
            "plan": {
                "nextSteps": ["sow winter lettuce", "clear the spent bean bed"]
            },
            "analysis": {
                "risk": "none",
                "note": "Conditions are stable; no protective action needed."
            }
        })
        .to_string()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, String> {
        Ok(self
            .canned
            .clone()
            .unwrap_or_else(MockLlmClient::default_reply))
    }
}
