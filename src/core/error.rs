//! Agent 错误类型
//!
//! 一次 Agent 运行可能出现的失败（未知 Agent、LLM、存储、响应解析）。
//! 天气故障走缓存回退、结果写入走本地回退缓存，不在此建模；
//! 其余失败转为 error 状态加一条通知，绝不让调度循环崩溃。

use thiserror::Error;

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 请求的 agentId 不在目录中；对本次调用是致命的，且不触碰任何状态
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Garden store unavailable: {0}")]
    StoreUnavailable(String),

    /// LLM 响应缺少约定的 result 字段，或根本不是合法 JSON
    #[error("Malformed agent response: {0}")]
    MalformedResponse(String),
}
