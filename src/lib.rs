//! Sprout - Rust 花园智能体系统
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: Agent 目录、状态看板、运行器、监测调度、编排主循环
//! - **garden**: 花园快照、持久化存储、天气数据源
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **notify**: 面向用户的轻量通知流
//! - **observability**: 日志初始化
//! - **permission**: 动作模型、风险分级与审批闸门
//! - **results**: Agent 结果仓库（会话缓存 + 持久历史 + 兜底缓存）

pub mod config;
pub mod core;
pub mod garden;
pub mod llm;
pub mod notify;
pub mod observability;
pub mod permission;
pub mod results;
