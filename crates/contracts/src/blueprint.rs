//! ShipperBlueprint - Config Loader 输出
//!
//! 描述完整的投递配置：批处理参数、输出 sink 及其重试策略。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的投递配置蓝图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipperBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 批处理设置
    #[serde(default)]
    pub batching: BatchingConfig,

    /// 输出路由配置
    pub sinks: Vec<SinkConfig>,
}

/// 批处理设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchingConfig {
    /// 每批事件数
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    500
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

/// Sink 输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink 名称
    pub name: String,

    /// Sink 类型
    pub sink_type: SinkType,

    /// 同时在途的最大批次数
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// 重试策略
    #[serde(default)]
    pub retry: RetryConfig,

    /// 类型特定参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_max_in_flight() -> usize {
    8
}

/// Sink 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// 流式写入 (PutRecords)
    Stream,
    /// 批量索引写入 (_bulk)
    BulkIndex,
}

/// 部分失败重试策略
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 两次尝试之间的固定间隔 (毫秒)
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,

    /// 最大尝试次数 (含首次)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_max_attempts() -> u32 {
    20
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_retry_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl RetryConfig {
    /// 重试间隔
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}
