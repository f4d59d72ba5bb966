//! # Dispatcher
//!
//! 批次投递模块。
//!
//! 负责：
//! - 按 sink 构建请求并解析逐条结果 (stream / bulk index)
//! - 部分失败时只重发失败的事件，限定重试次数
//! - 通过 `Completion` 向调用方交付唯一的最终结果
//! - Fan-out 到多个 sinks，限制每个 sink 的在途批次数

pub mod completion;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod signer;
pub mod sinks;
pub mod transport;

pub use completion::{completion, Completer, Completion};
pub use contracts::{Batch, SinkAdapter};
pub use dispatcher::{
    create_dispatcher, create_sink_handle, DispatchSummary, Dispatcher, DispatcherBuilder,
    DispatcherConfig,
};
pub use engine::{DeliveryEngine, RetryPolicy};
pub use error::DispatcherError;
pub use handle::{DeliveryReport, SinkHandle};
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use signer::HeaderSigner;
pub use sinks::{
    BulkIndexAdapter, BulkIndexSinkConfig, BulkResponse, IndexName, SinkClient, StreamAdapter,
    StreamSinkConfig, POSTPONED_ID,
};
pub use transport::{ReqwestTransport, DEFAULT_REQUEST_TIMEOUT};
