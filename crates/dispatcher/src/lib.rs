//! # Dispatcher
//!
//! 批次分发模块。
//!
//! 负责：
//! - 将每个 `Batch` 交给后台 worker，调用方不等待 I/O
//! - 按 `<prefix>.<source>` 逐条发布，单批次失败即中止
//! - 跟踪在途批次数，支持带超时的 drain

pub mod codec;
pub mod dispatcher;
pub mod drain;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod publisher;
pub mod report;

pub use codec::{decode, encode};
pub use contracts::{Batch, BatchId, BrokerSession, ErrorHandler, LogEvent};
pub use dispatcher::BatchDispatcher;
pub use drain::{DrainTracker, InFlightGuard, Silencer};
pub use error::{DispatcherError, SpawnError};
pub use executor::{Executor, Job, ManualExecutor, Rejected, TokioExecutor};
pub use metrics::{DispatchMetrics, MetricsSnapshot};
pub use publisher::{BatchOutcome, BatchPublisher, DEFAULT_SEND_TIMEOUT};
pub use report::{OnlyOnceErrorHandler, TracingErrorHandler};
