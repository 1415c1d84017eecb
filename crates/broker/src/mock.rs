//! Mock 发布会话
//!
//! 用于单元测试的 mock 实现，支持注入失败、延迟与挂起场景。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use contracts::{
    BrokerSession, ConnectionState, ContractError, Destination, SharedState, TransportMessage,
};
use tracing::instrument;

/// Mock 会话配置
#[derive(Debug, Default, Clone)]
pub struct MockConfig {
    /// 第 N 次 publish 调用失败（从 1 开始计数）
    pub fail_at: Option<usize>,
    /// 发往这些 destination 的消息总是失败
    pub fail_destinations: Vec<String>,
    /// 每次 publish 前的延迟
    pub delay: Option<Duration>,
    /// publish 永不返回
    pub hang: bool,
}

/// Mock 会话：记录每条成功发布的消息
pub struct MockSession {
    config: MockConfig,
    state: SharedState,
    calls: AtomicUsize,
    published: Mutex<Vec<(Destination, TransportMessage)>>,
}

impl MockSession {
    /// 创建已启动（Started）的 mock 会话
    pub fn new() -> Self {
        Self::with_config(MockConfig::default())
    }

    /// 使用配置创建 mock 会话
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config,
            state: SharedState::new(ConnectionState::Started),
            calls: AtomicUsize::new(0),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn with_state(self, state: ConnectionState) -> Self {
        self.state.set(state);
        self
    }

    /// 模拟连接状态变化
    pub fn set_state(&self, state: ConnectionState) {
        self.state.set(state);
    }

    /// publish 被调用的次数（包括失败的调用）
    pub fn publish_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 成功发布的消息，按完成顺序
    pub fn published(&self) -> Vec<(Destination, TransportMessage)> {
        self.lock().clone()
    }

    pub fn published_destinations(&self) -> Vec<String> {
        self.lock()
            .iter()
            .map(|(d, _)| d.as_str().to_string())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(Destination, TransportMessage)>> {
        self.published.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerSession for MockSession {
    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    #[instrument(name = "mock_publish", skip(self, message), fields(destination = %destination))]
    async fn publish(
        &self,
        destination: &Destination,
        message: TransportMessage,
    ) -> Result<(), ContractError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if self.config.hang {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.config.delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.get();
        if state != ConnectionState::Started {
            return Err(ContractError::NotStarted { state });
        }
        if self.config.fail_at == Some(call) {
            return Err(ContractError::publish(
                destination.as_str(),
                format!("mock failure on call {call}"),
            ));
        }
        if self
            .config
            .fail_destinations
            .iter()
            .any(|d| d == destination.as_str())
        {
            return Err(ContractError::publish(destination.as_str(), "mock failure"));
        }

        self.lock().push((destination.clone(), message));
        Ok(())
    }
}
