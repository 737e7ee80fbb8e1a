//! ManagerBuilder - Manager の構築とワイヤリング
//!
//! - 起動時検証（Fail-fast）: 設定が不正なら worker を起動する前にエラー
//! - 時計とイベント出力は差し替え可能（テストでは FixedClock / CountingEventSink）

use std::sync::Arc;

use super::config::ManagerConfig;
use super::manager::Manager;
use crate::domain::CourierError;
use crate::impls::TracingEventSink;
use crate::ports::{Clock, EventSink, Executor, SystemClock, TaskStore};
use crate::typed::Task;

/// ManagerBuilder は Manager を構築
///
/// # 使用例
/// ```ignore
/// let manager = ManagerBuilder::new(config, store, executor)
///     .with_event_sink(Arc::new(metrics))
///     .start()
///     .await?;
/// ```
pub struct ManagerBuilder<T: Task> {
    config: ManagerConfig,
    store: Arc<dyn TaskStore<T>>,
    executor: Arc<dyn Executor<T>>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
}

impl<T: Task> ManagerBuilder<T> {
    pub fn new(
        config: ManagerConfig,
        store: Arc<dyn TaskStore<T>>,
        executor: Arc<dyn Executor<T>>,
    ) -> Self {
        Self {
            config,
            store,
            executor,
            clock: Arc::new(SystemClock),
            events: Arc::new(TracingEventSink),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Validate the config, recover from the store, and start the workers.
    ///
    /// # Errors
    /// - `CourierError::Config`: the config is invalid (nothing was started)
    /// - `CourierError::Recovery`: the store could not be read
    pub async fn start(self) -> Result<Manager<T>, CourierError> {
        self.config.validate()?;
        Manager::launch(
            self.config,
            self.store,
            self.executor,
            self.clock,
            self.events,
        )
        .await
    }
}
