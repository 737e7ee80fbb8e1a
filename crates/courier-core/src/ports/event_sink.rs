//! EventSink port - イベント記録の抽象化
//!
//! # 実装
//! - NoopEventSink: 何もしない
//! - TracingEventSink: tracing でログ出力（デフォルト）
//! - CountingEventSink: イベント名ごとの件数（テスト・メトリクス代わり）

use crate::domain::DomainEvent;

/// EventSink はドメインイベントを記録
///
/// worker から同期的に呼ばれるので、ブロックしないこと。
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &DomainEvent);
}
