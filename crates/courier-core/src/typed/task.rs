//! Task trait - 型付き Task の定義

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::TaskId;

/// Task は payload 型と task kind を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize)]
/// struct PurgeCdn {
///     path: String,
/// }
///
/// impl Task for PurgeCdn {
///     const TYPE: &'static str = "acme.cdn.purge.v1";
///
///     fn task_id(&self) -> TaskId {
///         TaskId::new(self.path.clone())
///     }
/// }
/// ```
///
/// # Trait Bounds
/// - `Serialize` / `DeserializeOwned`: store の payload 列との相互変換
/// - `Clone`: ready set と worker がそれぞれ record を持つため
/// - `Send + Sync + 'static`: worker task 間で共有するため
pub trait Task: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// 永続化時の kind
    ///
    /// # 命名規約
    /// - `{namespace}.{domain}.{action}.v{major}`
    /// - 例: `courier.tag.replicate.v1`
    const TYPE: &'static str;

    /// 論理的な作業単位ごとに安定した id
    ///
    /// 同じ操作を再投入したときに同じ id を返すこと（重複排除のキー）。
    fn task_id(&self) -> TaskId;
}
