//! App - アプリケーション層
//!
//! ports を組み合わせてタスクのライフサイクルを回します。
//!
//! # 主要コンポーネント
//! - **SchedulerBuilder**: コラボレータのワイヤリングと起動時検証
//! - **Lifecycle**: 1 パス分の状態遷移（classify → plan → execute → verify → decide）
//! - **Scheduler**: 同時実行数の制御、制御ループ、再起動時の復旧
//! - **TaskService**: submit / status / list / handle_message / dead_letters

pub mod builder;
pub mod lifecycle;
pub mod scheduler;
pub mod service;

pub use self::builder::{App, BuildError, SchedulerBuilder};
pub use self::lifecycle::{Lifecycle, Registry};
pub use self::scheduler::{Scheduler, SchedulerHandle};
pub use self::service::{MessageReply, TaskService};
