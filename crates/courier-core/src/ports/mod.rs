//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。scheduler はここにある trait だけに依存し、
//! Planner / Executor / 永続化の実装詳細は知らない。

pub mod clock;
pub mod executor;
pub mod id_generator;
pub mod planner;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::executor::Executor;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::planner::Planner;
pub use self::task_store::TaskStore;
pub use crate::domain::decision::Decider;
