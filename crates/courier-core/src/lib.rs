//! courier-core
//!
//! Task dispatch with a lifecycle state machine: every task carries an
//! envelope (mode, hops, TTL, failure/success streaks, escalation flag) that
//! decides when it retries, when it escalates to deep analysis, and when it is
//! abandoned.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, envelope, plan, reply, outcome, decision, errors）
//! - **ports**: 抽象化レイヤー（Planner, Executor, TaskStore, Clock, IdGenerator）
//! - **impls**: ports の実装（MemoryTaskStore, FileTaskStore, Scripted*）
//! - **queue**: pending / processing / finished の 3 集合
//! - **app**: ライフサイクル、scheduler、service、builder
//! - **config**: TOML 設定
//! - **observability**: status views

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;
