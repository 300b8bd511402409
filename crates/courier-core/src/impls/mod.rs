//! Port implementations shipped with the crate.

pub mod file_store;
pub mod memory_store;
pub mod scripted;

pub use file_store::FileTaskStore;
pub use memory_store::MemoryTaskStore;
pub use scripted::{Script, ScriptedExecutor, ScriptedPlanner, ScriptedTask, ScriptedVerdict};
