//! 任务层：生命周期状态机、状态事件流与执行器

pub mod executor;
pub mod types;

pub use executor::{ExecutorConfig, TaskExecutor, TaskHandle};
pub use types::{StatusEvent, Task, TaskId, TaskState};
