//! 核心层：错误分类与公共再导出

pub mod error;

pub use error::AgentError;
