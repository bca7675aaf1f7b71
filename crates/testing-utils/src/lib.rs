//! # ept-testing-utils
//!
//! 各crate测试共用的替身与辅助工具。
//!
//! - **Fake进程启动器**：不创建真实子进程的 [`ProcessLauncher`](ept_core::traits::ProcessLauncher)，
//!   可以模拟崩溃和启动失败
//! - **构建器**：Worker hello、工作消息和任务的测试数据
//! - **辅助函数**：条件等待和测试日志
//!
//! ```toml
//! [dev-dependencies]
//! ept-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
