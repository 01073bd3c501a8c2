//! Application services: generation, dispatch, retry and completion watching.

pub mod assemble;
pub mod dispatch;
pub mod error;
pub mod generate;
pub mod render;
pub mod retry;
pub mod watcher;
