//! Built-in task executors.
//!
//! Each executor is an ordinary [`crate::TaskHandler`] plugin; nothing in
//! the queue core knows about them.

mod http;
mod shell;

pub use self::http::HttpExecutor;
pub use self::shell::ShellExecutor;
