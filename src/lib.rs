//! Taskbook: tasks, notes and boards kept in a pair of JSON stores.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod fs;
pub mod logging;
pub mod models;
pub mod render;
pub mod sync;

pub use config::Config;
pub use engine::{Clock, SystemClock, Taskbook};
pub use error::{TaskbookError, TaskbookResult};
