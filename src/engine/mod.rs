//! 条目引擎：查询、过滤、分组与所有变更操作

pub mod clock;
pub mod filter;
pub mod query;
pub mod stats;
pub mod taskbook;

pub use clock::{Clock, SystemClock};
pub use filter::{DATE_TITLE_FORMAT, Entry, Group};
pub use query::{DataSource, Query, parse_date};
pub use stats::Stats;
pub use taskbook::{Applied, Moved, NewItem, Taskbook, TimeRemoval, Toggled, parse_minutes};
