use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::TaskbookError;

/// 默认看板（创建时未指定看板）
pub const DEFAULT_BOARD: &str = "My board";
/// 用户看板名称前缀
pub const BOARD_MARKER: char = '@';
/// 选择默认看板的快捷写法
pub const DEFAULT_BOARD_ALIAS: &str = "myboard";

/// 任务优先级
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    #[default]
    Normal = 1,
    Medium = 2,
    High = 3,
}

impl TryFrom<u8> for Priority {
    type Error = TaskbookError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Priority::Normal),
            2 => Ok(Priority::Medium),
            3 => Ok(Priority::High),
            other => Err(TaskbookError::InvalidPriority(other.to_string())),
        }
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority as u8
    }
}

impl FromStr for Priority {
    type Err = TaskbookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .map_err(|_| TaskbookError::InvalidPriority(s.to_string()))
            .and_then(Priority::try_from)
    }
}

/// 任务所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Complete,
}

/// Task-only fields.
///
/// `in_progress` and `in_progress_activation_time` always change together,
/// and `is_complete` excludes `in_progress`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskState {
    pub is_complete: bool,
    pub in_progress: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_progress_activation_time: Option<i64>,
    /// 累计耗时（毫秒）
    pub cumulative_time_taken: u64,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_date: Option<NaiveDate>,
}

impl TaskState {
    pub fn status(&self) -> TaskStatus {
        if self.is_complete {
            TaskStatus::Complete
        } else if self.in_progress {
            TaskStatus::InProgress
        } else {
            TaskStatus::Pending
        }
    }

    /// Starts the timer, or pauses it when already running.
    ///
    /// Returns `true` when the task was started. Starting a completed task
    /// reopens it.
    pub fn toggle_progress(&mut self, now: i64) -> bool {
        if self.in_progress {
            self.pause(now);
            return false;
        }

        self.is_complete = false;
        self.completion_date = None;
        self.in_progress = true;
        self.in_progress_activation_time = Some(now);
        true
    }

    /// 暂停计时：把本次运行时间累加到总耗时
    pub fn pause(&mut self, now: i64) {
        if let Some(started) = self.in_progress_activation_time.take() {
            let elapsed = now.saturating_sub(started).max(0) as u64;
            self.cumulative_time_taken = self.cumulative_time_taken.saturating_add(elapsed);
        }
        self.in_progress = false;
    }

    /// Checks or unchecks the task. Returns `true` when it is now complete.
    pub fn toggle_complete(&mut self, now: i64, today: NaiveDate) -> bool {
        if self.is_complete {
            self.is_complete = false;
            self.completion_date = None;
            return false;
        }

        if self.in_progress {
            self.pause(now);
        }
        self.is_complete = true;
        self.completion_date = Some(today);
        true
    }

    pub fn add_time(&mut self, millis: u64) {
        self.cumulative_time_taken = self.cumulative_time_taken.saturating_add(millis);
    }

    /// 扣减耗时，不足时归零；返回实际扣减的毫秒数
    pub fn remove_time(&mut self, millis: u64) -> u64 {
        let removed = millis.min(self.cumulative_time_taken);
        self.cumulative_time_taken -= removed;
        removed
    }

    pub fn clear_time(&mut self) {
        self.cumulative_time_taken = 0;
    }

    /// Restarts a running timer at `now`, dropping the unfolded interval.
    pub fn restart_timer(&mut self, now: i64) -> bool {
        if !self.in_progress {
            return false;
        }
        self.in_progress_activation_time = Some(now);
        true
    }

    /// Milliseconds since the timer was last started, zero when paused.
    pub fn running_time(&self, now: i64) -> u64 {
        self.in_progress_activation_time
            .map(|started| now.saturating_sub(started).max(0) as u64)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ItemKind {
    Task(TaskState),
    Note,
}

/// 任务或笔记
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// 创建日期
    pub date: NaiveDate,
    /// 创建时间戳（毫秒）
    pub timestamp: i64,
    pub description: String,
    #[serde(default)]
    pub is_starred: bool,
    #[serde(default = "default_boards")]
    pub boards: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default)]
    pub is_bug: bool,
    #[serde(flatten)]
    pub kind: ItemKind,
}

fn default_boards() -> Vec<String> {
    vec![DEFAULT_BOARD.to_string()]
}

impl Item {
    pub fn new(
        kind: ItemKind,
        description: String,
        boards: Vec<String>,
        timestamp: i64,
        date: NaiveDate,
    ) -> Self {
        let mut item = Self {
            date,
            timestamp,
            description,
            is_starred: false,
            boards: Vec::new(),
            link: None,
            is_bug: false,
            kind,
        };
        item.add_boards(&boards);
        if item.boards.is_empty() {
            item.boards = default_boards();
        }
        item
    }

    pub fn is_task(&self) -> bool {
        matches!(self.kind, ItemKind::Task(_))
    }

    pub fn task(&self) -> Option<&TaskState> {
        match &self.kind {
            ItemKind::Task(task) => Some(task),
            ItemKind::Note => None,
        }
    }

    pub fn task_mut(&mut self) -> Option<&mut TaskState> {
        match &mut self.kind {
            ItemKind::Task(task) => Some(task),
            ItemKind::Note => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.task().is_some_and(|t| t.is_complete)
    }

    pub fn in_progress(&self) -> bool {
        self.task().is_some_and(|t| t.in_progress)
    }

    pub fn deadline(&self) -> Option<NaiveDate> {
        self.task().and_then(|t| t.deadline)
    }

    pub fn completion_date(&self) -> Option<NaiveDate> {
        self.task().and_then(|t| t.completion_date)
    }

    pub fn cumulative_time(&self) -> u64 {
        self.task().map(|t| t.cumulative_time_taken).unwrap_or(0)
    }

    /// 空字符串视为未设置
    pub fn link(&self) -> Option<&str> {
        self.link.as_deref().filter(|l| !l.is_empty())
    }

    pub fn has_board(&self, board: &str) -> bool {
        self.boards.iter().any(|b| b == board)
    }

    /// Adds boards the item does not hold yet, keeping insertion order.
    pub fn add_boards(&mut self, boards: &[String]) {
        for board in boards {
            if !self.has_board(board) {
                self.boards.push(board.clone());
            }
        }
    }

    /// Boards left after removing `boards`.
    pub fn boards_without(&self, boards: &[String]) -> Vec<String> {
        self.boards
            .iter()
            .filter(|b| !boards.contains(b))
            .cloned()
            .collect()
    }
}

/// Maps user input to a stored board name: `myboard` selects the default
/// board, anything else gets the `@` marker.
pub fn normalize_board(name: &str) -> String {
    let name = name.trim();
    if name.eq_ignore_ascii_case(DEFAULT_BOARD_ALIAS) || name == DEFAULT_BOARD {
        DEFAULT_BOARD.to_string()
    } else if name.starts_with(BOARD_MARKER) {
        name.to_string()
    } else {
        format!("{}{}", BOARD_MARKER, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn task() -> TaskState {
        TaskState::default()
    }

    #[test]
    fn test_new_item_defaults_to_my_board() {
        let item = Item::new(
            ItemKind::Task(TaskState::default()),
            "Ship release".to_string(),
            Vec::new(),
            1_700_000_000_000,
            day(2023, 11, 14),
        );
        assert_eq!(item.boards, vec![DEFAULT_BOARD.to_string()]);
        let state = item.task().unwrap();
        assert_eq!(state.priority, Priority::Normal);
        assert!(!state.is_complete);
        assert!(!state.in_progress);
    }

    #[test]
    fn test_new_item_dedupes_boards() {
        let item = Item::new(
            ItemKind::Note,
            "n".to_string(),
            vec!["@a".to_string(), "@b".to_string(), "@a".to_string()],
            0,
            day(2024, 1, 1),
        );
        assert_eq!(item.boards, vec!["@a", "@b"]);
    }

    #[test]
    fn test_begin_then_pause_folds_elapsed_time() {
        let mut t = task();
        assert!(t.toggle_progress(1_000));
        assert_eq!(t.status(), TaskStatus::InProgress);
        assert_eq!(t.in_progress_activation_time, Some(1_000));

        assert!(!t.toggle_progress(4_500));
        assert_eq!(t.status(), TaskStatus::Pending);
        assert_eq!(t.in_progress_activation_time, None);
        assert_eq!(t.cumulative_time_taken, 3_500);
    }

    #[test]
    fn test_many_cycles_never_lose_time() {
        let mut t = task();
        let mut expected = 0;
        let mut now = 10;
        for run in 1..=20 {
            t.toggle_progress(now);
            now += run * 37;
            expected += (run * 37) as u64;
            t.toggle_progress(now);
            now += 1_000;
        }
        assert_eq!(t.cumulative_time_taken, expected);
    }

    #[test]
    fn test_check_running_task_pauses_first() {
        let mut t = task();
        t.toggle_progress(0);
        assert!(t.toggle_complete(600, day(2024, 5, 1)));
        assert!(t.is_complete);
        assert!(!t.in_progress);
        assert_eq!(t.cumulative_time_taken, 600);
        assert_eq!(t.completion_date, Some(day(2024, 5, 1)));

        assert!(!t.toggle_complete(700, day(2024, 5, 2)));
        assert_eq!(t.status(), TaskStatus::Pending);
        assert_eq!(t.completion_date, None);
    }

    #[test]
    fn test_begin_reopens_completed_task() {
        let mut t = task();
        t.toggle_complete(0, day(2024, 5, 1));
        assert!(t.toggle_progress(50));
        assert!(!t.is_complete);
        assert!(t.in_progress);
        assert_eq!(t.completion_date, None);
    }

    #[test]
    fn test_remove_time_clamps_to_zero() {
        let mut t = task();
        t.add_time(60_000);
        assert_eq!(t.remove_time(25_000), 25_000);
        assert_eq!(t.remove_time(90_000), 35_000);
        assert_eq!(t.cumulative_time_taken, 0);
    }

    #[test]
    fn test_restart_timer_only_when_running() {
        let mut t = task();
        assert!(!t.restart_timer(5));
        t.toggle_progress(5);
        assert!(t.restart_timer(900));
        t.pause(1_000);
        assert_eq!(t.cumulative_time_taken, 100);
    }

    #[test]
    fn test_priority_parsing() {
        assert_eq!("2".parse::<Priority>().unwrap(), Priority::Medium);
        assert!(matches!(
            "4".parse::<Priority>(),
            Err(TaskbookError::InvalidPriority(_))
        ));
        assert!("high".parse::<Priority>().is_err());
    }

    #[test]
    fn test_normalize_board() {
        assert_eq!(normalize_board("myboard"), DEFAULT_BOARD);
        assert_eq!(normalize_board("coding"), "@coding");
        assert_eq!(normalize_board("@coding"), "@coding");
    }

    #[test]
    fn test_json_shape_of_task_and_note() {
        let mut item = Item::new(
            ItemKind::Task(TaskState::default()),
            "Write docs".to_string(),
            vec!["@docs".to_string()],
            42,
            day(2024, 2, 29),
        );
        item.task_mut().unwrap().deadline = Some(day(2024, 3, 1));

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "task");
        assert_eq!(json["date"], "2024-02-29");
        assert_eq!(json["priority"], 1);
        assert_eq!(json["deadline"], "2024-03-01");
        assert!(json.get("link").is_none());
        assert!(json.get("completionDate").is_none());

        let note = Item::new(ItemKind::Note, "idea".to_string(), Vec::new(), 1, day(2024, 1, 1));
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["type"], "note");
        assert!(json.get("isComplete").is_none());
    }

    #[test]
    fn test_missing_keys_are_defaulted() {
        let raw = r#"{"type":"task","date":"2024-01-02","timestamp":7,"description":"old"}"#;
        let item: Item = serde_json::from_str(raw).unwrap();
        assert_eq!(item.boards, vec![DEFAULT_BOARD.to_string()]);
        let state = item.task().unwrap();
        assert_eq!(state.priority, Priority::Normal);
        assert_eq!(state.cumulative_time_taken, 0);
    }
}
