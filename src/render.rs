//! Terminal output for views and command feedback.

use std::io::IsTerminal;

use chrono::NaiveDate;
use crossterm::style::{Stylize, style};

use crate::engine::{DATE_TITLE_FORMAT, Entry, Group, Stats};
use crate::models::{DEFAULT_BOARD, Item, Priority, TaskStatus};

const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// 着色开关：终端输出着色，管道和测试输出纯文本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    colored: bool,
}

impl Palette {
    pub fn plain() -> Self {
        Self { colored: false }
    }

    pub fn colored() -> Self {
        Self { colored: true }
    }

    /// Colours only when stdout is a terminal and `NO_COLOR` is unset.
    pub fn detect() -> Self {
        Self {
            colored: std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
        }
    }

    fn grey(self, text: &str) -> String {
        if self.colored { style(text).grey().to_string() } else { text.to_string() }
    }

    fn green(self, text: &str) -> String {
        if self.colored { style(text).green().to_string() } else { text.to_string() }
    }

    fn magenta(self, text: &str) -> String {
        if self.colored { style(text).magenta().to_string() } else { text.to_string() }
    }

    fn blue(self, text: &str) -> String {
        if self.colored { style(text).blue().to_string() } else { text.to_string() }
    }

    fn yellow(self, text: &str) -> String {
        if self.colored { style(text).yellow().to_string() } else { text.to_string() }
    }

    fn red(self, text: &str) -> String {
        if self.colored { style(text).red().to_string() } else { text.to_string() }
    }

    fn underline(self, text: &str) -> String {
        if self.colored { style(text).underlined().to_string() } else { text.to_string() }
    }
}

/// 毫秒格式化为 `HH:MM:SS`
pub fn format_duration(millis: u64) -> String {
    let total_seconds = millis / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

fn status_symbol(item: &Item, palette: Palette) -> String {
    match item.task().map(|t| t.status()) {
        Some(TaskStatus::Complete) => palette.green("✔"),
        Some(TaskStatus::InProgress) => palette.blue("…"),
        Some(TaskStatus::Pending) => palette.magenta("☐"),
        None => palette.blue("●"),
    }
}

fn description(item: &Item, palette: Palette) -> String {
    if item.is_complete() {
        return palette.grey(&item.description);
    }
    match item.task().map(|t| t.priority) {
        Some(Priority::Medium) => {
            format!("{} {}", palette.yellow(&item.description), palette.yellow("(!)"))
        }
        Some(Priority::High) => {
            format!("{} {}", palette.red(&item.description), palette.red("(!!)"))
        }
        _ => item.description.clone(),
    }
}

/// 单行条目
///
/// `with_boards` 用于按日期分组的视图：此时标题不是看板，需要在行尾列出。
pub fn item_line(entry: &Entry, now: i64, with_boards: bool, palette: Palette) -> String {
    let item = &entry.item;
    let mut line = format!(
        "{} {} {}",
        palette.grey(&format!("{:>5}.", entry.key.to_string())),
        status_symbol(item, palette),
        description(item, palette)
    );

    if item.is_bug {
        line.push(' ');
        line.push_str(&palette.red("(BUG)"));
    }
    if item.is_starred {
        line.push(' ');
        line.push_str(&palette.yellow("★"));
    }

    let mut details = Vec::new();
    if !with_boards {
        let age = (now - item.timestamp).max(0) / DAY_MILLIS;
        if age > 0 {
            details.push(format!("Age: {}d", age));
        }
    }
    if let Some(task) = item.task() {
        if task.in_progress {
            details.push(format!("Timer: {}", format_duration(task.running_time(now))));
        }
        if task.cumulative_time_taken > 0 {
            details.push(format!("Total: {}", format_duration(task.cumulative_time_taken)));
        }
        if let Some(deadline) = task.deadline {
            details.push(format!("Deadline: {}", deadline.format("%Y/%m/%d")));
        }
    }
    if with_boards {
        let boards: Vec<&str> = item
            .boards
            .iter()
            .map(String::as_str)
            .filter(|b| *b != DEFAULT_BOARD)
            .collect();
        if !boards.is_empty() {
            details.push(format!("Boards: {}", boards.join(" ")));
        }
    }
    if item.link().is_some() {
        details.push("Link".to_string());
    }

    if !details.is_empty() {
        line.push_str(&palette.grey(&format!(" {{ {} }}", details.join(" "))));
    }
    line
}

fn group_title(group: &Group, today: NaiveDate, palette: Palette) -> String {
    let counts = format!("[{}/{}]", group.complete, group.tasks);
    let mut title = format!(" {} {}", palette.underline(&group.title), palette.grey(&counts));
    if group.title == today.format(DATE_TITLE_FORMAT).to_string() {
        title.push(' ');
        title.push_str(&palette.grey("[Today]"));
    }
    title
}

/// Renders groups with one title line each and an indented item list.
pub fn render_groups(
    groups: &[Group],
    now: i64,
    today: NaiveDate,
    with_boards: bool,
    palette: Palette,
) -> String {
    let mut out = String::new();
    for group in groups {
        out.push('\n');
        out.push_str(&group_title(group, today, palette));
        out.push('\n');
        for entry in &group.entries {
            out.push_str(&item_line(entry, now, with_boards, palette));
            out.push('\n');
        }
    }
    out
}

pub fn render_stats(stats: &Stats, palette: Palette) -> String {
    let percent = format!("{}%", stats.percent);
    format!(
        "\n  {} of all tasks complete.\n  {}\n",
        palette.green(&percent),
        palette.grey(&format!(
            "{} done · {} in-progress · {} pending · {} notes · {} tracked",
            stats.complete,
            stats.in_progress,
            stats.pending,
            stats.notes,
            format_duration(stats.total_time)
        ))
    )
}

/// 表格视图：每个任务一行（不着色，保证列对齐）
pub fn render_table(rows: &[Entry], now: i64) -> String {
    let mut out = format!(
        "{:>5}  {:<40}  {:<24}  {:<10}  {:<10}  {:>8}\n",
        "ID", "DESCRIPTION", "BOARDS", "DEADLINE", "COMPLETED", "TIME"
    );

    let date = |d: Option<NaiveDate>| {
        d.map(|d| d.format("%Y/%m/%d").to_string())
            .unwrap_or_default()
    };
    for row in rows {
        let item = &row.item;
        let running = item.task().map(|t| t.running_time(now)).unwrap_or(0);
        out.push_str(&format!(
            "{:>5}  {:<40}  {:<24}  {:<10}  {:<10}  {:>8}\n",
            row.key.to_string(),
            truncate(&item.description, 40),
            truncate(&item.boards.join(","), 24),
            date(item.deadline()),
            date(item.completion_date()),
            format_duration(item.cumulative_time() + running)
        ));
    }
    out
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// `Checked task: 1, 2`
pub fn ids_message(action: &str, ids: &[u32]) -> Option<String> {
    if ids.is_empty() {
        return None;
    }
    let ids: Vec<String> = ids.iter().map(u32::to_string).collect();
    Some(format!("{}: {}", action, ids.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemKey, ItemKind, TaskState};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn entry(id: u32, kind: ItemKind) -> Entry {
        let boards = vec!["@work".to_string()];
        Entry {
            key: ItemKey::active(id),
            item: Item::new(kind, "Ship release".to_string(), boards, 0, date(1970, 1, 1)),
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00:00");
        assert_eq!(format_duration(3_723_000), "01:02:03");
        assert_eq!(format_duration(100 * 3_600_000), "100:00:00");
    }

    #[test]
    fn test_item_line_markers() {
        let mut state = TaskState {
            priority: Priority::High,
            ..TaskState::default()
        };
        state.add_time(60_000);
        let mut e = entry(3, ItemKind::Task(state));
        e.item.is_bug = true;
        e.item.is_starred = true;

        let line = item_line(&e, 2 * DAY_MILLIS, false, Palette::plain());
        assert!(line.starts_with("    3. ☐ Ship release (!!) (BUG) ★"));
        assert!(line.contains("Age: 2d"));
        assert!(line.contains("Total: 00:01:00"));

        let by_date = item_line(&e, 0, true, Palette::plain());
        assert!(by_date.contains("Boards: @work"));
        assert!(!by_date.contains("Age"));
    }

    #[test]
    fn test_archive_keys_are_prefixed() {
        let e = Entry {
            key: ItemKey::archive(2),
            ..entry(2, ItemKind::Note)
        };
        let line = item_line(&e, 0, false, Palette::plain());
        assert!(line.trim_start().starts_with("a2. ●"));
    }

    #[test]
    fn test_group_title_uses_group_totals() {
        // 已完成任务被隐藏后，标题仍按整组计数
        let group = Group {
            title: date(2024, 1, 10).format(DATE_TITLE_FORMAT).to_string(),
            entries: vec![entry(2, ItemKind::Task(TaskState::default())), entry(3, ItemKind::Note)],
            tasks: 2,
            complete: 1,
        };

        let rendered = render_groups(&[group], 0, date(2024, 1, 10), true, Palette::plain());
        assert!(rendered.contains("Wed Jan 10 2024 [1/2] [Today]"));
        assert_eq!(rendered.lines().filter(|l| l.contains("Ship release")).count(), 2);
    }

    #[test]
    fn test_colored_output_carries_escape_codes() {
        let mut done = TaskState::default();
        done.toggle_complete(0, date(1970, 1, 1));
        let e = entry(1, ItemKind::Task(done));

        let plain = item_line(&e, 0, false, Palette::plain());
        assert!(!plain.contains('\u{1b}'));

        let group = Group {
            title: "@work".to_string(),
            entries: vec![e],
            tasks: 1,
            complete: 1,
        };
        let colored = render_groups(&[group], 0, date(2024, 1, 10), false, Palette::colored());
        assert!(colored.contains('\u{1b}'));
        assert!(colored.contains("Ship release"));
    }

    #[test]
    fn test_table_and_messages() {
        let table = render_table(&[entry(1, ItemKind::Task(TaskState::default()))], 0);
        assert_eq!(table.lines().count(), 2);
        assert!(table.contains("Ship release"));

        assert_eq!(ids_message("Starred item", &[1, 2]).as_deref(), Some("Starred item: 1, 2"));
        assert_eq!(ids_message("Starred item", &[]), None);
    }
}
