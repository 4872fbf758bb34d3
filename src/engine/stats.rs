use crate::models::{Item, TaskStatus};

/// 进度概览
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// 完成百分比（向下取整）
    pub percent: u32,
    pub complete: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub notes: usize,
    /// 所有任务的累计耗时（毫秒）
    pub total_time: u64,
}

impl Stats {
    pub fn collect<'a>(items: impl IntoIterator<Item = &'a Item>) -> Self {
        let mut stats = Stats::default();

        for item in items {
            let Some(task) = item.task() else {
                stats.notes += 1;
                continue;
            };

            stats.total_time += task.cumulative_time_taken;
            match task.status() {
                TaskStatus::Complete => stats.complete += 1,
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::Pending => stats.pending += 1,
            }
        }

        let tasks = stats.complete + stats.in_progress + stats.pending;
        if tasks > 0 {
            stats.percent = (stats.complete * 100 / tasks) as u32;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemKind, TaskState};
    use chrono::NaiveDate;

    fn item(kind: ItemKind) -> Item {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        Item::new(kind, "x".to_string(), Vec::new(), 0, date)
    }

    #[test]
    fn test_collect_counts_each_state() {
        let mut done = TaskState::default();
        done.add_time(1_000);
        done.toggle_complete(0, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        let mut running = TaskState::default();
        running.add_time(500);
        running.toggle_progress(0);

        let items = vec![
            item(ItemKind::Task(done)),
            item(ItemKind::Task(running)),
            item(ItemKind::Task(TaskState::default())),
            item(ItemKind::Note),
        ];
        let stats = Stats::collect(&items);

        assert_eq!(stats.complete, 1);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.notes, 1);
        assert_eq!(stats.percent, 33);
        assert_eq!(stats.total_time, 1_500);
    }

    #[test]
    fn test_empty_is_zero_percent() {
        assert_eq!(Stats::collect(&Vec::<Item>::new()), Stats::default());
    }
}
