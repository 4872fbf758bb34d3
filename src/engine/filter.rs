use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::query::{DataSource, DateField, Query, SortColumn, SortDirective};
use crate::models::{Item, ItemKey, Store, StoreKind};

/// 日期分组标题格式，例如 "Tue Jan 02 2024"
pub const DATE_TITLE_FORMAT: &str = "%a %b %d %Y";

/// An item together with the store-qualified key it was read under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: ItemKey,
    pub item: Item,
}

/// A titled list of entries (a board or a day).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub title: String,
    /// 可见条目（可能已隐藏已完成任务）
    pub entries: Vec<Entry>,
    /// Task count over the whole group, hidden entries included.
    pub tasks: usize,
    pub complete: usize,
}

impl Group {
    /// Counts over `all`, then keeps the entries that should be shown.
    fn collect(title: String, all: Vec<Entry>, show_completed: bool) -> Self {
        let tasks = all.iter().filter(|e| e.item.is_task()).count();
        let complete = all.iter().filter(|e| e.item.is_complete()).count();
        let entries = all.into_iter().filter(|e| visible(e, show_completed)).collect();
        Self {
            title,
            entries,
            tasks,
            complete,
        }
    }
}

/// Snapshot of the stores selected by `source`, in key order.
pub fn select(source: DataSource, active: &Store, archive: &Store) -> Vec<Entry> {
    let mut entries = Vec::new();
    for kind in source.stores() {
        let store = match kind {
            StoreKind::Active => active,
            StoreKind::Archive => archive,
        };
        entries.extend(store.iter().map(|(id, item)| Entry {
            key: ItemKey { store: *kind, id: *id },
            item: item.clone(),
        }));
    }
    entries
}

/// Applies attribute predicates, the date range and board selectors.
///
/// Every predicate only removes entries, so term order does not matter.
pub fn apply(entries: Vec<Entry>, query: &Query) -> Vec<Entry> {
    entries
        .into_iter()
        .filter(|e| query.attributes.iter().all(|a| a.matches(&e.item)))
        .filter(|e| query.date_range.is_none_or(|r| r.matches(&e.item)))
        .filter(|e| query.matches_boards(&e.item))
        .collect()
}

/// Entries whose description contains any of `words`, ignoring case.
pub fn find(entries: Vec<Entry>, words: &[String]) -> Vec<Entry> {
    let words: Vec<String> = words
        .iter()
        .map(|w| w.to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();

    entries
        .into_iter()
        .filter(|e| {
            let description = e.item.description.to_lowercase();
            words.iter().any(|w| description.contains(w.as_str()))
        })
        .collect()
}

fn visible(entry: &Entry, show_completed: bool) -> bool {
    show_completed || !entry.item.is_complete()
}

/// Groups entries under each of `boards` they belong to.
///
/// With `show_completed == false` complete tasks are hidden (they still
/// count towards the group totals); boards left without visible entries are
/// omitted.
pub fn group_by_board(entries: &[Entry], boards: &[String], show_completed: bool) -> Vec<Group> {
    boards
        .iter()
        .map(|board| {
            let members = entries
                .iter()
                .filter(|e| e.item.has_board(board))
                .cloned()
                .collect();
            Group::collect(board.clone(), members, show_completed)
        })
        .filter(|g| !g.entries.is_empty())
        .collect()
}

/// Groups entries by creation date or deadline, oldest first. Entries
/// without the date are left out.
pub fn group_by_date(entries: &[Entry], field: DateField, show_completed: bool) -> Vec<Group> {
    let mut by_date: BTreeMap<NaiveDate, Vec<Entry>> = BTreeMap::new();

    for entry in entries {
        if let Some(date) = field.of(&entry.item) {
            by_date.entry(date).or_default().push(entry.clone());
        }
    }

    by_date
        .into_iter()
        .map(|(date, members)| {
            let title = date.format(DATE_TITLE_FORMAT).to_string();
            Group::collect(title, members, show_completed)
        })
        .filter(|g| !g.entries.is_empty())
        .collect()
}

/// Stable sort by one table column. Missing dates sort as earliest.
pub fn sort_entries(entries: &mut [Entry], directive: SortDirective) {
    entries.sort_by(|a, b| {
        let ordering = compare(a, b, directive.column);
        if directive.descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

fn compare(a: &Entry, b: &Entry, column: SortColumn) -> Ordering {
    match column {
        SortColumn::Id => a.key.cmp(&b.key),
        SortColumn::Description => a
            .item
            .description
            .to_lowercase()
            .cmp(&b.item.description.to_lowercase()),
        SortColumn::Boards => a.item.boards.len().cmp(&b.item.boards.len()),
        SortColumn::Deadline => a.item.deadline().cmp(&b.item.deadline()),
        SortColumn::Completed => a.item.completion_date().cmp(&b.item.completion_date()),
        SortColumn::Time => a.item.cumulative_time().cmp(&b.item.cumulative_time()),
    }
}
