//! The item store engine.
//!
//! Every mutation follows the same shape: load the target store, validate
//! all ids and inputs, apply the change to every item, save the store once.
//! Any error returns before the save, so a failed batch leaves the file
//! untouched.

use chrono::NaiveDate;
use log::info;

use super::clock::{Clock, SystemClock};
use super::filter::{self, Entry, Group};
use super::query::{DateField, Query, parse_date};
use super::stats::Stats;
use crate::config::Config;
use crate::error::{TaskbookError, TaskbookResult};
use crate::fs::Storage;
use crate::models::{
    BOARD_MARKER, Item, ItemKey, ItemKind, Priority, Store, StoreKind, TaskState, known_boards,
    next_id, normalize_board,
};

const PRIORITY_OPTION: &str = "p:";
const BUG_OPTION: &str = "b:";
const DEADLINE_OPTION: &str = "date:";
const MINUTE_MILLIS: u64 = 60_000;

/// 切换类操作的结果：按切换前的状态分成两组
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Toggled {
    /// 切换后为"开"（已加星、已完成、已开始……）
    pub on: Vec<u32>,
    pub off: Vec<u32>,
    /// 不适用的条目（例如对笔记执行 check）
    pub skipped: Vec<u32>,
}

/// Result of an operation that only applies to some items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    pub affected: Vec<u32>,
    pub skipped: Vec<u32>,
}

/// An item re-keyed by delete or restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Moved {
    pub from: ItemKey,
    pub to: ItemKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRemoval {
    pub id: u32,
    /// 实际扣减的毫秒数（可能小于请求值）
    pub removed: u64,
}

/// Words given to a create command, split into their roles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewItem {
    pub description: String,
    pub boards: Vec<String>,
    pub priority: Priority,
    pub is_bug: bool,
    pub deadline: Option<NaiveDate>,
}

impl NewItem {
    /// `@board` words become boards, `p:2` sets the priority, `b:true`
    /// flags a bug, `date:YYYY/MM/DD` sets the deadline; the rest is the
    /// description.
    pub fn parse(words: &[String]) -> TaskbookResult<Self> {
        let mut new_item = NewItem::default();
        let mut description = Vec::new();

        for word in words {
            if let Some(level) = word.strip_prefix(PRIORITY_OPTION) {
                new_item.priority = level.parse()?;
            } else if let Some(flag) = word.strip_prefix(BUG_OPTION) {
                new_item.is_bug = flag.eq_ignore_ascii_case("true");
            } else if let Some(date) = word.strip_prefix(DEADLINE_OPTION) {
                new_item.deadline = Some(parse_date(date)?);
            } else if word.starts_with(BOARD_MARKER) && word.len() > 1 {
                if !new_item.boards.contains(word) {
                    new_item.boards.push(word.clone());
                }
            } else {
                description.push(word.as_str());
            }
        }

        new_item.description = description.join(" ").trim().to_string();
        if new_item.description.is_empty() {
            return Err(TaskbookError::MissingInput("description"));
        }
        Ok(new_item)
    }
}

/// Sums minute amounts given on the command line.
pub fn parse_minutes(values: &[String]) -> TaskbookResult<u64> {
    if values.is_empty() {
        return Err(TaskbookError::MissingInput("time value"));
    }

    let mut total: u64 = 0;
    for value in values {
        let minutes = value
            .trim()
            .parse::<u64>()
            .map_err(|_| TaskbookError::InvalidTime(value.clone()))?;
        total = total.saturating_add(minutes);
    }

    if total == 0 {
        return Err(TaskbookError::InvalidTime(values.join(" ")));
    }
    Ok(total)
}

/// Checks `ids` against `store`, collapsing duplicates and keeping order.
fn validate_ids(store: &Store, kind: StoreKind, ids: &[u32]) -> TaskbookResult<Vec<u32>> {
    if ids.is_empty() {
        return Err(TaskbookError::MissingInput("id"));
    }

    let mut unique = Vec::with_capacity(ids.len());
    for &id in ids {
        if !store.contains_key(&id) {
            return Err(TaskbookError::UnknownId(ItemKey { store: kind, id }.to_string()));
        }
        if !unique.contains(&id) {
            unique.push(id);
        }
    }
    Ok(unique)
}

fn normalize_boards(boards: &[String]) -> TaskbookResult<Vec<String>> {
    let mut normalized: Vec<String> = Vec::new();
    for board in boards.iter().filter(|b| !b.trim().is_empty()) {
        let board = normalize_board(board);
        if !normalized.contains(&board) {
            normalized.push(board);
        }
    }
    if normalized.is_empty() {
        return Err(TaskbookError::MissingInput("boards"));
    }
    Ok(normalized)
}

pub struct Taskbook<C: Clock = SystemClock> {
    storage: Storage,
    show_completed: bool,
    clock: C,
}

impl Taskbook<SystemClock> {
    /// Opens the store configured in `config`.
    pub fn open(config: &Config) -> TaskbookResult<Self> {
        let storage = Storage::open(config.store_root()?)?;
        Ok(Self::new(storage, config, SystemClock))
    }
}

impl<C: Clock> Taskbook<C> {
    pub fn new(storage: Storage, config: &Config, clock: C) -> Self {
        Self {
            storage,
            show_completed: config.display_complete_tasks,
            clock,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    // ========================================================================
    // Mutation plumbing
    // ========================================================================

    fn update<T>(
        &self,
        kind: StoreKind,
        ids: &[u32],
        apply: impl FnOnce(&mut Store, &[u32]) -> TaskbookResult<T>,
    ) -> TaskbookResult<T> {
        let mut store = self.storage.load(kind)?;
        let ids = validate_ids(&store, kind, ids)?;
        let result = apply(&mut store, &ids)?;
        self.storage.save(kind, &store)?;
        Ok(result)
    }

    fn toggle(
        &self,
        ids: &[u32],
        mut flip: impl FnMut(&mut Item) -> Option<bool>,
    ) -> TaskbookResult<Toggled> {
        self.update(StoreKind::Active, ids, |store, ids| {
            let mut outcome = Toggled::default();
            for &id in ids {
                let Some(item) = store.get_mut(&id) else { continue };
                match flip(item) {
                    Some(true) => outcome.on.push(id),
                    Some(false) => outcome.off.push(id),
                    None => outcome.skipped.push(id),
                }
            }
            Ok(outcome)
        })
    }

    fn for_items(
        &self,
        ids: &[u32],
        mut change: impl FnMut(&mut Item),
    ) -> TaskbookResult<Vec<u32>> {
        self.update(StoreKind::Active, ids, |store, ids| {
            for id in ids {
                if let Some(item) = store.get_mut(id) {
                    change(item);
                }
            }
            Ok(ids.to_vec())
        })
    }

    /// Applies `change` to the tasks among `ids`; notes are skipped.
    fn for_tasks(
        &self,
        ids: &[u32],
        mut change: impl FnMut(&Item, &mut TaskState),
    ) -> TaskbookResult<Applied> {
        self.update(StoreKind::Active, ids, |store, ids| {
            let mut applied = Applied::default();
            for &id in ids {
                let Some(item) = store.get_mut(&id) else { continue };
                let snapshot = item.clone();
                match item.task_mut() {
                    Some(task) => {
                        change(&snapshot, task);
                        applied.affected.push(id);
                    }
                    None => applied.skipped.push(id),
                }
            }
            Ok(applied)
        })
    }

    // ========================================================================
    // Create / edit
    // ========================================================================

    fn create(&self, words: &[String], task: bool) -> TaskbookResult<Entry> {
        let new_item = NewItem::parse(words)?;
        let kind = if task {
            ItemKind::Task(TaskState {
                priority: new_item.priority,
                deadline: new_item.deadline,
                ..TaskState::default()
            })
        } else {
            ItemKind::Note
        };

        let mut item = Item::new(
            kind,
            new_item.description,
            new_item.boards,
            self.clock.now_millis(),
            self.clock.today(),
        );
        item.is_bug = new_item.is_bug;

        let mut store = self.storage.load(StoreKind::Active)?;
        let id = next_id(&store);
        store.insert(id, item.clone());
        self.storage.save(StoreKind::Active, &store)?;

        info!("event=item_create id={} task={}", id, task);
        Ok(Entry {
            key: ItemKey::active(id),
            item,
        })
    }

    pub fn create_task(&self, words: &[String]) -> TaskbookResult<Entry> {
        self.create(words, true)
    }

    pub fn create_note(&self, words: &[String]) -> TaskbookResult<Entry> {
        self.create(words, false)
    }

    pub fn edit_description(&self, id: u32, description: &str) -> TaskbookResult<u32> {
        let description = description.trim();
        if description.is_empty() {
            return Err(TaskbookError::MissingInput("description"));
        }
        self.for_items(&[id], |item| item.description = description.to_string())?;
        Ok(id)
    }

    // ========================================================================
    // Archive
    // ========================================================================

    fn transfer(&self, from: StoreKind, to: StoreKind, ids: &[u32]) -> TaskbookResult<Vec<Moved>> {
        let mut source = self.storage.load(from)?;
        let ids = validate_ids(&source, from, ids)?;
        let mut target = self.storage.load(to)?;

        let mut moved = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(item) = source.remove(&id) {
                let new_id = next_id(&target);
                target.insert(new_id, item);
                moved.push(Moved {
                    from: ItemKey { store: from, id },
                    to: ItemKey { store: to, id: new_id },
                });
            }
        }

        // 先写目标，再写来源：中途失败时条目最多重复，不会丢失
        self.storage.save(to, &target)?;
        self.storage.save(from, &source)?;

        info!(
            "event=items_transfer from={} to={} count={}",
            from.label(),
            to.label(),
            moved.len()
        );
        Ok(moved)
    }

    /// Moves items to the archive under fresh archive ids.
    pub fn delete(&self, ids: &[u32]) -> TaskbookResult<Vec<Moved>> {
        self.transfer(StoreKind::Active, StoreKind::Archive, ids)
    }

    /// Moves archived items back under fresh active ids.
    pub fn restore(&self, ids: &[u32]) -> TaskbookResult<Vec<Moved>> {
        self.transfer(StoreKind::Archive, StoreKind::Active, ids)
    }

    /// Archives every completed task.
    pub fn clear_completed(&self) -> TaskbookResult<Vec<Moved>> {
        let store = self.storage.load(StoreKind::Active)?;
        let ids: Vec<u32> = store
            .iter()
            .filter(|(_, item)| item.is_complete())
            .map(|(id, _)| *id)
            .collect();

        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.delete(&ids)
    }

    /// Permanently removes items from `kind` once `confirm` agrees.
    ///
    /// Returns `None` when the confirmation is declined; nothing is written
    /// in that case.
    pub fn hard_delete(
        &self,
        kind: StoreKind,
        ids: &[u32],
        confirm: impl FnOnce(&str) -> bool,
    ) -> TaskbookResult<Option<Vec<ItemKey>>> {
        let mut store = self.storage.load(kind)?;
        let ids = validate_ids(&store, kind, ids)?;
        let keys: Vec<ItemKey> = ids.iter().map(|&id| ItemKey { store: kind, id }).collect();

        let listed: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        let message = format!(
            "Permanently delete {} item(s) from the {} store: {}?",
            keys.len(),
            kind.label(),
            listed.join(", ")
        );
        if !confirm(&message) {
            return Ok(None);
        }

        for id in &ids {
            store.remove(id);
        }
        self.storage.save(kind, &store)?;

        info!("event=items_hard_delete store={} count={}", kind.label(), keys.len());
        Ok(Some(keys))
    }

    // ========================================================================
    // Toggles
    // ========================================================================

    /// Checks pending/in-progress tasks and unchecks complete ones.
    pub fn check(&self, ids: &[u32]) -> TaskbookResult<Toggled> {
        let now = self.clock.now_millis();
        let today = self.clock.today();
        self.toggle(ids, |item| item.task_mut().map(|t| t.toggle_complete(now, today)))
    }

    /// Starts pending tasks and pauses running ones.
    pub fn begin(&self, ids: &[u32]) -> TaskbookResult<Toggled> {
        let now = self.clock.now_millis();
        self.toggle(ids, |item| item.task_mut().map(|t| t.toggle_progress(now)))
    }

    pub fn star(&self, ids: &[u32]) -> TaskbookResult<Toggled> {
        self.toggle(ids, |item| {
            item.is_starred = !item.is_starred;
            Some(item.is_starred)
        })
    }

    pub fn bug(&self, ids: &[u32]) -> TaskbookResult<Toggled> {
        self.toggle(ids, |item| {
            item.is_bug = !item.is_bug;
            Some(item.is_bug)
        })
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    pub fn set_priority(&self, ids: &[u32], priority: Priority) -> TaskbookResult<Applied> {
        self.for_tasks(ids, |_, task| task.priority = priority)
    }

    pub fn add_boards(&self, ids: &[u32], boards: &[String]) -> TaskbookResult<Vec<u32>> {
        let boards = normalize_boards(boards)?;
        self.for_items(ids, |item| item.add_boards(&boards))
    }

    /// Removes boards from items. Fails for the whole batch when any item
    /// would be left without a board.
    pub fn remove_boards(&self, ids: &[u32], boards: &[String]) -> TaskbookResult<Vec<u32>> {
        let boards = normalize_boards(boards)?;
        self.update(StoreKind::Active, ids, |store, ids| {
            for &id in ids {
                if store.get(&id).is_some_and(|item| item.boards_without(&boards).is_empty()) {
                    return Err(TaskbookError::LastBoard(id));
                }
            }
            for id in ids {
                if let Some(item) = store.get_mut(id) {
                    item.boards = item.boards_without(&boards);
                }
            }
            Ok(ids.to_vec())
        })
    }

    /// Replaces the board set of every item.
    pub fn move_boards(&self, ids: &[u32], boards: &[String]) -> TaskbookResult<Vec<String>> {
        let boards = normalize_boards(boards)?;
        self.for_items(ids, |item| item.boards = boards.clone())?;
        Ok(boards)
    }

    pub fn set_link(&self, ids: &[u32], link: &str) -> TaskbookResult<Vec<u32>> {
        let link = link.trim();
        if link.is_empty() {
            return Err(TaskbookError::MissingInput("link"));
        }
        self.for_items(ids, |item| item.link = Some(link.to_string()))
    }

    pub fn remove_link(&self, ids: &[u32]) -> TaskbookResult<Vec<u32>> {
        self.for_items(ids, |item| item.link = None)
    }

    pub fn view_link(&self, id: u32) -> TaskbookResult<Option<String>> {
        let store = self.storage.load(StoreKind::Active)?;
        validate_ids(&store, StoreKind::Active, &[id])?;
        Ok(store.get(&id).and_then(|item| item.link().map(str::to_string)))
    }

    /// Descriptions of `ids`, one per line, in the given order.
    pub fn copy_descriptions(&self, ids: &[u32]) -> TaskbookResult<String> {
        let store = self.storage.load(StoreKind::Active)?;
        let ids = validate_ids(&store, StoreKind::Active, ids)?;
        let lines: Vec<&str> = ids
            .iter()
            .filter_map(|id| store.get(id))
            .map(|item| item.description.as_str())
            .collect();
        Ok(lines.join("\n"))
    }

    // ========================================================================
    // Time tracking
    // ========================================================================

    pub fn add_time(&self, ids: &[u32], minutes: u64) -> TaskbookResult<Applied> {
        if minutes == 0 {
            return Err(TaskbookError::InvalidTime(minutes.to_string()));
        }
        let millis = minutes.saturating_mul(MINUTE_MILLIS);
        self.for_tasks(ids, |_, task| task.add_time(millis))
    }

    /// Removes time, clamping at zero. Reports what was actually removed
    /// from each task.
    pub fn remove_time(&self, ids: &[u32], minutes: u64) -> TaskbookResult<Vec<TimeRemoval>> {
        if minutes == 0 {
            return Err(TaskbookError::InvalidTime(minutes.to_string()));
        }
        let millis = minutes.saturating_mul(MINUTE_MILLIS);
        self.update(StoreKind::Active, ids, |store, ids| {
            Ok(ids
                .iter()
                .filter_map(|&id| {
                    let task = store.get_mut(&id)?.task_mut()?;
                    Some(TimeRemoval {
                        id,
                        removed: task.remove_time(millis),
                    })
                })
                .collect())
        })
    }

    pub fn clear_time(&self, ids: &[u32]) -> TaskbookResult<Applied> {
        self.for_tasks(ids, |_, task| task.clear_time())
    }

    /// Restarts running timers at the current time.
    pub fn clear_timer(&self, ids: &[u32]) -> TaskbookResult<Applied> {
        let now = self.clock.now_millis();
        self.for_tasks(ids, |_, task| {
            task.restart_timer(now);
        })
    }

    // ========================================================================
    // Deadlines
    // ========================================================================

    pub fn set_deadline(&self, ids: &[u32], date: NaiveDate) -> TaskbookResult<Applied> {
        self.for_tasks(ids, |_, task| task.deadline = Some(date))
    }

    pub fn remove_deadline(&self, ids: &[u32]) -> TaskbookResult<Applied> {
        self.for_tasks(ids, |_, task| task.deadline = None)
    }

    /// Moves deadlines back to each item's creation date.
    pub fn reset_deadline(&self, ids: &[u32]) -> TaskbookResult<Applied> {
        self.for_tasks(ids, |item, task| task.deadline = Some(item.date))
    }

    pub fn move_to_today(&self, ids: &[u32]) -> TaskbookResult<Applied> {
        let today = self.clock.today();
        self.set_deadline(ids, today)
    }

    // ========================================================================
    // Views
    // ========================================================================

    fn load_all(&self) -> TaskbookResult<(Store, Store)> {
        Ok((
            self.storage.load(StoreKind::Active)?,
            self.storage.load(StoreKind::Archive)?,
        ))
    }

    /// Runs `terms` through the query pipeline.
    fn query(&self, terms: &[String]) -> TaskbookResult<(Query, Vec<Entry>, Vec<String>)> {
        let (active, archive) = self.load_all()?;
        let known = known_boards([&active, &archive]);
        let query = Query::parse(terms, &known)?;
        let entries = filter::apply(filter::select(query.source, &active, &archive), &query);
        Ok((query, entries, known))
    }

    /// Active items grouped under every board.
    pub fn board_view(&self) -> TaskbookResult<Vec<Group>> {
        self.list(&[])
    }

    /// Items matching `terms`, grouped by board.
    pub fn list(&self, terms: &[String]) -> TaskbookResult<Vec<Group>> {
        let (query, entries, known) = self.query(terms)?;
        let boards = query.grouping_boards(&known);
        Ok(filter::group_by_board(&entries, &boards, self.show_completed))
    }

    /// Active items whose description contains any of `words`.
    pub fn find(&self, words: &[String]) -> TaskbookResult<Vec<Group>> {
        if words.is_empty() {
            return Err(TaskbookError::MissingInput("search terms"));
        }
        let active = self.storage.load(StoreKind::Active)?;
        let archive = Store::new();
        let entries = filter::find(filter::select(Default::default(), &active, &archive), words);
        Ok(filter::group_by_board(&entries, &known_boards([&active]), self.show_completed))
    }

    /// Active items grouped by creation date.
    pub fn timeline(&self) -> TaskbookResult<Vec<Group>> {
        let active = self.storage.load(StoreKind::Active)?;
        let entries = filter::select(Default::default(), &active, &Store::new());
        Ok(filter::group_by_date(&entries, DateField::Creation, self.show_completed))
    }

    /// Active tasks grouped by deadline.
    pub fn deadline_view(&self) -> TaskbookResult<Vec<Group>> {
        let active = self.storage.load(StoreKind::Active)?;
        let entries = filter::select(Default::default(), &active, &Store::new());
        Ok(filter::group_by_date(&entries, DateField::Deadline, self.show_completed))
    }

    /// Archived items grouped by creation date. Completed items are always
    /// shown here.
    pub fn archive_view(&self) -> TaskbookResult<Vec<Group>> {
        let archive = self.storage.load(StoreKind::Archive)?;
        let entries = filter::select(super::query::DataSource::Archive, &Store::new(), &archive);
        Ok(filter::group_by_date(&entries, DateField::Creation, true))
    }

    pub fn boards(&self) -> TaskbookResult<Vec<String>> {
        let active = self.storage.load(StoreKind::Active)?;
        Ok(known_boards([&active]))
    }

    /// Tasks matching `terms` as flat rows, sorted by the sort directive.
    pub fn table(&self, terms: &[String]) -> TaskbookResult<Vec<Entry>> {
        let (query, entries, _) = self.query(terms)?;
        let mut rows: Vec<Entry> = entries
            .into_iter()
            .filter(|e| e.item.is_task())
            .filter(|e| self.show_completed || !e.item.is_complete())
            .collect();

        if let Some(directive) = query.sort {
            filter::sort_entries(&mut rows, directive);
        }
        Ok(rows)
    }

    pub fn stats(&self) -> TaskbookResult<Stats> {
        let active = self.storage.load(StoreKind::Active)?;
        Ok(Stats::collect(active.values()))
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }
}
