use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::item::{DEFAULT_BOARD, Item};
use crate::error::{TaskbookError, TaskbookResult};

/// id -> item，按 id 升序
pub type Store = BTreeMap<u32, Item>;

/// 归档 id 的显示前缀
pub const ARCHIVE_ID_PREFIX: char = 'a';
/// 命令行中标记 id 的前缀
pub const ID_MARKER: char = '@';

/// 存储类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StoreKind {
    /// 活动存储 (storage/storage.json)
    Active,
    /// 归档存储 (archive/archive.json)
    Archive,
}

impl StoreKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            StoreKind::Active => "storage",
            StoreKind::Archive => "archive",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            StoreKind::Active => "storage.json",
            StoreKind::Archive => "archive.json",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StoreKind::Active => "active",
            StoreKind::Archive => "archive",
        }
    }
}

/// An id qualified by the store it lives in.
///
/// Archive ids render with the `a` prefix so they never alias active ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemKey {
    pub store: StoreKind,
    pub id: u32,
}

impl ItemKey {
    pub fn active(id: u32) -> Self {
        Self {
            store: StoreKind::Active,
            id,
        }
    }

    pub fn archive(id: u32) -> Self {
        Self {
            store: StoreKind::Archive,
            id,
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.store {
            StoreKind::Active => write!(f, "{}", self.id),
            StoreKind::Archive => write!(f, "{}{}", ARCHIVE_ID_PREFIX, self.id),
        }
    }
}

/// Returns the smallest positive integer missing from `existing`.
pub fn allocate_id(existing: &BTreeSet<u32>) -> u32 {
    lowest_gap(existing.iter().copied())
}

/// Next free id of a store.
pub fn next_id(store: &Store) -> u32 {
    lowest_gap(store.keys().copied())
}

// `sorted` 必须升序
fn lowest_gap(sorted: impl Iterator<Item = u32>) -> u32 {
    let mut candidate = 1;
    for id in sorted {
        if id < candidate {
            continue;
        }
        if id > candidate {
            break;
        }
        candidate += 1;
    }
    candidate
}

/// Parses a user-supplied id for `store`.
///
/// Accepts `3` and `@3`; archive targets also accept `a3`. Anything else is
/// reported as an unknown id.
pub fn parse_id(raw: &str, store: StoreKind) -> TaskbookResult<u32> {
    let trimmed = raw.trim();
    let unmarked = trimmed.strip_prefix(ID_MARKER).unwrap_or(trimmed);
    let digits = match store {
        StoreKind::Active => unmarked,
        StoreKind::Archive => unmarked.strip_prefix(ARCHIVE_ID_PREFIX).unwrap_or(unmarked),
    };

    digits
        .parse::<u32>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| TaskbookError::UnknownId(trimmed.to_string()))
}

/// All board names in use, default board first, then in id order.
pub fn known_boards<'a>(stores: impl IntoIterator<Item = &'a Store>) -> Vec<String> {
    let mut boards = vec![DEFAULT_BOARD.to_string()];
    for store in stores {
        for item in store.values() {
            for board in &item.boards {
                if !boards.contains(board) {
                    boards.push(board.clone());
                }
            }
        }
    }
    boards
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::item::ItemKind;
    use chrono::NaiveDate;

    fn set(ids: &[u32]) -> BTreeSet<u32> {
        ids.iter().copied().collect()
    }

    fn note(boards: &[&str]) -> Item {
        Item::new(
            ItemKind::Note,
            "n".to_string(),
            boards.iter().map(|b| b.to_string()).collect(),
            0,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        )
    }

    #[test]
    fn test_allocate_empty_set() {
        assert_eq!(allocate_id(&set(&[])), 1);
    }

    #[test]
    fn test_allocate_contiguous_set() {
        assert_eq!(allocate_id(&set(&[1, 2, 3, 4])), 5);
    }

    #[test]
    fn test_allocate_fills_lowest_gap() {
        assert_eq!(allocate_id(&set(&[1, 2, 4, 5])), 3);
        assert_eq!(allocate_id(&set(&[2, 3])), 1);
        assert_eq!(allocate_id(&set(&[1, 3, 6])), 2);
        assert_eq!(allocate_id(&set(&[0, 1, 2])), 3);
    }

    #[test]
    fn test_next_id_matches_allocate() {
        let mut store = Store::new();
        store.insert(1, note(&[]));
        store.insert(3, note(&[]));
        assert_eq!(next_id(&store), 2);
        store.insert(2, note(&[]));
        assert_eq!(next_id(&store), 4);
    }

    #[test]
    fn test_parse_id_forms() {
        assert_eq!(parse_id("3", StoreKind::Active).unwrap(), 3);
        assert_eq!(parse_id("@12", StoreKind::Active).unwrap(), 12);
        assert_eq!(parse_id("a4", StoreKind::Archive).unwrap(), 4);
        assert_eq!(parse_id("4", StoreKind::Archive).unwrap(), 4);
        assert!(matches!(
            parse_id("a4", StoreKind::Active),
            Err(TaskbookError::UnknownId(id)) if id == "a4"
        ));
        assert!(parse_id("0", StoreKind::Active).is_err());
        assert!(parse_id("x", StoreKind::Active).is_err());
    }

    #[test]
    fn test_item_key_display() {
        assert_eq!(ItemKey::active(3).to_string(), "3");
        assert_eq!(ItemKey::archive(3).to_string(), "a3");
        assert_ne!(ItemKey::active(3), ItemKey::archive(3));
    }

    #[test]
    fn test_known_boards_always_include_default() {
        let mut active = Store::new();
        active.insert(2, note(&["@work"]));
        active.insert(1, note(&["@home", "@work"]));
        let mut archive = Store::new();
        archive.insert(1, note(&["@old"]));

        assert_eq!(
            known_boards([&active, &archive]),
            vec![DEFAULT_BOARD, "@home", "@work", "@old"]
        );
        assert_eq!(known_boards([&Store::new()]), vec![DEFAULT_BOARD]);
    }
}
