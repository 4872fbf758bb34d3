//! Free-form filter terms.
//!
//! Every term is classified exactly once, first match wins:
//!
//! 1. board selector (`work`, `@work`, `myboard`, or `@a-@b` for "both")
//! 2. attribute predicate (`starred`, `bug`, `done`, `progress`, ...)
//! 3. date range (`deadline:2024/01/01`, `creation:2024/01/01-2024/01/31`)
//! 4. data source (`source:active|archive|all`)
//! 5. sort directive (`sort:<column>`, `isort:<column>`)
//!
//! A board whose name collides with an attribute keyword is treated as a
//! board. Terms matching none of the above are ignored.

use chrono::NaiveDate;

use crate::error::{TaskbookError, TaskbookResult};
use crate::models::{BOARD_MARKER, DEFAULT_BOARD, Item, StoreKind};
use crate::models::item::DEFAULT_BOARD_ALIAS;

pub const DEADLINE_PREFIX: &str = "deadline:";
pub const CREATION_PREFIX: &str = "creation:";
pub const SOURCE_PREFIX: &str = "source:";
pub const SORT_PREFIX: &str = "sort:";
pub const INVERSE_SORT_PREFIX: &str = "isort:";

/// `@a-@b`：同时属于两个看板
const LINK_SEPARATOR: &str = "-@";
const RANGE_SEPARATOR: char = '-';
const DATE_SEPARATOR: char = '/';

/// 属性过滤条件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    Starred,
    Bug,
    Complete,
    InProgress,
    Pending,
    Task,
    Note,
}

impl Attribute {
    pub fn from_term(term: &str) -> Option<Self> {
        match term.to_lowercase().as_str() {
            "star" | "starred" => Some(Attribute::Starred),
            "bug" | "bugs" | "isbug" => Some(Attribute::Bug),
            "done" | "checked" | "complete" => Some(Attribute::Complete),
            "progress" | "started" | "begun" | "in-progress" => Some(Attribute::InProgress),
            "pending" | "unchecked" | "incomplete" => Some(Attribute::Pending),
            "todo" | "task" | "tasks" => Some(Attribute::Task),
            "note" | "notes" => Some(Attribute::Note),
            _ => None,
        }
    }

    pub fn matches(self, item: &Item) -> bool {
        match self {
            Attribute::Starred => item.is_starred,
            Attribute::Bug => item.is_bug,
            Attribute::Complete => item.is_complete(),
            Attribute::InProgress => item.in_progress(),
            Attribute::Pending => item.task().is_some_and(|t| !t.is_complete),
            Attribute::Task => item.is_task(),
            Attribute::Note => !item.is_task(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    Deadline,
    Creation,
}

impl DateField {
    pub fn of(self, item: &Item) -> Option<NaiveDate> {
        match self {
            DateField::Deadline => item.deadline(),
            DateField::Creation => Some(item.date),
        }
    }
}

/// Inclusive date range over one date field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub field: DateField,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Parses `YYYY/MM/DD` or `YYYY/MM/DD-YYYY/MM/DD`; endpoints may come in
    /// either order.
    pub fn parse(field: DateField, raw: &str) -> TaskbookResult<Self> {
        let parts: Vec<&str> = raw.split(RANGE_SEPARATOR).collect();
        let (start, end) = match parts.as_slice() {
            [single] => {
                let date = parse_date(single)?;
                (date, date)
            }
            [first, second] => {
                let a = parse_date(first)?;
                let b = parse_date(second)?;
                (a.min(b), a.max(b))
            }
            _ => return Err(TaskbookError::InvalidDate(raw.to_string())),
        };

        Ok(Self { field, start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Items without the date (notes, tasks with no deadline) never match.
    pub fn matches(&self, item: &Item) -> bool {
        self.field.of(item).is_some_and(|d| self.contains(d))
    }
}

/// Parses a `YYYY/MM/DD` date.
pub fn parse_date(raw: &str) -> TaskbookResult<NaiveDate> {
    let invalid = || TaskbookError::InvalidDate(raw.to_string());
    let parts: Vec<&str> = raw.trim().split(DATE_SEPARATOR).collect();
    if parts.len() != 3 {
        return Err(invalid());
    }

    let year = parts[0].parse::<i32>().map_err(|_| invalid())?;
    let month = parts[1].parse::<u32>().map_err(|_| invalid())?;
    let day = parts[2].parse::<u32>().map_err(|_| invalid())?;

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

/// 查询的数据来源
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DataSource {
    #[default]
    Active,
    Archive,
    All,
}

impl DataSource {
    pub fn parse(raw: &str) -> TaskbookResult<Self> {
        match raw.to_lowercase().as_str() {
            "active" | "storage" => Ok(DataSource::Active),
            "archive" | "archived" => Ok(DataSource::Archive),
            "all" | "both" => Ok(DataSource::All),
            _ => Err(TaskbookError::InvalidDataSource(raw.to_string())),
        }
    }

    pub fn stores(self) -> &'static [StoreKind] {
        match self {
            DataSource::Active => &[StoreKind::Active],
            DataSource::Archive => &[StoreKind::Archive],
            DataSource::All => &[StoreKind::Active, StoreKind::Archive],
        }
    }
}

/// 表格视图可排序的列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Id,
    Description,
    Boards,
    Deadline,
    Completed,
    Time,
}

impl SortColumn {
    pub fn from_term(term: &str) -> Option<Self> {
        match term.to_lowercase().as_str() {
            "id" => Some(SortColumn::Id),
            "description" | "desc" => Some(SortColumn::Description),
            "boards" | "board" => Some(SortColumn::Boards),
            "deadline" => Some(SortColumn::Deadline),
            "completed" | "completion" => Some(SortColumn::Completed),
            "time" => Some(SortColumn::Time),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortDirective {
    pub column: SortColumn,
    pub descending: bool,
}

/// 单个词条的分类结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Board(String),
    LinkedBoards(String, String),
    Attribute(Attribute),
    Date(DateRange),
    Source(DataSource),
    Sort(SortDirective),
    Ignored,
}

/// Classifies one term against the known board names.
pub fn classify(term: &str, known_boards: &[String]) -> TaskbookResult<Term> {
    if let Some(board) = resolve_board(term, known_boards) {
        return Ok(Term::Board(board));
    }

    if term.starts_with(BOARD_MARKER) {
        if let Some((first, second)) = term.split_once(LINK_SEPARATOR) {
            if first.len() > 1 && !second.is_empty() {
                return Ok(Term::LinkedBoards(
                    first.to_string(),
                    format!("{}{}", BOARD_MARKER, second),
                ));
            }
        }
    }

    if let Some(attribute) = Attribute::from_term(term) {
        return Ok(Term::Attribute(attribute));
    }

    if let Some(raw) = strip_prefix_ignore_case(term, DEADLINE_PREFIX) {
        return DateRange::parse(DateField::Deadline, raw).map(Term::Date);
    }
    if let Some(raw) = strip_prefix_ignore_case(term, CREATION_PREFIX) {
        return DateRange::parse(DateField::Creation, raw).map(Term::Date);
    }

    if let Some(raw) = strip_prefix_ignore_case(term, SOURCE_PREFIX) {
        return DataSource::parse(raw).map(Term::Source);
    }

    for (prefix, descending) in [(SORT_PREFIX, false), (INVERSE_SORT_PREFIX, true)] {
        if let Some(raw) = strip_prefix_ignore_case(term, prefix) {
            return Ok(SortColumn::from_term(raw)
                .map(|column| Term::Sort(SortDirective { column, descending }))
                .unwrap_or(Term::Ignored));
        }
    }

    Ok(Term::Ignored)
}

fn resolve_board(term: &str, known_boards: &[String]) -> Option<String> {
    if term.eq_ignore_ascii_case(DEFAULT_BOARD_ALIAS) {
        return Some(DEFAULT_BOARD.to_string());
    }
    if known_boards.iter().any(|b| b == term) {
        return Some(term.to_string());
    }
    let marked = format!("{}{}", BOARD_MARKER, term);
    known_boards.iter().find(|b| **b == marked).cloned()
}

fn strip_prefix_ignore_case<'a>(term: &'a str, prefix: &str) -> Option<&'a str> {
    let head = term.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&term[prefix.len()..])
    } else {
        None
    }
}

/// A parsed list of filter terms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    /// OR 组：属于其中任一看板即匹配
    pub boards: Vec<String>,
    /// AND 组：必须同时属于全部看板
    pub linked_boards: Vec<String>,
    pub attributes: Vec<Attribute>,
    pub date_range: Option<DateRange>,
    pub source: DataSource,
    pub sort: Option<SortDirective>,
}

impl Query {
    /// Classifies `terms`. Only the first date range, source and sort
    /// directive are kept.
    pub fn parse(terms: &[String], known_boards: &[String]) -> TaskbookResult<Self> {
        let mut query = Query::default();
        let mut source = None;

        for term in terms {
            match classify(term, known_boards)? {
                Term::Board(board) => push_unique(&mut query.boards, board),
                Term::LinkedBoards(first, second) => {
                    push_unique(&mut query.linked_boards, first);
                    push_unique(&mut query.linked_boards, second);
                }
                Term::Attribute(attribute) => {
                    if !query.attributes.contains(&attribute) {
                        query.attributes.push(attribute);
                    }
                }
                Term::Date(range) => {
                    query.date_range.get_or_insert(range);
                }
                Term::Source(selected) => {
                    source.get_or_insert(selected);
                }
                Term::Sort(directive) => {
                    query.sort.get_or_insert(directive);
                }
                Term::Ignored => {}
            }
        }

        query.source = source.unwrap_or_default();
        Ok(query)
    }

    pub fn has_board_selector(&self) -> bool {
        !self.boards.is_empty() || !self.linked_boards.is_empty()
    }

    /// Item passes the board selectors: it shares a board with the OR group,
    /// or holds every board of the AND group. No selector matches everything.
    pub fn matches_boards(&self, item: &Item) -> bool {
        if !self.has_board_selector() {
            return true;
        }
        let in_any = self.boards.iter().any(|b| item.has_board(b));
        let in_all = !self.linked_boards.is_empty()
            && self.linked_boards.iter().all(|b| item.has_board(b));
        in_any || in_all
    }

    /// Boards to group results under.
    pub fn grouping_boards(&self, known_boards: &[String]) -> Vec<String> {
        if !self.has_board_selector() {
            return known_boards.to_vec();
        }
        let mut boards = self.boards.clone();
        for board in &self.linked_boards {
            push_unique(&mut boards, board.clone());
        }
        boards
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known() -> Vec<String> {
        vec![
            DEFAULT_BOARD.to_string(),
            "@work".to_string(),
            "@home".to_string(),
            "@bug".to_string(),
        ]
    }

    fn terms(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_board_with_or_without_marker() {
        let known = known();
        assert_eq!(classify("work", &known).unwrap(), Term::Board("@work".to_string()));
        assert_eq!(classify("@work", &known).unwrap(), Term::Board("@work".to_string()));
        assert_eq!(
            classify("myboard", &known).unwrap(),
            Term::Board(DEFAULT_BOARD.to_string())
        );
    }

    #[test]
    fn test_board_name_wins_over_attribute_keyword() {
        // 看板 @bug 存在时 "bug" 选择看板而不是属性
        assert_eq!(classify("bug", &known()).unwrap(), Term::Board("@bug".to_string()));

        let without_bug_board = vec![DEFAULT_BOARD.to_string()];
        assert_eq!(
            classify("bug", &without_bug_board).unwrap(),
            Term::Attribute(Attribute::Bug)
        );
    }

    #[test]
    fn test_linked_boards() {
        assert_eq!(
            classify("@work-@home", &known()).unwrap(),
            Term::LinkedBoards("@work".to_string(), "@home".to_string())
        );
    }

    #[test]
    fn test_attribute_synonyms() {
        for (term, expected) in [
            ("starred", Attribute::Starred),
            ("checked", Attribute::Complete),
            ("begun", Attribute::InProgress),
            ("Incomplete", Attribute::Pending),
            ("todo", Attribute::Task),
            ("notes", Attribute::Note),
        ] {
            assert_eq!(Attribute::from_term(term), Some(expected), "term {term}");
        }
        assert_eq!(Attribute::from_term("whatever"), None);
    }

    #[test]
    fn test_unknown_terms_are_ignored() {
        assert_eq!(classify("banana", &known()).unwrap(), Term::Ignored);
        assert_eq!(classify("sort:colour", &known()).unwrap(), Term::Ignored);
    }

    #[test]
    fn test_date_range_sorts_endpoints() {
        let range = DateRange::parse(DateField::Deadline, "2024/01/31-2024/01/01").unwrap();
        assert_eq!(range.start, day(2024, 1, 1));
        assert_eq!(range.end, day(2024, 1, 31));
        assert!(range.contains(day(2024, 1, 1)));
        assert!(range.contains(day(2024, 1, 31)));
        assert!(!range.contains(day(2024, 2, 1)));
    }

    #[test]
    fn test_single_date_is_exact_match() {
        match classify("creation:2024/3/5", &known()).unwrap() {
            Term::Date(range) => {
                assert_eq!(range.field, DateField::Creation);
                assert_eq!(range.start, range.end);
                assert_eq!(range.start, day(2024, 3, 5));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_invalid_dates() {
        for raw in ["2024/01", "2024-01-01", "2024/13/01", "2024/02/30", "a/b/c"] {
            assert!(
                matches!(parse_date(raw), Err(TaskbookError::InvalidDate(_))),
                "{raw} should be rejected"
            );
        }
        assert!(classify("deadline:2024/01/01-2024/01/02-2024/01/03", &known()).is_err());
    }

    #[test]
    fn test_data_source() {
        assert_eq!(
            classify("source:archive", &known()).unwrap(),
            Term::Source(DataSource::Archive)
        );
        assert!(matches!(
            classify("source:cloud", &known()),
            Err(TaskbookError::InvalidDataSource(s)) if s == "cloud"
        ));
    }

    #[test]
    fn test_sort_directive() {
        assert_eq!(
            classify("isort:deadline", &known()).unwrap(),
            Term::Sort(SortDirective {
                column: SortColumn::Deadline,
                descending: true
            })
        );
    }

    #[test]
    fn test_query_parse_collects_groups() {
        let query = Query::parse(
            &terms(&["work", "@work-@home", "pending", "deadline:2024/01/01", "sort:id", "x"]),
            &known(),
        )
        .unwrap();

        assert_eq!(query.boards, vec!["@work"]);
        assert_eq!(query.linked_boards, vec!["@work", "@home"]);
        assert_eq!(query.attributes, vec![Attribute::Pending]);
        assert!(query.date_range.is_some());
        assert_eq!(query.source, DataSource::Active);
        assert_eq!(query.sort.map(|s| s.column), Some(SortColumn::Id));
        assert_eq!(query.grouping_boards(&known()), vec!["@work", "@home"]);
    }

    #[test]
    fn test_first_date_term_wins() {
        let query = Query::parse(
            &terms(&["deadline:2024/01/01", "creation:2023/01/01"]),
            &known(),
        )
        .unwrap();
        assert_eq!(query.date_range.unwrap().field, DateField::Deadline);
    }

    #[test]
    fn test_no_selector_groups_by_all_known_boards() {
        let query = Query::parse(&terms(&["starred"]), &known()).unwrap();
        assert!(!query.has_board_selector());
        assert_eq!(query.grouping_boards(&known()), known());
    }
}
