pub mod item;
pub mod store;

pub use item::{
    BOARD_MARKER, DEFAULT_BOARD, Item, ItemKind, Priority, TaskState, TaskStatus, normalize_board,
};
pub use store::{
    ARCHIVE_ID_PREFIX, ID_MARKER, ItemKey, Store, StoreKind, allocate_id, known_boards, next_id,
    parse_id,
};
