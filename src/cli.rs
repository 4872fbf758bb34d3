use anyhow::{Result, bail};
use log::{debug, warn};
use std::io::{self, BufRead, Write};

use crate::config::{self, Config};
use crate::engine::{Applied, Taskbook, Toggled, parse_date, parse_minutes};
use crate::error::TaskbookError;
use crate::fs::Storage;
use crate::logging;
use crate::models::{ARCHIVE_ID_PREFIX, BOARD_MARKER, ID_MARKER, Priority, StoreKind, parse_id};
use crate::render;
use crate::sync;

/// 处理 CLI 命令
pub fn handle_cli(args: &[String]) -> Result<()> {
    let command = args.get(1).map(String::as_str).unwrap_or("");
    let input = args.get(2..).unwrap_or(&[]);

    // 不需要打开数据目录的命令
    match command {
        "--help" | "-h" => {
            print_help();
            return Ok(());
        }
        "--version" | "-v" | "-V" => {
            print_version();
            return Ok(());
        }
        "--initDir" => {
            let path = config::get_config_path()?;
            let config = config::set_taskbook_directory(&path, &input.join(" "))?;
            println!("✓ Taskbook directory set to: {}", config.taskbook_directory);
            return Ok(());
        }
        _ => {}
    }

    let config = config::load_config()?;
    let root = config.store_root()?;
    if let Err(e) = logging::init_logging(&config.log_level, &Storage::log_dir(&root)) {
        eprintln!("Warning: logging disabled: {}", e);
    }
    let shown = if command.is_empty() { "board" } else { command };
    debug!("event=command_start command={}", shown);

    if command == "--config" {
        config::show_config(&config::get_config_path()?, &config);
        match logging::logging_status() {
            Some((level, dir)) => {
                println!("  logging:                 {} -> {}", level, dir.display())
            }
            None => println!("  logging:                 disabled"),
        }
        return Ok(());
    }

    let book = Taskbook::open(&config)?;
    dispatch(&book, &config, command, input)
}

fn dispatch(book: &Taskbook, config: &Config, command: &str, input: &[String]) -> Result<()> {
    match command {
        // 没有参数：看板视图
        "" => {
            let groups = book.board_view()?;
            show_groups(book, config, &groups, false)?;
        }

        // ====================================================================
        // Create / edit
        // ====================================================================
        "--task" | "-t" => {
            let created = book.create_task(input)?;
            println!("✓ Created task: {}", created.key);
        }
        "--note" | "-n" => {
            let created = book.create_note(input)?;
            println!("✓ Created note: {}", created.key);
        }
        "--edit" | "-e" => {
            let (ids, words) = split_marked(input)?;
            let [id] = ids.as_slice() else {
                bail!("--edit takes exactly one @id");
            };
            let id = book.edit_description(*id, &words.join(" "))?;
            println!("✓ Updated description of item: {}", id);
        }

        // ====================================================================
        // Archive
        // ====================================================================
        "--delete" | "-d" => {
            for moved in book.delete(&plain_ids(input, StoreKind::Active)?)? {
                println!("✓ Deleted item: {} (archived as {})", moved.from, moved.to);
            }
        }
        "--restore" | "-r" => {
            for moved in book.restore(&plain_ids(input, StoreKind::Archive)?)? {
                println!("✓ Restored item: {} (now {})", moved.from, moved.to);
            }
        }
        "--hardDelete" | "-D" => {
            let store = hard_delete_target(input)?;
            let ids = plain_ids(input, store)?;
            match book.hard_delete(store, &ids, confirm)? {
                Some(keys) => {
                    let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
                    println!("✓ Permanently deleted: {}", keys.join(", "));
                }
                None => println!("Nothing deleted."),
            }
        }
        "--clear" => {
            let moved = book.clear_completed()?;
            if moved.is_empty() {
                println!("No checked tasks to clear.");
            } else {
                let ids: Vec<u32> = moved.iter().map(|m| m.from.id).collect();
                print_ids("Deleted all checked items", &ids);
            }
        }

        // ====================================================================
        // Toggles
        // ====================================================================
        "--check" | "-c" => {
            let outcome = book.check(&plain_ids(input, StoreKind::Active)?)?;
            report_toggle(&outcome, "Checked task", "Unchecked task");
        }
        "--begin" | "-b" => {
            let outcome = book.begin(&plain_ids(input, StoreKind::Active)?)?;
            report_toggle(&outcome, "Started task", "Paused task");
        }
        "--star" | "-s" => {
            let outcome = book.star(&plain_ids(input, StoreKind::Active)?)?;
            report_toggle(&outcome, "Starred item", "Unstarred item");
        }
        "--bug" => {
            let outcome = book.bug(&plain_ids(input, StoreKind::Active)?)?;
            report_toggle(&outcome, "Marked as bug", "Unmarked as bug");
        }

        // ====================================================================
        // Attributes
        // ====================================================================
        "--priority" | "-p" => {
            let (ids, rest) = split_marked(input)?;
            let level = rest.first().ok_or(TaskbookError::MissingInput("priority"))?;
            let priority: Priority = level.parse()?;
            let applied = book.set_priority(&ids, priority)?;
            report_applied(&applied, &format!("Updated priority to {}", u8::from(priority)));
        }
        "--addBoard" => {
            let (ids, boards) = split_boards(input)?;
            let ids = book.add_boards(&ids, &boards)?;
            print_ids(&format!("Added {} to item", boards.join(" ")), &ids);
        }
        "--removeBoard" => {
            let (ids, boards) = split_boards(input)?;
            let ids = book.remove_boards(&ids, &boards)?;
            print_ids(&format!("Removed {} from item", boards.join(" ")), &ids);
        }
        "--move" | "-m" => {
            let (ids, boards) = split_marked(input)?;
            let boards = book.move_boards(&ids, &boards)?;
            print_ids(&format!("Moved to {}", boards.join(", ")), &ids);
        }
        "--setLink" => {
            let (ids, rest) = split_marked(input)?;
            let link = rest.first().ok_or(TaskbookError::MissingInput("link"))?;
            let ids = book.set_link(&ids, link)?;
            print_ids("Set link of item", &ids);
        }
        "--removeLink" => {
            let ids = book.remove_link(&plain_ids(input, StoreKind::Active)?)?;
            print_ids("Removed link of item", &ids);
        }
        "--viewLink" => {
            let ids = plain_ids(input, StoreKind::Active)?;
            let id = ids.first().copied().ok_or(TaskbookError::MissingInput("id"))?;
            match book.view_link(id)? {
                Some(link) => println!("{}", link),
                None => println!("Item {} has no link.", id),
            }
        }
        "--copy" | "-y" => {
            let text = book.copy_descriptions(&plain_ids(input, StoreKind::Active)?)?;
            copy_to_clipboard(&text)?;
        }

        // ====================================================================
        // Time tracking
        // ====================================================================
        "--addTime" => {
            let (ids, rest) = split_marked(input)?;
            let minutes = parse_minutes(&rest)?;
            let applied = book.add_time(&ids, minutes)?;
            report_applied(&applied, &format!("Added {} minute(s) to task", minutes));
        }
        "--removeTime" => {
            let (ids, rest) = split_marked(input)?;
            let minutes = parse_minutes(&rest)?;
            for removal in book.remove_time(&ids, minutes)? {
                println!(
                    "✓ Removed {} from task: {}",
                    render::format_duration(removal.removed),
                    removal.id
                );
            }
        }
        "--clearTime" => {
            let applied = book.clear_time(&plain_ids(input, StoreKind::Active)?)?;
            report_applied(&applied, "Cleared total time of task");
        }
        "--clearTimer" => {
            let applied = book.clear_timer(&plain_ids(input, StoreKind::Active)?)?;
            report_applied(&applied, "Cleared timer of task");
        }

        // ====================================================================
        // Deadlines
        // ====================================================================
        "--moveToDate" => {
            let (ids, rest) = split_marked(input)?;
            let raw = rest.first().ok_or(TaskbookError::MissingInput("date"))?;
            let date = parse_date(raw)?;
            let applied = book.set_deadline(&ids, date)?;
            report_applied(&applied, &format!("Moved deadline to {}", date.format("%Y/%m/%d")));
        }
        "--removeDeadline" => {
            let applied = book.remove_deadline(&plain_ids(input, StoreKind::Active)?)?;
            report_applied(&applied, "Removed deadline of task");
        }
        "--resetDate" => {
            let applied = book.reset_deadline(&plain_ids(input, StoreKind::Active)?)?;
            report_applied(&applied, "Reset deadline to creation date of task");
        }
        "--moveToToday" => {
            let applied = book.move_to_today(&plain_ids(input, StoreKind::Active)?)?;
            report_applied(&applied, "Moved deadline to today of task");
        }

        // ====================================================================
        // Views
        // ====================================================================
        "--list" | "-l" => {
            let groups = book.list(input)?;
            show_groups(book, config, &groups, false)?;
        }
        "--find" | "-f" => {
            let groups = book.find(input)?;
            show_groups(book, config, &groups, false)?;
        }
        "--timeline" | "-i" => {
            let groups = book.timeline()?;
            show_groups(book, config, &groups, true)?;
        }
        "--deadlines" => {
            let groups = book.deadline_view()?;
            show_groups(book, config, &groups, true)?;
        }
        "--archive" | "-a" => {
            let groups = book.archive_view()?;
            let today = chrono::Local::now().date_naive();
            let palette = render::Palette::detect();
            print!("{}", render::render_groups(&groups, book.now_millis(), today, true, palette));
        }
        "--boards" => {
            for board in book.boards()? {
                println!("  {}", board);
            }
        }
        "--table" => {
            let rows = book.table(input)?;
            print!("{}", render::render_table(&rows, book.now_millis()));
            if config.display_progress_overview {
                let stats = crate::engine::Stats::collect(rows.iter().map(|r| &r.item));
                print!("{}", render::render_stats(&stats, render::Palette::detect()));
            }
        }

        "--save" => {
            sync::save_remote(book.storage().root())?;
            println!("✓ Pushed changes to remote");
        }

        _ => bail!("unknown command `{}` (run 'tb --help' for usage)", command),
    }
    Ok(())
}

// ============================================================================
// Argument helpers
// ============================================================================

/// Ids given without markers: `--check 1 2 @3`.
fn plain_ids(input: &[String], store: StoreKind) -> Result<Vec<u32>, TaskbookError> {
    if input.is_empty() {
        return Err(TaskbookError::MissingInput("id"));
    }
    input.iter().map(|raw| parse_id(raw, store)).collect()
}

/// `@`-marked ids and the remaining words: `--addTime @3 @5 40`.
fn split_marked(input: &[String]) -> Result<(Vec<u32>, Vec<String>), TaskbookError> {
    let mut ids = Vec::new();
    let mut rest = Vec::new();
    for word in input {
        if word.starts_with(ID_MARKER) && word.len() > 1 {
            ids.push(parse_id(word, StoreKind::Active)?);
        } else {
            rest.push(word.clone());
        }
    }
    if ids.is_empty() {
        return Err(TaskbookError::MissingInput("@id"));
    }
    Ok((ids, rest))
}

/// Plain ids and `@`-marked boards: `--addBoard 2 @work`.
fn split_boards(input: &[String]) -> Result<(Vec<u32>, Vec<String>), TaskbookError> {
    let (boards, ids): (Vec<&String>, Vec<&String>) =
        input.iter().partition(|w| w.starts_with(BOARD_MARKER));
    let ids = ids
        .into_iter()
        .map(|raw| parse_id(raw, StoreKind::Active))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((ids, boards.into_iter().cloned().collect()))
}

/// `--hardDelete a3` targets the archive, plain ids the active store. A
/// batch mixing both is rejected.
fn hard_delete_target(input: &[String]) -> Result<StoreKind> {
    let is_archived = |raw: &String| {
        raw.trim()
            .trim_start_matches(ID_MARKER)
            .starts_with(ARCHIVE_ID_PREFIX)
    };

    let archived = input.iter().filter(|raw| is_archived(raw)).count();
    if archived == 0 {
        return Ok(StoreKind::Active);
    }
    if archived < input.len() {
        let active: Vec<&str> = input
            .iter()
            .filter(|raw| !is_archived(raw))
            .map(String::as_str)
            .collect();
        bail!(
            "cannot mix active and archive ids in one hard delete (active: {})",
            active.join(", ")
        );
    }
    Ok(StoreKind::Archive)
}

/// 从标准输入读取 y/N 确认
fn confirm(message: &str) -> bool {
    print!("{} [y/N] ", message);
    if io::stdout().flush().is_err() {
        return false;
    }

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

// ============================================================================
// Output
// ============================================================================

fn show_groups(
    book: &Taskbook,
    config: &Config,
    groups: &[crate::engine::Group],
    with_boards: bool,
) -> Result<()> {
    let today = chrono::Local::now().date_naive();
    let palette = render::Palette::detect();
    print!("{}", render::render_groups(groups, book.now_millis(), today, with_boards, palette));
    if config.display_progress_overview {
        print!("{}", render::render_stats(&book.stats()?, palette));
    }
    Ok(())
}

fn print_ids(action: &str, ids: &[u32]) {
    if let Some(message) = render::ids_message(action, ids) {
        println!("✓ {}", message);
    }
}

fn report_toggle(outcome: &Toggled, on: &str, off: &str) {
    print_ids(on, &outcome.on);
    print_ids(off, &outcome.off);
    print_ids("Skipped (not a task)", &outcome.skipped);
}

fn report_applied(applied: &Applied, action: &str) {
    print_ids(action, &applied.affected);
    print_ids("Skipped (not a task)", &applied.skipped);
}

#[cfg(feature = "clipboard")]
fn copy_to_clipboard(text: &str) -> Result<()> {
    match arboard::Clipboard::new().and_then(|mut clipboard| clipboard.set_text(text.to_string())) {
        Ok(()) => println!("✓ Copied to clipboard"),
        Err(e) => {
            warn!("event=clipboard_copy status=error reason={}", e);
            println!("{}", text);
        }
    }
    Ok(())
}

#[cfg(not(feature = "clipboard"))]
fn copy_to_clipboard(text: &str) -> Result<()> {
    warn!("event=clipboard_copy status=disabled");
    println!("{}", text);
    Ok(())
}

/// 打印帮助信息
fn print_help() {
    println!("Taskbook (tb) - tasks, boards and notes from the command line\n");
    println!("Usage:");
    println!("  tb                               Display the board view");
    println!("  tb <option> [arguments]          Run a command\n");

    println!("Create / edit:");
    println!("  --task, -t      Create task        tb --task @coding Fix CI p:2 date:2024/02/01");
    println!("  --note, -n      Create note        tb --note @coding Mergesort is O(n log n)");
    println!("  --edit, -e      Edit description   tb --edit @3 Merge PR #42\n");

    println!("Archive:");
    println!("  --delete, -d    Move items to the archive       tb --delete 4");
    println!("  --restore, -r   Restore archived items          tb --restore a4");
    println!("  --hardDelete, -D  Delete permanently (asks)     tb --hardDelete 4 | a4");
    println!("  --clear         Archive all checked tasks\n");

    println!("Toggles:");
    println!("  --check, -c     Check/uncheck task    tb --check 1 2");
    println!("  --begin, -b     Start/pause task      tb --begin 2");
    println!("  --star, -s      Star/unstar item      tb --star 2");
    println!("  --bug           Toggle bug flag       tb --bug 2 3\n");

    println!("Attributes:");
    println!("  --priority, -p  Set priority          tb --priority @3 2");
    println!("  --addBoard      Add boards            tb --addBoard 2 @work");
    println!("  --removeBoard   Remove boards         tb --removeBoard 2 @work");
    println!("  --move, -m      Replace boards        tb --move @1 cooking myboard");
    println!("  --setLink       Set link              tb --setLink @2 https://example.com");
    println!("  --removeLink    Remove link           tb --removeLink 2");
    println!("  --viewLink      Show link             tb --viewLink 2");
    println!("  --copy, -y      Copy descriptions     tb --copy 1 2 3\n");

    println!("Time tracking:");
    println!("  --addTime       Add minutes           tb --addTime @3 @5 40");
    println!("  --removeTime    Remove minutes        tb --removeTime @3 15");
    println!("  --clearTime     Reset total time      tb --clearTime 3 5");
    println!("  --clearTimer    Restart running timer tb --clearTimer 3\n");

    println!("Deadlines:");
    println!("  --moveToDate    Set deadline          tb --moveToDate @1 @2 2024/01/25");
    println!("  --removeDeadline  Remove deadline     tb --removeDeadline 3");
    println!("  --resetDate     Deadline = created    tb --resetDate 3 2");
    println!("  --moveToToday   Deadline = today      tb --moveToToday 1 2\n");

    println!("Views:");
    println!("  --list, -l      Filter by terms       tb --list pending @coding");
    println!("                                        tb --list deadline:2024/01/01-2024/01/31");
    println!("  --find, -f      Search descriptions   tb --find documentation");
    println!("  --table         Task table            tb --table source:all isort:time");
    println!("  --timeline, -i  Group by creation date");
    println!("  --deadlines     Group by deadline");
    println!("  --archive, -a   Show archived items");
    println!("  --boards        List boards\n");

    println!("Setup:");
    println!("  --initDir       Set the taskbook directory   tb --initDir ~/notes/taskbook");
    println!("  --config        Show configuration");
    println!("  --save          git commit and push the taskbook directory");
    println!("  --help, -h      Show this help");
    println!("  --version, -v   Show version");
}

/// 打印版本信息
fn print_version() {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const NAME: &str = env!("CARGO_PKG_NAME");
    println!("{} {}", NAME, VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(raw: &str) -> Vec<String> {
        raw.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_plain_ids_accept_markers() {
        assert_eq!(plain_ids(&words("1 @2"), StoreKind::Active).unwrap(), vec![1, 2]);
        assert_eq!(plain_ids(&words("a3 4"), StoreKind::Archive).unwrap(), vec![3, 4]);
        assert!(matches!(
            plain_ids(&[], StoreKind::Active),
            Err(TaskbookError::MissingInput("id"))
        ));
        assert!(matches!(
            plain_ids(&words("x"), StoreKind::Active),
            Err(TaskbookError::UnknownId(_))
        ));
    }

    #[test]
    fn test_split_marked() {
        let (ids, rest) = split_marked(&words("@3 Merge @5 PR")).unwrap();
        assert_eq!(ids, vec![3, 5]);
        assert_eq!(rest, words("Merge PR"));
        assert!(matches!(split_marked(&words("40")), Err(TaskbookError::MissingInput(_))));
    }

    #[test]
    fn test_split_boards() {
        let (ids, boards) = split_boards(&words("2 @work 3 @home")).unwrap();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(boards, words("@work @home"));
    }

    #[test]
    fn test_hard_delete_target() {
        assert_eq!(hard_delete_target(&words("3 4")).unwrap(), StoreKind::Active);
        assert_eq!(hard_delete_target(&words("a3 @a4")).unwrap(), StoreKind::Archive);
        assert_eq!(hard_delete_target(&[]).unwrap(), StoreKind::Active);
    }

    #[test]
    fn test_hard_delete_rejects_mixed_namespaces() {
        let err = hard_delete_target(&words("3 a4")).unwrap_err();
        assert!(err.to_string().contains("cannot mix"));
        assert!(err.to_string().contains("3"));

        assert!(hard_delete_target(&words("a4 @3")).is_err());
    }
}
