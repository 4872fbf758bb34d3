use log::error;
use std::process::ExitCode;

use taskbook::TaskbookError;

/// 致命错误（存储损坏、目录不可用、写入失败、配置错误）
const EXIT_FATAL: u8 = 2;
const EXIT_FAILURE: u8 = 1;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    match taskbook::cli::handle_cli(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let fatal = err
                .downcast_ref::<TaskbookError>()
                .is_some_and(TaskbookError::is_fatal);

            if fatal {
                error!("event=command_failed fatal=true error={}", err);
                eprintln!("Fatal: {:#}", err);
                ExitCode::from(EXIT_FATAL)
            } else {
                eprintln!("Error: {:#}", err);
                ExitCode::from(EXIT_FAILURE)
            }
        }
    }
}
