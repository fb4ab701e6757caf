//! Terminal output.
//!
//! - `log!("module"; ...)` prints a line behind a colored `[module]` prefix
//! - `debug!` does the same, only with `--verbose`
//! - `status_*` redraw the serve-mode status block in place

use std::io::{Write, stdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use crossterm::cursor::MoveUp;
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};
use owo_colors::OwoColorize;
use parking_lot::{Mutex, const_mutex};

static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Height of the last status block, erased by the next one.
static STATUS_HEIGHT: Mutex<u16> = const_mutex(0);

pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::Relaxed);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

/// Log a message with a colored module prefix
///
/// ```ignore
/// log!("hmr"; "update {} -> {}", file, boundary);
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Like `log!`, shown only with `--verbose`
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

pub fn log(module: &str, message: &str) {
    let prefix = prefix(module);
    // A plain line below the status block pins it in place
    *STATUS_HEIGHT.lock() = 0;

    let mut out = stdout().lock();
    queue!(out, Clear(ClearType::UntilNewLine)).ok();
    writeln!(out, "{prefix} {message}").ok();
    out.flush().ok();
}

fn prefix(module: &str) -> String {
    let label = format!("[{module}]");
    match module.to_ascii_lowercase().as_str() {
        "serve" => label.bright_blue().bold().to_string(),
        "watch" | "manifest" => label.bright_green().bold().to_string(),
        "hmr" | "refresh" | "graph" => label.bright_magenta().bold().to_string(),
        "error" => label.bright_red().bold().to_string(),
        _ => label.bright_yellow().bold().to_string(),
    }
}

// ============================================================================
// Status block
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Mark {
    Success,
    Unchanged,
    Warning,
    Error,
}

pub fn status_success(message: &str) {
    show_status(Mark::Success, message);
}

pub fn status_unchanged(message: &str) {
    show_status(Mark::Unchanged, message);
}

pub fn status_warning(message: &str) {
    show_status(Mark::Warning, message);
}

/// `detail` goes on the lines below `summary`; may be empty.
pub fn status_error(summary: &str, detail: &str) {
    if detail.is_empty() {
        show_status(Mark::Error, summary);
    } else {
        show_status(Mark::Error, &format!("{summary}\n{detail}"));
    }
}

fn show_status(mark: Mark, message: &str) {
    let mut height = STATUS_HEIGHT.lock();
    let mut out = stdout().lock();

    if *height > 0 {
        queue!(out, MoveUp(*height), Clear(ClearType::FromCursorDown)).ok();
    }

    let clock = format!("[{}]", clock()).dimmed().to_string();
    let line = match mark {
        Mark::Success => format!("{clock} {} {message}", "✓".green()),
        Mark::Unchanged => format!("{clock} {}", message.dimmed()),
        Mark::Warning => format!("{clock} {} {message}", "⚠".yellow()),
        Mark::Error => format!("{clock} {} {message}", "✗".red()),
    };
    writeln!(out, "{line}").ok();
    out.flush().ok();

    *height = block_height(message);
}

fn block_height(message: &str) -> u16 {
    u16::try_from(message.split('\n').count()).unwrap_or(u16::MAX)
}

/// UTC wall clock as `HH:MM:SS`.
fn clock() -> String {
    let secs = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    format!(
        "{:02}:{:02}:{:02}",
        (secs / 3600) % 24,
        (secs / 60) % 60,
        secs % 60
    )
}
