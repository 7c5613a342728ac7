//! Text rendering for kdumpctl output.

use kdump_common::status::format_memory;
use kdump_common::{KdumpConfig, KdumpStatus, ServiceState};
use owo_colors::OwoColorize;
use std::fmt::Write;

/// Parse index arguments, decimal or `0x` hex, keeping the rejects apart
pub fn parse_indices<S: AsRef<str>>(args: &[S]) -> (Vec<i32>, Vec<String>) {
    let mut good = Vec::new();
    let mut bad = Vec::new();
    for arg in args {
        let arg = arg.as_ref();
        match parse_index(arg) {
            Some(i) => good.push(i),
            None => bad.push(arg.to_string()),
        }
    }
    (good, bad)
}

fn parse_index(arg: &str) -> Option<i32> {
    let (negative, digits) = match arg.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, arg.strip_prefix('+').unwrap_or(arg)),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    i32::try_from(if negative { -magnitude } else { magnitude }).ok()
}

/// Completion candidates for `count` dumps
pub fn allowed_lines(count: usize) -> Vec<String> {
    let n = count as i64;
    match count {
        0 => Vec::new(),
        1 | 2 => (-n..n).map(|i| i.to_string()).collect(),
        _ => vec![format!("0..{}", n)],
    }
}

fn state_colored(state: ServiceState) -> String {
    match state {
        ServiceState::Running => state.as_str().green().to_string(),
        ServiceState::Error => state.as_str().red().to_string(),
        ServiceState::Disabled => state.as_str().yellow().to_string(),
    }
}

/// Status report for `show`
pub fn render_status(config: &KdumpConfig, status: &KdumpStatus, color: bool) -> String {
    let mut out = String::new();

    let state = if color {
        state_colored(status.service_state)
    } else {
        status.service_state.to_string()
    };
    let _ = write!(out, "Kernel Crash Dump Status : {}", state);
    if status.need_reboot {
        let next = if config.is_enabled() { "enabled" } else { "disabled" };
        let _ = write!(out, " (Next Boot: {}), Reboot Needed", next);
    }
    out.push('\n');

    let _ = writeln!(
        out,
        "  Reserved Memory : {} (Configured: {})",
        format_memory(status.reserved_memory),
        config.reserved_memory
    );
    let _ = writeln!(
        out,
        "  Number of Captured Kernel Crash Dumps: {}",
        status.crash_count()
    );

    if status.crash_count() > 0 {
        out.push('\n');
        let _ = writeln!(
            out,
            "{:>6}  {:>24}  {:>20}  {:>16}",
            "Index", "Path", "Timestamp", "Size"
        );
        let _ = writeln!(out, "{}", "_".repeat(72));
        for dump in &status.crash_dumps {
            let _ = writeln!(
                out,
                "{:>6}  {:>24.24}  {:>20.20}  {:>16}",
                dump.index, dump.path, dump.timestamp, dump.size
            );
        }
    }
    out
}
