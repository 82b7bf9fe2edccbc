//! Text rendering for tables, statistics and menus.

use std::fmt::Write as _;

use comfy_table::{ContentArrangement, Table};
use irqsim_core::config::Config;
use irqsim_core::core::stats::StatsSnapshot;
use irqsim_core::core::table::DescriptorView;
use irqsim_core::core::trace::{LogLevel, TraceEntry, Visibility};

const TABLE_WIDTH: u16 = 100;

pub const MAIN_MENU: &str = "\
=== Interrupt simulator ===
1. Dispatch an interrupt
2. Register a custom ISR
3. Show IDT status
4. Show recent trace
5. Run the test sequence
6. Unregister an ISR
7. Show system statistics
8. Configure logging
9. Help
0. Exit";

/// Renders every descriptor as one table row.
pub fn idt_table(descriptors: &[DescriptorView]) -> String {
    let mut table = Table::new();
    table.set_width(TABLE_WIDTH);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "IRQ",
        "State",
        "Calls",
        "Total time (μs)",
        "Last call",
        "Description",
    ]);

    for descriptor in descriptors {
        let last_call = descriptor.last_invoked_at.map_or_else(
            || "-".to_string(),
            |at| at.format("%H:%M:%S").to_string(),
        );
        table.add_row(vec![
            descriptor.line.to_string(),
            descriptor.state.label().to_string(),
            descriptor.call_count.to_string(),
            descriptor.total_execution_micros.to_string(),
            last_call,
            descriptor.description.clone(),
        ]);
    }

    format!("=== IDT status ===\n{table}")
}

pub fn recent_trace(entries: &[TraceEntry]) -> String {
    let mut out = format!("=== Recent trace (last {} entries) ===", entries.len());
    if entries.is_empty() {
        out.push_str("\n(no events yet)");
    }
    for entry in entries {
        let _ = write!(out, "\n{entry}");
    }
    out
}

pub fn stats(snapshot: &StatsSnapshot) -> String {
    format!(
        "=== System statistics ===\n\
         Started at: {}\n\
         Uptime: {} s\n\
         Total interrupts: {}\n\
         Timer interrupts: {}\n\
         Keyboard interrupts: {}\n\
         Custom interrupts: {}\n\
         Mean response time: {:.2} μs",
        snapshot.started_at.format("%Y-%m-%d %H:%M:%S"),
        snapshot.uptime.as_secs(),
        snapshot.total,
        snapshot.timer,
        snapshot.keyboard,
        snapshot.custom,
        snapshot.mean_response_micros,
    )
}

pub fn help(config: &Config) -> String {
    let last = config.lines.saturating_sub(1);
    format!(
        "=== Help ===\n\
         Simulates interrupt descriptors, dispatch and a periodic timer, the way a\n\
         kernel routes hardware interrupts to their service routines.\n\
         \n\
         1. Dispatch an interrupt - run the ISR registered on an IRQ\n\
         2. Register a custom ISR - attach the custom routine to an IRQ\n\
         3. Show IDT status - state, calls and timings of every IRQ\n\
         4. Show recent trace - the last 10 trace events\n\
         5. Run the test sequence - dispatch custom routines on IRQ 2 and 3\n\
         6. Unregister an ISR - free an IRQ\n\
         7. Show system statistics - counters and mean response time\n\
         8. Configure logging - choose which events are echoed\n\
         0. Exit - stop the timer and quit\n\
         \n\
         System IRQs:\n\
         - IRQ {timer}: system timer (every {interval} ms)\n\
         - IRQ {keyboard}: keyboard controller\n\
         - IRQ 0-{last}: the rest are free for custom ISRs",
        timer = config.timer_line,
        interval = config.timer_interval_ms,
        keyboard = config.keyboard_line,
    )
}

/// Short description of the echo settings, e.g. `user only (timer logs: OFF)`.
pub fn visibility(visibility: Visibility) -> String {
    match visibility.level {
        LogLevel::Silent => "silent".to_string(),
        LogLevel::UserOnly => format!("user only (timer logs: {})", on_off(visibility.show_timer)),
        LogLevel::Verbose => "verbose".to_string(),
    }
}

pub fn logging_menu(current: Visibility, preview_secs: u64) -> String {
    let mut out = format!("=== Logging ===\nCurrent: {}\n", visibility(current));
    for (n, level) in LogLevel::all().iter().enumerate() {
        let _ = writeln!(out, "{}. {}", n + 1, level.description());
    }
    let _ = writeln!(out, "4. Toggle timer logs (now: {})", on_off(current.show_timer));
    let _ = writeln!(out, "5. Show timer logs live for {preview_secs} seconds");
    let _ = writeln!(out, "6. Save these settings to the config file");
    out.push_str("0. Back");
    out
}

pub fn on_off(flag: bool) -> &'static str {
    if flag { "ON" } else { "OFF" }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Local;
    use irqsim_core::core::table::LineState;

    use super::*;

    fn view(line: usize, state: LineState, description: &str) -> DescriptorView {
        DescriptorView {
            line,
            state,
            has_handler: state != LineState::Free,
            call_count: 3,
            last_invoked_at: None,
            total_execution_micros: 30_000,
            description: description.to_string(),
        }
    }

    /// Table rows carry state labels and descriptions.
    #[test]
    fn test_idt_table_lists_descriptors() {
        let rendered = idt_table(&[
            view(0, LineState::Registered, "System timer"),
            view(5, LineState::Free, "IRQ 5 - unassigned"),
        ]);

        assert!(rendered.contains("IDT status"));
        assert!(rendered.contains("REGISTERED"));
        assert!(rendered.contains("FREE"));
        assert!(rendered.contains("System timer"));
        assert!(rendered.contains("30000"));
    }

    /// Statistics text shows every counter and a two-decimal mean.
    #[test]
    fn test_stats_text() {
        let snapshot = StatsSnapshot {
            total: 4,
            timer: 2,
            keyboard: 1,
            custom: 1,
            mean_response_micros: 1234.5,
            started_at: Local::now(),
            uptime: Duration::from_secs(7),
        };

        let rendered = stats(&snapshot);
        assert!(rendered.contains("Uptime: 7 s"));
        assert!(rendered.contains("Total interrupts: 4"));
        assert!(rendered.contains("Timer interrupts: 2"));
        assert!(rendered.contains("Custom interrupts: 1"));
        assert!(rendered.contains("1234.50 μs"));
    }

    /// Empty trace renders a placeholder instead of nothing.
    #[test]
    fn test_recent_trace_empty() {
        assert!(recent_trace(&[]).contains("(no events yet)"));
    }

    #[test]
    fn test_visibility_label() {
        let visible = Visibility {
            level: LogLevel::UserOnly,
            show_timer: true,
        };
        assert_eq!(visibility(visible), "user only (timer logs: ON)");
        assert_eq!(
            visibility(Visibility {
                level: LogLevel::Verbose,
                show_timer: false,
            }),
            "verbose"
        );
    }

    /// Help reflects the configured reserved lines.
    #[test]
    fn test_help_uses_config() {
        let config = Config {
            timer_line: 3,
            keyboard_line: 4,
            ..Config::default()
        };
        let rendered = help(&config);
        assert!(rendered.contains("IRQ 3: system timer (every 3000 ms)"));
        assert!(rendered.contains("IRQ 4: keyboard controller"));
    }

    #[test]
    fn test_logging_menu_lines() {
        let rendered = logging_menu(
            Visibility {
                level: LogLevel::Silent,
                show_timer: false,
            },
            30,
        );
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[1], "Current: silent");
        assert_eq!(lines[2], "1. Silent (history only)");
        assert_eq!(lines[4], "3. Verbose (show everything)");
        assert_eq!(lines[5], "4. Toggle timer logs (now: OFF)");
        assert_eq!(lines[6], "5. Show timer logs live for 30 seconds");
        assert_eq!(lines.last(), Some(&"0. Back"));
    }
}
