use chrono::Local;
use nu_ansi_term::{Color, Style};
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    prelude::*,
    registry::LookupSpan,
    Layer,
};

/// Maps the configured level names (Python-style WARNING/CRITICAL included)
/// onto tracing levels.
pub fn parse_level(level: &str) -> Option<Level> {
    match level.to_ascii_uppercase().as_str() {
        "TRACE" => Some(Level::TRACE),
        "DEBUG" => Some(Level::DEBUG),
        "INFO" => Some(Level::INFO),
        "WARNING" | "WARN" => Some(Level::WARN),
        "ERROR" | "CRITICAL" => Some(Level::ERROR),
        _ => None,
    }
}

/// Installs the global subscriber: colored console plus a daily-rotated
/// plain-text file under `logs/`.
///
/// The returned guard flushes the file writer; the caller must keep it alive
/// for the process lifetime.
pub fn setup_logger(level: Level) -> Option<WorkerGuard> {
    std::fs::create_dir_all("logs").ok();

    let file_appender = tracing_appender::rolling::daily("logs", "nectar");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(FileFormatter)
        .with_filter(tracing_subscriber::filter::LevelFilter::from_level(level));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .event_format(TerminalFormatter)
        .with_filter(tracing_subscriber::filter::LevelFilter::from_level(level));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .init();

    Some(guard)
}

// --- Formatters ---

struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

pub struct TerminalFormatter;

impl<S, N> FormatEvent<S, N> for TerminalFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = Local::now().format("%H:%M:%S");
        let level = *event.metadata().level();

        let level_style = match level {
            Level::ERROR => Style::new().fg(Color::LightRed).bold(),
            Level::WARN => Style::new().fg(Color::Yellow),
            Level::INFO => Style::new().fg(Color::LightGreen),
            Level::DEBUG => Style::new().fg(Color::LightBlue),
            Level::TRACE => Style::new().fg(Color::DarkGray),
        };

        let mut msg_visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut msg_visitor);
        let msg = msg_visitor.message;

        // Highlight outcome keywords the way workers phrase them.
        let colored_msg = if msg.contains("SUCCESS") || msg.contains("Success") {
            let green = Style::new().fg(Color::LightGreen).bold();
            msg.replace("SUCCESS", &format!("{}", green.paint("SUCCESS")))
                .replace("Success", &format!("{}", green.paint("Success")))
        } else if msg.contains("FAILED") || msg.contains("Failed") {
            let red = Style::new().fg(Color::LightRed).bold();
            msg.replace("FAILED", &format!("{}", red.paint("FAILED")))
                .replace("Failed", &format!("{}", red.paint("Failed")))
        } else {
            msg
        };

        write!(
            writer,
            "{} | {:<8} | {}",
            Style::new().fg(Color::LightCyan).paint(timestamp.to_string()),
            level_style.paint(level.as_str()),
            colored_msg
        )?;
        writeln!(writer)
    }
}

pub struct FileFormatter;

impl<S, N> FormatEvent<S, N> for FileFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let level = event.metadata().level();

        write!(writer, "{} [{}] ", timestamp, level)?;

        let mut msg_visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut msg_visitor);
        writeln!(writer, "{}", msg_visitor.message)
    }
}

/// Short account prefix for log lines: `0x1234...abcd`.
pub fn short_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if address.starts_with("0x") && chars.len() > 12 {
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else if chars.len() > 10 {
        format!("{}...", chars[..10].iter().collect::<String>())
    } else {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_python_style_levels() {
        assert_eq!(parse_level("WARNING"), Some(Level::WARN));
        assert_eq!(parse_level("CRITICAL"), Some(Level::ERROR));
        assert_eq!(parse_level("debug"), Some(Level::DEBUG));
        assert_eq!(parse_level("nope"), None);
    }

    #[test]
    fn shortens_eth_addresses() {
        let addr = "0x1234567890abcdef1234567890abcdef12345678";
        assert_eq!(short_address(addr), "0x1234...5678");
        assert_eq!(short_address("short"), "short");
    }

    #[test]
    fn shortening_survives_multibyte_input() {
        // Garbage in a key file must not panic the log formatter.
        let weird = "проверкапроверкапроверка";
        assert_eq!(short_address(weird), "проверкапр...");
    }
}
