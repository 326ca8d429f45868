use colored::Colorize;
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

/// Event formatter for the user-facing stdout layer.
///
/// Renders each event as a single line colored by severity, with no
/// timestamps or level prefixes. The detailed stderr/file layer keeps
/// the default format; this one exists so an operator watching the
/// console sees session activity at a glance.
pub struct ConsoleFormatter;

impl<S, N> FormatEvent<S, N> for ConsoleFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        // Format into a buffer first; the color wraps the whole line.
        let mut line = String::new();
        ctx.format_fields(Writer::new(&mut line), event)?;

        let colored = match *event.metadata().level() {
            Level::ERROR => line.red().bold(),
            Level::WARN => line.yellow(),
            Level::INFO => line.normal(),
            Level::DEBUG => line.cyan(),
            Level::TRACE => line.dimmed(),
        };
        writeln!(writer, "{}", colored)
    }
}
