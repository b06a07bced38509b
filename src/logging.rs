use colored::*;
use std::fmt;
use std::path::Path;
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// A custom tracing event formatter for colorizing log output based on level.
///
/// The whole line is colored according to its severity, without timestamps
/// or level names, so console output stays readable for operators. The log
/// file gets the regular format.
pub struct ColorizedFormatter;

impl<S, N> FormatEvent<S, N> for ColorizedFormatter
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
        // format_fields writes directly, so buffer to color the entire line.
        let mut buffer = String::new();
        let mut buf_writer = Writer::new(&mut buffer);
        ctx.format_fields(buf_writer.by_ref(), event)?;

        let colored_output = match *event.metadata().level() {
            Level::INFO => buffer.white(),
            Level::WARN => buffer.yellow(),
            Level::ERROR => buffer.red(),
            Level::DEBUG => buffer.blue(),
            Level::TRACE => buffer.purple(),
        };

        writeln!(writer, "{}", colored_output)
    }
}

/// Install the global subscriber
///
/// Console output uses [`ColorizedFormatter`]; when `log_file` is given,
/// every event is also written there through a non-blocking appender. The
/// returned guard flushes the file when dropped and must be kept alive for
/// the whole run. `RUST_LOG` overrides the default level, which is `debug`
/// when `verbose` is set and `info` otherwise.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("hpca_bench={}", default_level)))
    };

    let console = tracing_subscriber::fmt::layer()
        .event_format(ColorizedFormatter)
        .with_filter(filter());

    let (file_layer, guard) = match log_file.and_then(|path| Some((path.parent()?, path.file_name()?))) {
        Some((dir, name)) => {
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_with_log_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hpca-test.log");
        let guard = init(true, Some(&path));
        assert!(guard.is_some());
        tracing::info!("logging initialized");
        drop(guard);
        assert!(path.exists());
    }
}
