//! Tracing subscriber setup: console formatter, file layer, and initialisation.
use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::sync::Mutex;

use tracing::span;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

use super::utils::{format_utc_datetime, format_utc_time, log_file_path, rotated_path, strip_ansi};

/// Target used for stage headers.
pub(super) const STAGE_TARGET: &str = "updater::stage";

/// Target used for dry-run messages.
pub(super) const DRY_RUN_TARGET: &str = "updater::dry_run";

/// Name of the span the orchestrator opens around each target.
pub const TARGET_SPAN: &str = "target";

/// Log files larger than this are rotated to `<command>.log.1` before a run.
const MAX_LOG_BYTES: u64 = 1024 * 1024;

/// Extracts one named field from a [`tracing::Event`] or span.
struct FieldExtractor {
    field: &'static str,
    value: Option<String>,
}

impl FieldExtractor {
    const fn new(field: &'static str) -> Self {
        Self { field, value: None }
    }

    fn message() -> Self {
        Self::new("message")
    }

    fn into_string(self) -> String {
        self.value.unwrap_or_default()
    }
}

impl tracing::field::Visit for FieldExtractor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == self.field {
            self.value = Some(format!("{value:?}"));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == self.field {
            self.value = Some(value.to_string());
        }
    }
}

/// Target name stored in the extensions of a [`TARGET_SPAN`].
struct TargetLabel(String);

/// A [`tracing_subscriber::Layer`] that appends all events to the persistent
/// log file with timestamps and ANSI codes stripped.
///
/// Always captures events at `DEBUG` level and above regardless of the
/// console verbosity setting, so unattended runs leave a complete trail.
/// Events emitted while a [`TARGET_SPAN`] is entered are prefixed with the
/// target name, which keeps interleaved source output attributable.
#[derive(Debug)]
pub(super) struct FileLayer {
    file: Mutex<fs::File>,
}

impl FileLayer {
    /// Open the log file for `command`, write a run header, and return a new
    /// `FileLayer` ready to receive events.
    ///
    /// Earlier runs are kept: the header is appended, and a file that has
    /// grown past [`MAX_LOG_BYTES`] is first moved aside to `<command>.log.1`.
    ///
    /// Returns `None` if the cache directory cannot be created or the file
    /// cannot be opened.
    pub(super) fn new(command: &str) -> Option<Self> {
        let path = log_file_path(command)?;
        rotate_if_large(&path);

        let version =
            option_env!("UPDATER_VERSION").unwrap_or(concat!("dev-", env!("CARGO_PKG_VERSION")));
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok()?;
        write!(
            file,
            "==========================================\n\
             updater {command} {version} {}\n\
             ==========================================\n",
            format_utc_datetime(),
        )
        .ok()?;
        Some(Self {
            file: Mutex::new(file),
        })
    }
}

fn rotate_if_large(path: &Path) {
    let too_large = fs::metadata(path).is_ok_and(|m| m.len() > MAX_LOG_BYTES);
    if too_large {
        fs::rename(path, rotated_path(path)).ok();
    }
}

impl<S> tracing_subscriber::Layer<S> for FileLayer
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        if attrs.metadata().name() != TARGET_SPAN {
            return;
        }
        let mut extractor = FieldExtractor::new("name");
        attrs.record(&mut extractor);
        if let Some(name) = extractor.value
            && let Some(span) = ctx.span(id)
        {
            span.extensions_mut().insert(TargetLabel(name));
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = *metadata.level();
        let target = metadata.target();

        let mut extractor = FieldExtractor::message();
        event.record(&mut extractor);
        let msg = strip_ansi(&extractor.into_string());
        let ts = format_utc_time();

        let label = ctx
            .event_scope(event)
            .and_then(|scope| {
                scope.from_root().find_map(|span| {
                    span.extensions()
                        .get::<TargetLabel>()
                        .map(|label| label.0.clone())
                })
            })
            .map_or_else(String::new, |name| format!("[{name}] "));

        let line = match (level, target) {
            (tracing::Level::INFO, STAGE_TARGET) => format!("[{ts}] ==> {msg}"),
            (tracing::Level::INFO, DRY_RUN_TARGET) => {
                format!("[{ts}]     {label}[dry run] {msg}")
            }
            (tracing::Level::ERROR, _) => format!("[{ts}]     {label}[error] {msg}"),
            (tracing::Level::WARN, _) => format!("[{ts}]     {label}[warn] {msg}"),
            (tracing::Level::DEBUG, _) => format!("[{ts}]     {label}[debug] {msg}"),
            _ => format!("[{ts}]     {label}{msg}"),
        };

        if let Ok(mut f) = self.file.lock() {
            writeln!(f, "{line}").ok();
        }
    }
}

/// A [`tracing_subscriber::fmt::FormatEvent`] that emits updater-style
/// console output.
struct ConsoleFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for ConsoleFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let level = *metadata.level();
        let target = metadata.target();

        let mut extractor = FieldExtractor::message();
        event.record(&mut extractor);
        let msg = extractor.into_string();

        match level {
            tracing::Level::ERROR => writeln!(writer, "\x1b[31mERROR\x1b[0m {msg}"),
            tracing::Level::WARN => writeln!(writer, "\x1b[33mWARN\x1b[0m  {msg}"),
            tracing::Level::INFO if target == STAGE_TARGET => {
                writeln!(writer, "\x1b[1;34m==>\x1b[0m \x1b[1m{msg}\x1b[0m")
            }
            tracing::Level::INFO if target == DRY_RUN_TARGET => {
                writeln!(writer, "  \x1b[33m[DRY RUN]\x1b[0m {msg}")
            }
            tracing::Level::INFO => writeln!(writer, "  {msg}"),
            _ => writeln!(writer, "  \x1b[2m{msg}\x1b[0m"),
        }
    }
}

/// Initialise the global [`tracing`] subscriber.
///
/// Sets up a console layer formatted in the updater output style and a file
/// layer that writes all events (including `debug`) to
/// `$XDG_CACHE_HOME/updater/<command>.log`.
/// Must be called once at program startup, before any logging.
pub fn init_subscriber(verbose: bool, command: &str) {
    use tracing_subscriber::fmt::writer::MakeWriterExt as _;
    use tracing_subscriber::{
        Layer as _, filter::LevelFilter, fmt, layer::SubscriberExt as _,
        util::SubscriberInitExt as _,
    };

    let console_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let make_writer = std::io::stderr
        .with_max_level(tracing::Level::WARN)
        .and(std::io::stdout.with_min_level(tracing::Level::INFO));

    let console_layer = fmt::layer()
        .event_format(ConsoleFormatter)
        .with_writer(make_writer)
        .with_filter(console_level);

    let file_layer = FileLayer::new(command).map(|l| l.with_filter(LevelFilter::DEBUG));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();
}
