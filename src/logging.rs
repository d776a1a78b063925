use miette::{Context, IntoDiagnostic, Result};
use owo_colors::OwoColorize;
use time::{
    format_description::{self, FormatItem},
    OffsetDateTime, UtcOffset,
};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    fmt::{format, FmtContext, FormatEvent, FormatFields},
    registry::LookupSpan,
    FmtSubscriber,
};

/// Initialize the logging system, writing to stderr so that the run report
/// is alone on stdout.
pub fn init_logging(level: Level) -> Result<()> {
    // Unavailable on some platforms when multithreaded, fall back to UTC
    let local_offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let logger = PrettyLogger::new(local_offset)?;

    let subscriber = FmtSubscriber::builder()
        .event_format(logger)
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .into_diagnostic()
        .wrap_err("Setting default subscriber failed")
}

struct PrettyLogger {
    offset: UtcOffset,
    time_format: Vec<FormatItem<'static>>,
}

impl PrettyLogger {
    fn new(offset: UtcOffset) -> Result<Self> {
        let time_format = format_description::parse("[hour]:[minute]:[second]")
            .into_diagnostic()
            .wrap_err("Invalid log time format")?;

        Ok(Self {
            offset,
            time_format,
        })
    }
}

impl<S, N> FormatEvent<S, N> for PrettyLogger
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();

        let now = OffsetDateTime::now_utc().to_offset(self.offset).time();
        let now = now.format(&self.time_format).map_err(|_| std::fmt::Error)?;
        let target = metadata.target().trim_start_matches("vidinfo::");

        if writer.has_ansi_escapes() {
            let level = match *metadata.level() {
                Level::ERROR => metadata.level().red().to_string(),
                Level::WARN => metadata.level().yellow().to_string(),
                Level::DEBUG => metadata.level().blue().to_string(),
                Level::TRACE => metadata.level().purple().to_string(),
                _ => metadata.level().green().to_string(),
            };

            write!(&mut writer, "{} {:>5} {} ", now, level, target.dimmed())?;
        } else {
            write!(&mut writer, "{} {:>5} {} ", now, metadata.level(), target)?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}
