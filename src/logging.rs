//! Log output for `batchup`.
//!
//! Verbosity selects the most detailed level shown: warnings by default, `-v` for info, and
//! `-vv` for debug. The `BATCHUP_LOG` environment variable overrides this with an
//! [`EnvFilter`] directive string, e.g. `BATCHUP_LOG=batchup::rules=trace`.
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::field::RecordFields;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, FormattedFields, SubscriberBuilder};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const LOG_ENV: &str = "BATCHUP_LOG";
const SPAN_PREFIX: &str = "    at ";

/// The most detailed level shown for the given number of `-v` flags.
#[must_use]
pub fn level_for_verbosity(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: BTreeMap<&'static str, String>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" && self.message.is_none() {
            self.message = Some(value.to_owned());
        } else {
            self.fields.insert(field.name(), value.to_owned());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" && self.message.is_none() {
            self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name(), format!("{:?}", value));
        }
    }
}

/// Formats events as `message: key=value, ...`.
///
/// The level and target are only printed for errors, or for everything when showing debug
/// output. Span context is printed at trace level.
#[derive(Debug, Clone, Copy)]
pub struct Formatter {
    max_level: Level,
}

impl<'writer> FormatFields<'writer> for Formatter {
    fn format_fields<R: RecordFields>(&self, mut writer: Writer<'writer>, fields: R) -> fmt::Result {
        let mut visitor = FieldVisitor::default();
        fields.record(&mut visitor);

        let fields = visitor
            .fields
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .join(", ");

        match (visitor.message, fields.is_empty()) {
            (Some(message), true) => write!(writer, "{}", message),
            (Some(message), false) => write!(writer, "{}: {}", message, fields),
            (None, _) => write!(writer, "{}", fields),
        }
    }
}

impl<S, N> FormatEvent<S, N> for Formatter
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
        let metadata = event.metadata();
        if self.max_level >= Level::DEBUG || *metadata.level() == Level::ERROR {
            write!(writer, "{} {}: ", metadata.level(), metadata.target())?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)?;

        if self.max_level == Level::TRACE {
            if let Some(scope) = ctx.event_scope() {
                for span in scope.from_root() {
                    write!(writer, "{}{}", SPAN_PREFIX, span.name())?;
                    let extensions = span.extensions();
                    if let Some(fields) = extensions.get::<FormattedFields<N>>() {
                        if !fields.is_empty() {
                            write!(writer, ": {}", fields)?;
                        }
                    }
                    writeln!(writer)?;
                }
            }
        }

        Ok(())
    }
}

/// The most detailed level named in `BATCHUP_LOG`, if it names one on its own.
fn env_level() -> Option<Level> {
    std::env::var(LOG_ENV).ok().and_then(|directives| {
        directives
            .split(',')
            .map(str::trim)
            .rev()
            .find_map(|directive| Level::from_str(directive).ok())
    })
}

/// A subscriber builder with `batchup`'s formatting and filtering, writing to stdout.
///
/// Use [`get_subscriber`] unless the output needs to go somewhere else.
#[must_use]
pub fn subscriber_builder(verbosity: u8) -> SubscriberBuilder<Formatter, Formatter, EnvFilter> {
    let max_level = env_level().unwrap_or_else(|| level_for_verbosity(verbosity));
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::default().add_directive(max_level.into()));

    FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .event_format(Formatter { max_level })
        .fmt_fields(Formatter { max_level })
}

/// The subscriber used by the `batchup` binary.
#[must_use]
pub fn get_subscriber(verbosity: u8) -> impl Subscriber + Send + Sync {
    subscriber_builder(verbosity).finish()
}
