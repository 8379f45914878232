use std::{env, fmt};

use ansiterm::{Color, Style};
use log::{level_filters::LevelFilter, Event, Level, Subscriber};
use time::format_description::well_known::Iso8601;
use tracing_log::NormalizeEvent;
use tracing_subscriber::{
    filter::Targets,
    fmt::{
        format::Writer,
        time::{FormatTime, UtcTime},
        FmtContext, FormatEvent, FormatFields, FormattedFields,
    },
    registry::LookupSpan,
};

pub static BALLOT_MODULES: &[&str] = &[
    "ballot_database",
    "ballot_lib",
    "ballot_log",
    "ballot_network",
    "ballot_network_mock",
    "ballot_primitives",
    "ballot_rpc_interface",
    "ballot_test_log",
    "ballot_utils",
];

pub const ENV: &str = "RUST_LOG";

/// Width the module column of a log line is padded or truncated to.
const MODULE_WIDTH: usize = 16;

pub trait TargetsExt {
    /// Sets `level` for every ballot crate.
    fn with_ballot_targets(self, level: LevelFilter) -> Self;
    /// Applies `RUST_LOG` style directives, `ballot=<level>` addresses all ballot crates.
    fn with_env(self) -> Self;
    /// Applies a single `target=level` or `level` directive. Invalid directives are ignored.
    fn with_directive(self, directive: &str) -> Self;
}

impl TargetsExt for Targets {
    fn with_ballot_targets(self, level: LevelFilter) -> Targets {
        BALLOT_MODULES
            .iter()
            .fold(self, |targets, module| targets.with_target(*module, level))
    }

    fn with_env(self) -> Targets {
        match env::var(ENV) {
            Ok(directives) => directives
                .split(',')
                .fold(self, |targets, directive| targets.with_directive(directive)),
            Err(_) => self,
        }
    }

    fn with_directive(self, directive: &str) -> Targets {
        let (target, level) = match directive.trim().split_once('=') {
            Some((target, level)) => (Some(target), level),
            None => (None, directive.trim()),
        };
        let Ok(level) = level.parse::<LevelFilter>() else {
            return self;
        };
        match target {
            Some("ballot") => self.with_ballot_targets(level),
            Some(target) => self.with_target(target.to_owned(), level),
            None => self.with_default(level),
        }
    }
}

/// Compact event format: `<time> LEVEL module | fields, span{fields}`.
pub struct Formatting<T: FormatTime>(pub T);

impl<S, N, T: FormatTime> FormatEvent<S, N> for Formatting<T>
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
        let ansi = writer.has_ansi_escapes();
        let dim = if ansi {
            Style::default().dimmed()
        } else {
            Style::default()
        };

        write!(writer, "{}", dim.prefix())?;
        self.0.format_time(&mut writer)?;
        write!(writer, "{}", dim.suffix())?;

        let normalized = event.normalized_metadata();
        let metadata = normalized.as_ref().unwrap_or_else(|| event.metadata());

        let level_style = if ansi {
            Style::from(level_color(metadata.level()))
        } else {
            Style::default()
        };

        write!(
            writer,
            " {}{:5}{} {}{}{} | ",
            level_style.prefix(),
            metadata.level(),
            level_style.suffix(),
            dim.prefix(),
            module_column(metadata.target()),
            dim.suffix(),
        )?;

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        if let Some(scope) = ctx.event_scope() {
            let bold = if ansi {
                Style::default().bold()
            } else {
                Style::default()
            };
            for span in scope.from_root() {
                write!(writer, ", {}{}{}", bold.prefix(), span.name(), bold.suffix())?;
                let extensions = span.extensions();
                if let Some(fields) = extensions.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{}}}", fields)?;
                    }
                }
            }
        }

        writeln!(writer)
    }
}

fn level_color(level: &Level) -> Color {
    match *level {
        Level::TRACE => Color::Purple,
        Level::DEBUG => Color::Blue,
        Level::INFO => Color::Green,
        Level::WARN => Color::Yellow,
        Level::ERROR => Color::Red,
    }
}

/// Last path segment of `target`, padded or cut to `MODULE_WIDTH` characters.
fn module_column(target: &str) -> String {
    let module = target.rsplit("::").next().unwrap_or(target);
    let count = module.chars().count();
    if count > MODULE_WIDTH {
        let cut: String = module.chars().take(MODULE_WIDTH - 1).collect();
        format!("{cut}…")
    } else {
        format!("{module:<MODULE_WIDTH$}")
    }
}

/// ISO 8601 UTC timestamps, or nothing at all.
pub struct MaybeSystemTime(pub bool);

impl FormatTime for MaybeSystemTime {
    fn format_time(&self, w: &mut Writer) -> fmt::Result {
        if self.0 {
            UtcTime::new(Iso8601::DEFAULT).format_time(w)
        } else {
            ().format_time(w)
        }
    }
}
