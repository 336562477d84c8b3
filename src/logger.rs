use std::{fs::File, path::Path};

use anyhow::Context;
use time::{format_description::parse, OffsetDateTime};
use tracing::{subscriber::set_global_default, Level};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, FmtSubscriber};

/// Installs a global subscriber writing every event to a time-named file inside `dir`.
///
/// Fails if a global subscriber is already set.
pub fn init_logger(dir: impl AsRef<Path>) -> anyhow::Result<()> {
    let path = dir.as_ref().join(get_log_file_name()?);
    let file = File::create(&path).with_context(|| format!("creating log file {path:?}"))?;
    let writer = BoxMakeWriter::new(file);
    let local_offset =
        time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        local_offset,
        parse("[year]-[month]-[day] [hour]:[minute]:[second]")?,
    );

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE)
        .with_ansi(false)
        .with_timer(timer)
        .with_writer(writer)
        .finish();

    set_global_default(subscriber).context(
        "could not set global default tracing subscriber, consider disabling logs if you are already setting one",
    )
}

fn get_log_file_name() -> anyhow::Result<String> {
    let format = parse("[year]-[month]-[day]_[hour]-[minute]-[second]_formalization_log.txt")?;
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    Ok(now.format(&format)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_names_are_time_stamped() {
        let name = get_log_file_name().unwrap();
        assert!(name.ends_with("_formalization_log.txt"));
        assert!(name.chars().take(4).all(|c| c.is_ascii_digit()));
    }
}
