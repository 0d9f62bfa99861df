use anyhow::{Context as AnyhowContext, Result};
use serde::Serialize;
use std::io::{self, Write};

/// Write one JSON document to stdout.
pub(crate) fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let body = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .context("Failed to serialize output")?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{body}")?;
    stdout.flush()?;
    Ok(())
}

/// Write one compact JSON value per line, flushed so pipes see it immediately.
pub(crate) fn print_json_line<T: Serialize>(value: &T) -> Result<()> {
    print_json(value, false)
}
