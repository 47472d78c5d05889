//! State change events read from a line stream
//!
//! One event per line, `<field>=<bool>`, e.g. `active=true` or
//! `sealed=false`. Blank lines and lines starting with `#` are skipped.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use halabel_core::{HaField, ServiceRegistration};

/// Parse a single `<field>=<bool>` event
pub fn parse_event(line: &str) -> Result<(HaField, bool)> {
    let (field, value) = line
        .split_once('=')
        .with_context(|| format!("expected <field>=<bool>, got {:?}", line))?;
    let field: HaField = field.trim().parse()?;
    let value: bool = value
        .trim()
        .parse()
        .with_context(|| format!("invalid value for {}: {:?}", field, value.trim()))?;
    Ok((field, value))
}

/// Forward events from `reader` to `registration` until end of input or
/// until `shutdown` turns `true` (or its sender is dropped).
///
/// Malformed lines and failed notifications are logged and skipped. A
/// notification already in flight completes before shutdown is observed.
pub async fn forward_events<R, S>(
    reader: R,
    registration: &S,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    S: ServiceRegistration,
{
    let mut lines = reader.lines();
    loop {
        let line = tokio::select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => {
                debug!("Shutdown requested, no longer reading state events");
                break;
            }
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
        };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (field, value) = match parse_event(line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = line, error = %e, "Ignoring malformed state event");
                continue;
            }
        };

        match registration.notify(field, value).await {
            Ok(()) => info!(field = %field, value = value, "HA state changed"),
            Err(e) => warn!(
                field = %field,
                value = value,
                error = %e,
                "Failed to record HA state change"
            ),
        }
    }
    Ok(())
}
