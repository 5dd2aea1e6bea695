use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use log::{info, warn};

use crate::telemetry::{TelemetryError, TelemetryReceiver, Timestamped};

use super::{CsvLogger, Record};

/// What a consumer saw before its channel closed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: usize,
    pub overruns: usize,
}

/// Calls `handle` for every sample until the producer goes away
fn consume<T>(
    rx: &TelemetryReceiver<T>,
    mut handle: impl FnMut(Timestamped<T>) -> Result<()>,
) -> Result<ConsumerStats> {
    let mut stats = ConsumerStats::default();

    loop {
        match rx.recv() {
            Ok(sample) => {
                handle(sample)?;
                stats.received += 1;
            }
            Err(TelemetryError::ClosedChannel) => break,
            Err(e) => return Err(e.into()),
        }
    }

    stats.overruns = rx.overruns();
    Ok(stats)
}

/// Writes every sample on `rx` to `logger` on a dedicated thread
pub fn spawn_csv_sink<T>(
    rx: TelemetryReceiver<T>,
    mut logger: CsvLogger,
) -> Result<JoinHandle<Result<ConsumerStats>>>
where
    T: Record + Send + 'static,
{
    let handle = thread::Builder::new()
        .name("csv-sink".to_string())
        .spawn(move || -> Result<ConsumerStats> {
            let stats = consume(&rx, |Timestamped(ts, sample)| {
                logger.log(&ts, &sample)?;
                Ok(())
            });
            logger.flush()?;

            let stats = stats?;
            info!(
                "Wrote {} rows to '{}'",
                logger.rows(),
                logger.path().display()
            );
            if stats.overruns > 0 {
                warn!("The csv sink fell behind and lost {} samples", stats.overruns);
            }

            Ok(stats)
        })
        .context("Cannot spawn csv sink thread")?;

    Ok(handle)
}

/// Prints a summary of every `every`-th sample and every alert
pub fn spawn_console_monitor<T>(
    rx: TelemetryReceiver<T>,
    every: usize,
) -> Result<JoinHandle<Result<ConsumerStats>>>
where
    T: Record + Send + 'static,
{
    let every = every.max(1);

    let handle = thread::Builder::new()
        .name("console-monitor".to_string())
        .spawn(move || -> Result<ConsumerStats> {
            let mut count = 0usize;

            consume(&rx, |Timestamped(ts, sample)| {
                if let Some(alert) = sample.alert() {
                    warn!("[{}] {}", ts.to_rfc3339(), alert);
                }
                if count % every == 0 {
                    info!("[{}] {}", ts.to_rfc3339(), sample.summary());
                }
                count += 1;

                Ok(())
            })
        })
        .context("Cannot spawn console monitor thread")?;

    Ok(handle)
}
