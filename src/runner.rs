//! # Runner
//!
//! Drives the engine from a line supply on a fixed tick:
//!
//! - every line is fed to [`Engine::ingest`]; per-packet errors are already
//!   logged there and never stop the loop
//! - every `poll_interval` a record is assembled and handed to the sink
//! - a read timeout just lets the next tick fire
//! - losing the line supply ends the run with an error so the caller can
//!   reconnect
//!
//! Shutdown is checked first on every iteration and drops any pending read;
//! partial lines stay in the reader and are discarded with it.

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, trace};

use crate::error::{MeteostickError, Result};
use crate::record::ObservationRecord;
use crate::serial::{LineRead, LineSource};
use crate::station::{Engine, Timestamp};

/// How often pipeline statistics are logged
pub const STATS_LOG_INTERVAL: Duration = Duration::from_secs(300);

/// Consumer of assembled records
#[cfg_attr(test, mockall::automock)]
pub trait RecordSink: Send {
    /// # Errors
    ///
    /// Returns an error if the record cannot be delivered
    fn emit(&mut self, record: &ObservationRecord) -> Result<()>;
}

/// Writes one JSON object per line
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> RecordSink for JsonLinesSink<W> {
    fn emit(&mut self, record: &ObservationRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record).map_err(|e| MeteostickError::Io(e.into()))?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Run until `shutdown` resolves or the line supply fails.
///
/// # Errors
///
/// Returns the line supply error (`LineSupplyClosed`, `Io`) or a sink error.
pub async fn run<S, K, F>(
    engine: &mut Engine,
    source: &mut S,
    sink: &mut K,
    poll_interval: Duration,
    shutdown: F,
) -> Result<()>
where
    S: LineSource + ?Sized,
    K: RecordSink + ?Sized,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stats_ticker = interval(STATS_LOG_INTERVAL);
    stats_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Assembling observations every {:?}", poll_interval);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("Shutting down: {}", engine.stats());
                return Ok(());
            }

            _ = ticker.tick() => {
                let record = engine.tick(Timestamp::now());
                sink.emit(&record)?;
            }

            _ = stats_ticker.tick() => {
                info!("Pipeline: {}", engine.stats());
            }

            read = source.read_line() => match read? {
                LineRead::Line(line) => {
                    if let Err(e) = engine.ingest(&line) {
                        if !e.is_packet_local() {
                            return Err(e);
                        }
                    }
                }
                LineRead::Timeout => trace!("No line within read timeout"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::serial::port_trait::mocks::ScriptedLines;
    use mockall::Sequence;

    fn engine() -> Engine {
        Engine::new(&Config::default()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_record_every_tick() {
        let mut engine = engine();
        let mut source = ScriptedLines::lines(&["T 1 21.4 55 -62", "garbage line"]);

        let mut sink = MockRecordSink::new();
        let mut seq = Sequence::new();
        sink.expect_emit()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|r| r.get("outTemp").is_none())
            .returning(|_| Ok(()));
        sink.expect_emit()
            .times(2)
            .in_sequence(&mut seq)
            .withf(|r| r.get("outTemp") == Some(21.4))
            .returning(|_| Ok(()));

        let shutdown = tokio::time::sleep(Duration::from_millis(5100));
        run(&mut engine, &mut source, &mut sink, Duration::from_millis(2500), shutdown)
            .await
            .unwrap();

        assert_eq!(engine.stats().ticks, 3);
        assert_eq!(engine.stats().decoded, 1);
        assert_eq!(engine.stats().unknown, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_running() {
        let mut engine = engine();
        let mut source = ScriptedLines::new(vec![Ok(LineRead::Timeout), Ok(LineRead::Timeout)]);
        let mut sink = MockRecordSink::new();
        sink.expect_emit().times(1).returning(|_| Ok(()));

        let shutdown = tokio::time::sleep(Duration::from_secs(1));
        run(&mut engine, &mut source, &mut sink, Duration::from_secs(10), shutdown)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_supply_loss_ends_run() {
        let mut engine = engine();
        let mut source = ScriptedLines::new(vec![Err(MeteostickError::LineSupplyClosed)]);
        let mut sink = MockRecordSink::new();
        sink.expect_emit().returning(|_| Ok(()));

        let result = run(
            &mut engine,
            &mut source,
            &mut sink,
            Duration::from_secs(10),
            std::future::pending(),
        )
        .await;
        assert!(matches!(result, Err(MeteostickError::LineSupplyClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_error_ends_run() {
        let mut engine = engine();
        let mut source = ScriptedLines::new(Vec::new());
        let mut sink = MockRecordSink::new();
        sink.expect_emit()
            .returning(|_| Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe).into()));

        let result = run(
            &mut engine,
            &mut source,
            &mut sink,
            Duration::from_secs(1),
            std::future::pending(),
        )
        .await;
        assert!(matches!(result, Err(MeteostickError::Io(_))));
    }

    #[test]
    fn test_json_lines_sink() {
        let mut sink = JsonLinesSink::new(Vec::new());
        let mut record = ObservationRecord::new(1_700_000_000, 17);
        record.fields.insert("outTemp".to_string(), Some(3.5));
        record.fields.insert("rain".to_string(), None);
        sink.emit(&record).unwrap();
        sink.emit(&record).unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let json: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(json["timestamp"], 1_700_000_000);
        assert_eq!(json["outTemp"], 3.5);
        assert!(json["rain"].is_null());
    }
}
