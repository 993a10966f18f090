// =============================================================================
// TriggerCardLogger — crash-tolerant, append-only audit trail
// =============================================================================
//
// Runs at a decoupled, much slower cadence than the engine loop (1 Hz by
// default). Every write is flushed and fsynced before returning so that a
// hard crash immediately after a write never loses that line — the cost is
// paid once per cadence interval, not once per engine cycle.
// =============================================================================

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::clock::SharedClock;
use crate::snapshot::Snapshot;

pub const SCHEMA_VERSION: &str = "triggercard.v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerCard {
    pub schema_version: String,
    pub run_id: String,
    #[serde(rename = "ts_unix_ms")]
    pub ts_wall_ms: i64,
    pub snapshot_id: u64,
    pub ready: bool,
    pub ready_reasons: Vec<String>,
}

impl TriggerCard {
    pub fn from_snapshot(snapshot: &Snapshot, run_id: &str, ts_wall_ms: i64) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: run_id.to_string(),
            ts_wall_ms,
            snapshot_id: snapshot.snapshot_id,
            ready: snapshot.ready,
            ready_reasons: snapshot.ready_reasons.clone(),
        }
    }
}

struct LoggerState {
    last_emit_mono_ns: Option<u64>,
    current_file: Option<File>,
    current_date: Option<String>,
}

pub struct TriggerCardLogger {
    run_id: String,
    log_dir: PathBuf,
    cadence_interval_ns: u64,
    clock: SharedClock,
    state: Mutex<LoggerState>,
}

impl TriggerCardLogger {
    pub fn new(run_id: String, log_dir: PathBuf, cadence_hz: f64, clock: SharedClock) -> Self {
        let cadence_interval_ns = if cadence_hz > 0.0 {
            (1_000_000_000.0 / cadence_hz) as u64
        } else {
            1_000_000_000
        };
        Self {
            run_id,
            log_dir,
            cadence_interval_ns,
            clock,
            state: Mutex::new(LoggerState {
                last_emit_mono_ns: None,
                current_file: None,
                current_date: None,
            }),
        }
    }

    fn should_emit(&self, now_mono_ns: u64, last_emit: Option<u64>) -> bool {
        match last_emit {
            None => true,
            Some(last) => now_mono_ns.saturating_sub(last) >= self.cadence_interval_ns,
        }
    }

    fn file_path(&self, date: &str) -> PathBuf {
        self.log_dir
            .join(format!("triggercards_{date}_{}.jsonl", self.run_id))
    }

    fn ensure_file(&self, state: &mut LoggerState, date: &str) -> std::io::Result<()> {
        if state.current_date.as_deref() == Some(date) && state.current_file.is_some() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.log_dir)?;
        let path = self.file_path(date);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        state.current_file = Some(file);
        state.current_date = Some(date.to_string());
        Ok(())
    }

    /// Called once per engine cycle. No-ops unless the cadence interval has
    /// elapsed. Rotation or write failures are logged and swallowed — audit
    /// logging must never interrupt the engine loop.
    pub fn tick(&self, now_mono_ns: u64, snapshot: Option<&Snapshot>) {
        let Some(snapshot) = snapshot else { return };

        let mut state = self.state.lock();
        if !self.should_emit(now_mono_ns, state.last_emit_mono_ns) {
            return;
        }

        let date = chrono::DateTime::from_timestamp_millis(self.clock.now_wall_ms())
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown-date".to_string());

        if let Err(err) = self.ensure_file(&mut state, &date) {
            error!(error = %err, "failed to rotate triggercard log file");
            return;
        }

        let card = TriggerCard::from_snapshot(snapshot, &self.run_id, snapshot.cycle_start_wall_ms);
        let line = match serde_json::to_string(&card) {
            Ok(line) => line,
            Err(err) => {
                error!(error = %err, "failed to serialize triggercard");
                return;
            }
        };

        let write_result = (|| -> std::io::Result<()> {
            let file = state.current_file.as_mut().expect("ensured above");
            writeln!(file, "{line}")?;
            file.flush()?;
            file.sync_data()?;
            Ok(())
        })();

        match write_result {
            Ok(()) => state.last_emit_mono_ns = Some(now_mono_ns),
            Err(err) => warn!(error = %err, "failed to write triggercard line"),
        }
    }
}
