// =============================================================================
// Clock & Session — injectable time source and operating/break window logic
// =============================================================================
//
// All staleness and age calculations in the engine use monotonic time only.
// Wall-clock time is used exclusively for display and for the session-date
// calendar roll. `Clock` is a trait so that tests can freeze wall and
// monotonic time independently of each other and of the real system clock.
// =============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local, TimeZone, Timelike, Utc};

/// Default start of the daily break window (local hour, 24h clock).
pub const DEFAULT_BREAK_START_HOUR: u32 = 17;
/// Default end of the daily break window (local hour, exclusive).
pub const DEFAULT_BREAK_END_HOUR: u32 = 18;
/// Default start of the operating window (local hour).
pub const DEFAULT_OPERATING_START_HOUR: u32 = 7;
/// Default end of the operating window (local hour, exclusive).
pub const DEFAULT_OPERATING_END_HOUR: u32 = 16;

/// Injectable time source. Implementations must guarantee that
/// `now_mono_ns` never decreases across calls on the same process.
pub trait Clock: Send + Sync {
    /// Wall-clock time in milliseconds since the Unix epoch (UTC).
    fn now_wall_ms(&self) -> i64;

    /// Monotonic time in nanoseconds. Never decreases.
    fn now_mono_ns(&self) -> u64;

    /// Current local datetime, used for session-window computation.
    fn now_local(&self) -> DateTime<Local>;

    /// Current UTC datetime.
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Real system clock. Monotonic reads are relative to process start via
/// `Instant`, which the standard library guarantees is non-decreasing.
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_wall_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn now_mono_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn now_local(&self) -> DateTime<Local> {
        Local::now()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Deterministic clock for tests: wall and monotonic time are frozen
/// independently and only ever advanced explicitly.
pub struct FrozenClock {
    inner: parking_lot::RwLock<FrozenState>,
}

struct FrozenState {
    wall_ms: i64,
    mono_ns: u64,
}

impl FrozenClock {
    pub fn new(wall_ms: i64, mono_ns: u64) -> Self {
        Self {
            inner: parking_lot::RwLock::new(FrozenState { wall_ms, mono_ns }),
        }
    }

    pub fn advance_mono_ns(&self, delta_ns: u64) {
        self.inner.write().mono_ns += delta_ns;
    }

    pub fn set_wall_ms(&self, wall_ms: i64) {
        self.inner.write().wall_ms = wall_ms;
    }

    pub fn advance_wall_ms(&self, delta_ms: i64) {
        self.inner.write().wall_ms += delta_ms;
    }
}

impl Clock for FrozenClock {
    fn now_wall_ms(&self) -> i64 {
        self.inner.read().wall_ms
    }

    fn now_mono_ns(&self) -> u64 {
        self.inner.read().mono_ns
    }

    fn now_local(&self) -> DateTime<Local> {
        Local.timestamp_millis_opt(self.now_wall_ms()).unwrap()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.now_wall_ms()).unwrap()
    }
}

/// Session phase derived from the current local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SessionPhase {
    Operating,
    Break,
    Closed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operating => write!(f, "OPERATING"),
            Self::Break => write!(f, "BREAK"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// 23-hour session with a 1-hour daily break and a configurable operating
/// window. See spec §4.6 for the exact roll semantics.
#[derive(Debug, Clone, Copy)]
pub struct Session {
    pub operating_start_hour: u32,
    pub operating_end_hour: u32,
    pub break_start_hour: u32,
    pub break_end_hour: u32,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            operating_start_hour: DEFAULT_OPERATING_START_HOUR,
            operating_end_hour: DEFAULT_OPERATING_END_HOUR,
            break_start_hour: DEFAULT_BREAK_START_HOUR,
            break_end_hour: DEFAULT_BREAK_END_HOUR,
        }
    }
}

impl Session {
    /// Session date rolls at `break_start_hour`: local time at or past the
    /// break start belongs to tomorrow's session.
    pub fn session_date_iso(&self, now_local: DateTime<Local>) -> String {
        if now_local.hour() >= self.break_start_hour {
            (now_local + chrono::Duration::days(1))
                .date_naive()
                .format("%Y-%m-%d")
                .to_string()
        } else {
            now_local.date_naive().format("%Y-%m-%d").to_string()
        }
    }

    pub fn is_break_window(&self, now_local: DateTime<Local>) -> bool {
        let hour = now_local.hour();
        hour >= self.break_start_hour && hour < self.break_end_hour
    }

    pub fn in_operating_window(&self, now_local: DateTime<Local>) -> bool {
        let hour = now_local.hour();
        hour >= self.operating_start_hour && hour < self.operating_end_hour
    }

    pub fn session_phase(&self, now_local: DateTime<Local>) -> SessionPhase {
        if self.is_break_window(now_local) {
            SessionPhase::Break
        } else if self.in_operating_window(now_local) {
            SessionPhase::Operating
        } else {
            SessionPhase::Closed
        }
    }
}

/// Convenience alias used throughout the engine for the shared clock handle.
pub type SharedClock = Arc<dyn Clock>;
