// =============================================================================
// Bounded queues — inbound adapter events and outbound operator commands
// =============================================================================
//
// Both queues are single-producer-per-side, single-consumer (the engine).
// Pushes never block: a full queue drops the newest item and logs a warning
// rather than applying backpressure to the caller. The receiver half is
// wrapped in a `parking_lot::Mutex` purely so `drain()` can use synchronous
// `try_recv()` without an `.await`, since only the engine ever calls it.
// =============================================================================

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

use crate::events::InboundEvent;
use crate::types::Intent;

/// Default anti-starvation cap on events drained in a single engine cycle.
pub const DEFAULT_MAX_EVENTS_PER_DRAIN: usize = 256;

/// Operator-issued intent change.
#[derive(Debug, Clone, Copy)]
pub struct IntentCommand {
    pub cmd_id: u64,
    pub ts_wall_ms: i64,
    pub intent: Intent,
}

/// Operator-issued arm/disarm toggle.
#[derive(Debug, Clone, Copy)]
pub struct ArmCommand {
    pub cmd_id: u64,
    pub ts_wall_ms: i64,
    pub arm: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum Command {
    Intent(IntentCommand),
    Arm(ArmCommand),
}

/// Result of coalescing a batch of drained commands: last-write-wins per
/// command kind, so an operator mashing the intent button mid-cycle only
/// ever affects the engine once per cycle, with the most recent value.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoalescedBatch {
    pub intent: Option<Intent>,
    pub arm: Option<bool>,
    pub last_cmd_id: Option<u64>,
    pub last_cmd_ts_wall_ms: Option<i64>,
}

impl CoalescedBatch {
    fn apply(&mut self, cmd: Command) {
        let (cmd_id, ts_wall_ms) = match cmd {
            Command::Intent(c) => {
                self.intent = Some(c.intent);
                (c.cmd_id, c.ts_wall_ms)
            }
            Command::Arm(c) => {
                self.arm = Some(c.arm);
                (c.cmd_id, c.ts_wall_ms)
            }
        };
        self.last_cmd_id = Some(cmd_id);
        self.last_cmd_ts_wall_ms = Some(ts_wall_ms);
    }
}

/// Coalesce a batch of commands in arrival order, last-write-wins per kind.
pub fn coalesce(commands: Vec<Command>) -> CoalescedBatch {
    let mut batch = CoalescedBatch::default();
    for cmd in commands {
        batch.apply(cmd);
    }
    batch
}

/// Bounded, non-blocking inbound event queue: adapter → engine.
pub struct InboundQueue {
    tx: mpsc::Sender<InboundEvent>,
    rx: Mutex<mpsc::Receiver<InboundEvent>>,
}

impl InboundQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Push an event. Drops and logs on a full queue rather than blocking
    /// the adapter's event loop.
    pub fn push(&self, event: InboundEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.tx.try_send(event) {
            warn!("inbound queue full, dropping event");
        }
    }

    /// Drain up to `max` queued events, oldest first. Returns fewer than
    /// `max` if the queue empties first.
    pub fn drain(&self, max: usize) -> Vec<InboundEvent> {
        let mut rx = self.rx.lock();
        let mut out = Vec::with_capacity(max.min(64));
        while out.len() < max {
            match rx.try_recv() {
                Ok(event) => out.push(event),
                Err(_) => break,
            }
        }
        out
    }
}

/// Bounded, non-blocking command queue: operator (REST/WS) → engine.
pub struct CommandQueue {
    tx: mpsc::Sender<Command>,
    rx: Mutex<mpsc::Receiver<Command>>,
}

impl CommandQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub fn push(&self, cmd: Command) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.tx.try_send(cmd) {
            warn!("command queue full, dropping command");
        }
    }

    /// Drain all currently-queued commands, unbounded: commands are rare
    /// and coalesced immediately, so there is no anti-starvation concern.
    pub fn drain_all(&self) -> Vec<Command> {
        let mut rx = self.rx.lock();
        let mut out = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            out.push(cmd);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesce_keeps_last_value_per_kind() {
        let batch = coalesce(vec![
            Command::Intent(IntentCommand {
                cmd_id: 1,
                ts_wall_ms: 100,
                intent: Intent::Long,
            }),
            Command::Arm(ArmCommand {
                cmd_id: 2,
                ts_wall_ms: 150,
                arm: true,
            }),
            Command::Intent(IntentCommand {
                cmd_id: 3,
                ts_wall_ms: 200,
                intent: Intent::Flat,
            }),
        ]);
        assert_eq!(batch.intent, Some(Intent::Flat));
        assert_eq!(batch.arm, Some(true));
        assert_eq!(batch.last_cmd_id, Some(3));
        assert_eq!(batch.last_cmd_ts_wall_ms, Some(200));
    }

    #[test]
    fn coalesce_of_empty_batch_is_all_none() {
        let batch = coalesce(vec![]);
        assert!(batch.intent.is_none());
        assert!(batch.arm.is_none());
        assert!(batch.last_cmd_id.is_none());
    }

    #[test]
    fn inbound_queue_drains_in_order_up_to_cap() {
        let q = InboundQueue::new(10);
        for i in 0..5u64 {
            q.push(InboundEvent::AdapterError(crate::events::AdapterErrorEvent {
                ts_recv_mono_ns: i,
                ts_recv_wall_ms: i as i64,
                error_code: 0,
                message: String::new(),
                request_id: None,
            }));
        }
        let drained = q.drain(3);
        assert_eq!(drained.len(), 3);
        let remaining = q.drain(10);
        assert_eq!(remaining.len(), 2);
    }

    #[test]
    fn command_queue_push_then_drain_all() {
        let q = CommandQueue::new(10);
        q.push(Command::Arm(ArmCommand {
            cmd_id: 1,
            ts_wall_ms: 0,
            arm: true,
        }));
        q.push(Command::Arm(ArmCommand {
            cmd_id: 2,
            ts_wall_ms: 0,
            arm: false,
        }));
        let drained = q.drain_all();
        assert_eq!(drained.len(), 2);
        assert!(q.drain_all().is_empty());
    }
}
