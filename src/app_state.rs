// =============================================================================
// Central Application State — dashboard-facing wiring around the engine
// =============================================================================
//
// Unlike the engine's own `Inner`, `AppState` holds nothing the engine reads.
// It exists purely so the REST/WS handlers have one place to reach the
// `DataHub` for reads and the `CommandQueue` for operator writes.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::clock::SharedClock;
use crate::datahub::DataHub;
use crate::queues::{ArmCommand, Command, CommandQueue, IntentCommand};
use crate::types::Intent;

pub struct AppState {
    pub datahub: Arc<DataHub>,
    pub commands: Arc<CommandQueue>,
    pub clock: SharedClock,
    pub run_id: String,
    pub start_time: std::time::Instant,
    cmd_id_counter: AtomicU64,
}

impl AppState {
    pub fn new(
        datahub: Arc<DataHub>,
        commands: Arc<CommandQueue>,
        clock: SharedClock,
        run_id: String,
    ) -> Self {
        Self {
            datahub,
            commands,
            clock,
            run_id,
            start_time: std::time::Instant::now(),
            cmd_id_counter: AtomicU64::new(0),
        }
    }

    fn next_cmd_id(&self) -> u64 {
        self.cmd_id_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn push_intent(&self, intent: Intent) -> u64 {
        let cmd_id = self.next_cmd_id();
        self.commands.push(Command::Intent(IntentCommand {
            cmd_id,
            ts_wall_ms: self.clock.now_wall_ms(),
            intent,
        }));
        cmd_id
    }

    pub fn push_arm(&self, arm: bool) -> u64 {
        let cmd_id = self.next_cmd_id();
        self.commands.push(Command::Arm(ArmCommand {
            cmd_id,
            ts_wall_ms: self.clock.now_wall_ms(),
            arm,
        }));
        cmd_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FrozenClock;

    #[test]
    fn pushed_commands_get_increasing_ids() {
        let state = AppState::new(
            Arc::new(DataHub::new()),
            Arc::new(CommandQueue::new(10)),
            Arc::new(FrozenClock::new(0, 0)),
            "test-run".to_string(),
        );
        let first = state.push_arm(true);
        let second = state.push_intent(Intent::Long);
        assert!(second > first);
    }
}
