// =============================================================================
// EngineLoop — the single writer of Snapshots
// =============================================================================
//
// One task, one `RwLock<Inner>`, never held across an `.await`. Each cycle:
// capture timestamps, drain commands (coalesced), drain events (applied in
// order), recompute derived state (session, staleness, spread), evaluate the
// Hard Gates, build and publish a Snapshot, tick the audit logger, sleep to
// the next tick boundary.
// =============================================================================

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::clock::{Session, SharedClock};
use crate::config::IbkrContractConfig;
use crate::datahub::DataHub;
use crate::events::{InboundEvent, MarketDataMode};
use crate::gates::{evaluate_hard_gates, GateInputs};
use crate::queues::{coalesce, Command, CommandQueue, InboundQueue};
use crate::snapshot::{
    Controls, Feed, GatesInfo, Instrument, LoopInfo, Quote, SessionInfo, Snapshot, SCHEMA_VERSION,
};
use crate::trigger_card::TriggerCardLogger;
use crate::types::Intent;

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub cycle_target_ms: u64,
    pub overrun_threshold_ms: u64,
    pub stale_threshold_ms: i64,
    pub feed_heartbeat_timeout_ms: i64,
    pub max_spread_ticks: i64,
    pub anti_starvation_event_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cycle_target_ms: 100,
            overrun_threshold_ms: 500,
            stale_threshold_ms: crate::gates::DEFAULT_STALE_THRESHOLD_MS,
            feed_heartbeat_timeout_ms: crate::gates::DEFAULT_FEED_HEARTBEAT_TIMEOUT_MS,
            max_spread_ticks: crate::gates::DEFAULT_MAX_SPREAD_TICKS,
            anti_starvation_event_cap: crate::queues::DEFAULT_MAX_EVENTS_PER_DRAIN,
        }
    }
}

/// Mutable per-cycle engine state, held behind a single lock.
struct Inner {
    intent: Intent,
    arm: bool,
    last_cmd_id: u64,
    last_cmd_ts_wall_ms: Option<i64>,

    connected: bool,
    md_mode: MarketDataMode,
    feed_reason: Vec<String>,
    last_status_change_mono_ns: Option<u64>,

    con_id: Option<i64>,
    bid: Option<f64>,
    ask: Option<f64>,
    last: Option<f64>,
    bid_size: Option<f64>,
    ask_size: Option<f64>,
    ts_recv_wall_ms: Option<i64>,
    ts_recv_mono_ns: Option<u64>,
    ts_exch_wall_ms: Option<i64>,

    last_any_event_mono_ns: Option<u64>,
    last_quote_event_mono_ns: Option<u64>,
    quotes_received_count: u64,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            intent: Intent::Flat,
            arm: false,
            last_cmd_id: 0,
            last_cmd_ts_wall_ms: None,
            connected: false,
            md_mode: MarketDataMode::None,
            feed_reason: Vec::new(),
            last_status_change_mono_ns: None,
            con_id: None,
            bid: None,
            ask: None,
            last: None,
            bid_size: None,
            ask_size: None,
            ts_recv_wall_ms: None,
            ts_recv_mono_ns: None,
            ts_exch_wall_ms: None,
            last_any_event_mono_ns: None,
            last_quote_event_mono_ns: None,
            quotes_received_count: 0,
        }
    }
}

pub struct EngineLoop {
    config: EngineConfig,
    instrument_symbol: String,
    instrument_tick_size: f64,
    contract: Option<IbkrContractConfig>,
    clock: SharedClock,
    session: Session,
    inbound: Arc<InboundQueue>,
    commands: Arc<CommandQueue>,
    datahub: Arc<DataHub>,
    logger: Option<Arc<TriggerCardLogger>>,
    run_id: String,
    run_start_wall_ms: i64,
    snapshot_id: AtomicU64,
    inner: RwLock<Inner>,
    running: AtomicBool,
}

impl EngineLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        instrument_symbol: String,
        instrument_tick_size: f64,
        contract: Option<IbkrContractConfig>,
        clock: SharedClock,
        session: Session,
        inbound: Arc<InboundQueue>,
        commands: Arc<CommandQueue>,
        datahub: Arc<DataHub>,
        logger: Option<Arc<TriggerCardLogger>>,
        run_id: String,
    ) -> Self {
        let run_start_wall_ms = clock.now_wall_ms();
        Self {
            config,
            instrument_symbol,
            instrument_tick_size,
            contract,
            clock,
            session,
            inbound,
            commands,
            datahub,
            logger,
            run_id,
            run_start_wall_ms,
            snapshot_id: AtomicU64::new(0),
            inner: RwLock::new(Inner::default()),
            running: AtomicBool::new(true),
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    fn contract_key(&self) -> String {
        self.contract
            .as_ref()
            .map(|c| c.contract_key())
            .unwrap_or_else(|| self.instrument_symbol.clone())
    }

    /// Run cycles until `stop()` is called. Sleeps between cycles to the
    /// cycle target, accounting for time already spent in this cycle.
    pub async fn run(self: Arc<Self>) {
        info!(run_id = %self.run_id, "engine loop starting");
        while self.running.load(Ordering::Relaxed) {
            let cycle_start_mono_ns = self.clock.now_mono_ns();
            self.run_cycle(cycle_start_mono_ns);

            let elapsed_ns = self.clock.now_mono_ns().saturating_sub(cycle_start_mono_ns);
            let target_ns = self.config.cycle_target_ms * 1_000_000;
            if elapsed_ns < target_ns {
                tokio::time::sleep(std::time::Duration::from_nanos(target_ns - elapsed_ns)).await;
            }
        }
        info!(run_id = %self.run_id, "engine loop stopped");
    }

    fn run_cycle(&self, cycle_start_mono_ns: u64) {
        let cycle_start_wall_ms = self.clock.now_wall_ms();
        let snapshot_id = self.snapshot_id.fetch_add(1, Ordering::Relaxed) + 1;

        let commands = self.commands.drain_all();
        let batch = coalesce(commands);

        let events = self.inbound.drain(self.config.anti_starvation_event_cap);
        let mut fresh_adapter_errors = Vec::new();

        {
            let mut inner = self.inner.write();

            if let Some(intent) = batch.intent {
                inner.intent = intent;
            }
            if let Some(arm) = batch.arm {
                inner.arm = arm;
            }
            if let Some(cmd_id) = batch.last_cmd_id {
                inner.last_cmd_id = cmd_id;
                inner.last_cmd_ts_wall_ms = batch.last_cmd_ts_wall_ms;
            }

            for event in &events {
                inner.last_any_event_mono_ns = Some(match event {
                    InboundEvent::Quote(q) => q.ts_recv_mono_ns,
                    InboundEvent::Status(s) => s.ts_recv_mono_ns,
                    InboundEvent::AdapterError(e) => e.ts_recv_mono_ns,
                });

                match event {
                    InboundEvent::Quote(quote) => {
                        if quote.con_id.is_some() {
                            inner.con_id = quote.con_id;
                        }
                        if quote.bid.is_some() {
                            inner.bid = quote.bid;
                        }
                        if quote.ask.is_some() {
                            inner.ask = quote.ask;
                        }
                        if quote.last.is_some() {
                            inner.last = quote.last;
                        }
                        if quote.bid_size.is_some() {
                            inner.bid_size = quote.bid_size;
                        }
                        if quote.ask_size.is_some() {
                            inner.ask_size = quote.ask_size;
                        }
                        inner.ts_recv_wall_ms = Some(quote.ts_recv_wall_ms);
                        inner.ts_recv_mono_ns = Some(quote.ts_recv_mono_ns);
                        if quote.ts_exch_wall_ms.is_some() {
                            inner.ts_exch_wall_ms = quote.ts_exch_wall_ms;
                        }
                        inner.last_quote_event_mono_ns = Some(quote.ts_recv_mono_ns);
                        if quote.has_any_price() {
                            inner.quotes_received_count += 1;
                        }
                    }
                    InboundEvent::Status(status) => {
                        let changed = status.connected != inner.connected
                            || status.md_mode != inner.md_mode;
                        if changed {
                            inner.last_status_change_mono_ns = Some(status.ts_recv_mono_ns);
                        }
                        inner.connected = status.connected;
                        inner.md_mode = status.md_mode;
                        inner.feed_reason = status.reason.clone().into_iter().collect();
                    }
                    InboundEvent::AdapterError(err) => {
                        fresh_adapter_errors.push(format!("ADAPTER_ERROR_{}", err.error_code));
                    }
                }
            }
        }

        let now_local = self.clock.now_local();
        let in_operating_window = self.session.in_operating_window(now_local);
        let is_break_window = self.session.is_break_window(now_local);
        let session_phase = self.session.session_phase(now_local);
        let session_date_iso = self.session.session_date_iso(now_local);

        let snapshot = {
            let inner = self.inner.read();

            let staleness_ms = inner
                .ts_recv_mono_ns
                .map(|ts| (cycle_start_mono_ns.saturating_sub(ts)) / 1_000_000);
            let last_quote_event_age_ms = inner
                .last_quote_event_mono_ns
                .map(|ts| (cycle_start_mono_ns.saturating_sub(ts)) / 1_000_000);
            let spread_ticks = match (inner.bid, inner.ask) {
                (Some(bid), Some(ask)) if ask > bid && self.instrument_tick_size > 0.0 => {
                    Some(((ask - bid) / self.instrument_tick_size).ceil() as i64)
                }
                _ => None,
            };

            let pre_gate_elapsed_ms =
                self.clock.now_mono_ns().saturating_sub(cycle_start_mono_ns) / 1_000_000;
            let engine_degraded = pre_gate_elapsed_ms > self.config.overrun_threshold_ms;

            let gate_inputs = GateInputs {
                arm: inner.arm,
                intent: inner.intent,
                in_operating_window,
                is_break_window,
                feed_connected: inner.connected,
                md_mode: inner.md_mode,
                con_id: inner.con_id,
                bid: inner.bid,
                ask: inner.ask,
                last: inner.last,
                staleness_ms: staleness_ms.map(|v| v as i64),
                last_quote_event_age_ms: last_quote_event_age_ms.map(|v| v as i64),
                has_seen_quote_event: inner.last_quote_event_mono_ns.is_some(),
                spread_ticks,
                engine_degraded,
                max_spread_ticks: self.config.max_spread_ticks,
                stale_threshold_ms: self.config.stale_threshold_ms,
                feed_heartbeat_timeout_ms: self.config.feed_heartbeat_timeout_ms,
            };
            let gates = evaluate_hard_gates(&gate_inputs);

            let feed_degraded = !inner.connected || inner.md_mode != MarketDataMode::Realtime;
            let mut feed_reason_codes = inner.feed_reason.clone();
            if !inner.connected {
                feed_reason_codes.push("FEED_DISCONNECTED".to_string());
            }
            if inner.md_mode != MarketDataMode::Realtime {
                feed_reason_codes.push("MD_NOT_REALTIME".to_string());
            }
            feed_reason_codes.extend(fresh_adapter_errors.iter().cloned());

            let cycle_ms = self.clock.now_mono_ns().saturating_sub(cycle_start_mono_ns) / 1_000_000;
            let cycle_overrun = cycle_ms > self.config.cycle_target_ms;

            if cycle_overrun {
                warn!(
                    run_id = %self.run_id,
                    snapshot_id,
                    cycle_ms,
                    "cycle_overrun"
                );
            }
            if engine_degraded {
                debug!(run_id = %self.run_id, snapshot_id, "engine_degraded");
            }

            Snapshot {
                schema_version: SCHEMA_VERSION.to_string(),
                run_id: self.run_id.clone(),
                run_start_wall_ms: self.run_start_wall_ms,
                snapshot_id,
                cycle_count: snapshot_id,
                cycle_start_wall_ms,
                cycle_start_mono_ns,
                instrument: Instrument {
                    symbol: self.instrument_symbol.clone(),
                    contract_key: self.contract_key(),
                    con_id: inner.con_id,
                    tick_size: self.instrument_tick_size,
                },
                feed: Feed {
                    connected: inner.connected,
                    md_mode: inner.md_mode,
                    degraded: feed_degraded,
                    reason_codes: feed_reason_codes,
                    last_status_change_mono_ns: inner.last_status_change_mono_ns,
                },
                quote: Quote {
                    bid: inner.bid,
                    ask: inner.ask,
                    last: inner.last,
                    bid_size: inner.bid_size,
                    ask_size: inner.ask_size,
                    ts_recv_wall_ms: inner.ts_recv_wall_ms,
                    ts_recv_mono_ns: inner.ts_recv_mono_ns,
                    ts_exch_wall_ms: inner.ts_exch_wall_ms,
                    staleness_ms: staleness_ms.map(|v| v as i64),
                    spread_ticks,
                },
                session: SessionInfo {
                    in_operating_window,
                    is_break_window,
                    session_phase: session_phase.to_string(),
                    session_date_iso,
                },
                controls: Controls {
                    intent: inner.intent,
                    arm: inner.arm,
                    last_cmd_id: inner.last_cmd_id,
                    last_cmd_ts_wall_ms: inner.last_cmd_ts_wall_ms,
                },
                loop_: LoopInfo {
                    cycle_ms,
                    cycle_overrun,
                    engine_degraded,
                    last_cycle_start_mono_ns: cycle_start_mono_ns,
                },
                gates: GatesInfo {
                    allowed: gates.allowed,
                    reason_codes: gates.reason_codes.clone(),
                    gate_metrics: serde_json::Value::Object(gates.gate_metrics),
                },
                last_any_event_mono_ns: inner.last_any_event_mono_ns,
                last_quote_event_mono_ns: inner.last_quote_event_mono_ns,
                quotes_received_count: inner.quotes_received_count,
                ready: gates.allowed,
                ready_reasons: gates.reason_codes,
            }
        };

        self.datahub.publish(snapshot.clone());
        if let Some(logger) = &self.logger {
            logger.tick(cycle_start_mono_ns, Some(&snapshot));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FrozenClock;
    use crate::events::{AdapterErrorEvent, QuoteEvent, StatusEvent};
    use crate::queues::{ArmCommand, IntentCommand};

    fn make_engine() -> Arc<EngineLoop> {
        let clock: SharedClock = Arc::new(FrozenClock::new(1_700_000_000_000, 0));
        Arc::new(EngineLoop::new(
            EngineConfig::default(),
            "MNQ".to_string(),
            0.25,
            None,
            clock,
            Session::default(),
            Arc::new(InboundQueue::new(100)),
            Arc::new(CommandQueue::new(100)),
            Arc::new(DataHub::new()),
            None,
            "test-run".to_string(),
        ))
    }

    #[test]
    fn snapshot_id_is_monotonic_across_cycles() {
        let engine = make_engine();
        engine.run_cycle(0);
        let first = engine.datahub.get_latest().unwrap().snapshot_id;
        engine.run_cycle(100_000_000);
        let second = engine.datahub.get_latest().unwrap().snapshot_id;
        assert_eq!(second, first + 1);
    }

    #[test]
    fn ready_is_exactly_gates_allowed() {
        let engine = make_engine();
        engine.run_cycle(0);
        let snap = engine.datahub.get_latest().unwrap();
        assert_eq!(snap.ready, snap.gates.allowed);
        assert_eq!(snap.ready_reasons, snap.gates.reason_codes);
    }

    #[test]
    fn commands_are_coalesced_before_engine_reads_them() {
        let engine = make_engine();
        engine.commands.push(Command::Arm(ArmCommand {
            cmd_id: 1,
            ts_wall_ms: 0,
            arm: true,
        }));
        engine.commands.push(Command::Intent(IntentCommand {
            cmd_id: 2,
            ts_wall_ms: 0,
            intent: Intent::Long,
        }));
        engine.commands.push(Command::Arm(ArmCommand {
            cmd_id: 3,
            ts_wall_ms: 0,
            arm: false,
        }));

        engine.run_cycle(0);
        let snap = engine.datahub.get_latest().unwrap();
        assert_eq!(snap.controls.arm, false);
        assert_eq!(snap.controls.intent, Intent::Long);
        assert_eq!(snap.controls.last_cmd_id, 3);
    }

    #[test]
    fn quote_with_only_con_id_clears_no_contract_without_counting_as_received() {
        let engine = make_engine();
        engine.inbound.push(InboundEvent::Quote(QuoteEvent {
            ts_recv_mono_ns: 0,
            ts_recv_wall_ms: 0,
            con_id: Some(42),
            bid: None,
            ask: None,
            last: None,
            bid_size: None,
            ask_size: None,
            ts_exch_wall_ms: None,
        }));
        engine.run_cycle(0);
        let snap = engine.datahub.get_latest().unwrap();
        assert_eq!(snap.instrument.con_id, Some(42));
        assert_eq!(snap.quotes_received_count, 0);
    }

    #[test]
    fn priced_quote_increments_quotes_received_count() {
        let engine = make_engine();
        engine.inbound.push(InboundEvent::Quote(QuoteEvent {
            ts_recv_mono_ns: 0,
            ts_recv_wall_ms: 0,
            con_id: Some(42),
            bid: Some(100.0),
            ask: Some(100.25),
            last: Some(100.0),
            bid_size: Some(1.0),
            ask_size: Some(1.0),
            ts_exch_wall_ms: None,
        }));
        engine.run_cycle(0);
        let snap = engine.datahub.get_latest().unwrap();
        assert_eq!(snap.quotes_received_count, 1);
        assert_eq!(snap.quote.spread_ticks, Some(1));
    }

    #[test]
    fn status_event_updates_feed_connectivity() {
        let engine = make_engine();
        engine.inbound.push(InboundEvent::Status(StatusEvent {
            ts_recv_mono_ns: 0,
            ts_recv_wall_ms: 0,
            connected: true,
            md_mode: MarketDataMode::Realtime,
            reason: Some("connected".to_string()),
            error_code: None,
        }));
        engine.run_cycle(0);
        let snap = engine.datahub.get_latest().unwrap();
        assert!(snap.feed.connected);
        assert_eq!(snap.feed.md_mode, MarketDataMode::Realtime);
        assert!(!snap.feed.degraded);
        assert!(snap.feed.reason_codes.is_empty());
    }

    #[test]
    fn repeat_status_event_does_not_reset_last_status_change() {
        let engine = make_engine();
        engine.inbound.push(InboundEvent::Status(StatusEvent {
            ts_recv_mono_ns: 100,
            ts_recv_wall_ms: 0,
            connected: true,
            md_mode: MarketDataMode::Realtime,
            reason: Some("connected".to_string()),
            error_code: None,
        }));
        engine.run_cycle(0);
        let first = engine.datahub.get_latest().unwrap();
        assert_eq!(first.feed.last_status_change_mono_ns, Some(100));

        engine.inbound.push(InboundEvent::Status(StatusEvent {
            ts_recv_mono_ns: 200,
            ts_recv_wall_ms: 0,
            connected: true,
            md_mode: MarketDataMode::Realtime,
            reason: Some("still connected".to_string()),
            error_code: None,
        }));
        engine.run_cycle(100_000_000);
        let second = engine.datahub.get_latest().unwrap();
        assert_eq!(second.feed.last_status_change_mono_ns, Some(100));

        engine.inbound.push(InboundEvent::Status(StatusEvent {
            ts_recv_mono_ns: 300,
            ts_recv_wall_ms: 0,
            connected: false,
            md_mode: MarketDataMode::None,
            reason: Some("disconnected".to_string()),
            error_code: None,
        }));
        engine.run_cycle(200_000_000);
        let third = engine.datahub.get_latest().unwrap();
        assert_eq!(third.feed.last_status_change_mono_ns, Some(300));
    }

    #[test]
    fn feed_degraded_is_independent_of_engine_degraded() {
        let engine = make_engine();
        engine.run_cycle(0);
        let snap = engine.datahub.get_latest().unwrap();
        assert!(snap.feed.degraded);
        assert!(snap.feed.reason_codes.contains(&"FEED_DISCONNECTED".to_string()));
        assert!(snap.feed.reason_codes.contains(&"MD_NOT_REALTIME".to_string()));
        assert!(!snap.loop_.engine_degraded);
    }

    #[test]
    fn spread_ticks_uses_conservative_ceiling() {
        let engine = make_engine();
        engine.inbound.push(InboundEvent::Quote(QuoteEvent {
            ts_recv_mono_ns: 0,
            ts_recv_wall_ms: 0,
            con_id: Some(42),
            bid: Some(18_500.00),
            ask: Some(18_500.30),
            last: Some(18_500.00),
            bid_size: None,
            ask_size: None,
            ts_exch_wall_ms: None,
        }));
        engine.run_cycle(0);
        let snap = engine.datahub.get_latest().unwrap();
        // tick_size=0.25: (0.30/0.25) = 1.2, ceil -> 2, never rounds down to 1.
        assert_eq!(snap.quote.spread_ticks, Some(2));
    }

    #[test]
    fn inverted_spread_yields_null_not_negative_ticks() {
        let engine = make_engine();
        engine.inbound.push(InboundEvent::Quote(QuoteEvent {
            ts_recv_mono_ns: 0,
            ts_recv_wall_ms: 0,
            con_id: Some(42),
            bid: Some(100.0),
            ask: Some(100.0),
            last: Some(100.0),
            bid_size: None,
            ask_size: None,
            ts_exch_wall_ms: None,
        }));
        engine.run_cycle(0);
        let snap = engine.datahub.get_latest().unwrap();
        assert_eq!(snap.quote.spread_ticks, None);
    }

    #[test]
    fn adapter_error_reason_is_ephemeral_not_accumulated() {
        let engine = make_engine();
        engine.inbound.push(InboundEvent::AdapterError(AdapterErrorEvent {
            ts_recv_mono_ns: 0,
            ts_recv_wall_ms: 0,
            error_code: 7,
            message: "boom".to_string(),
            request_id: None,
        }));
        engine.run_cycle(0);
        let first = engine.datahub.get_latest().unwrap();
        assert!(first.feed.reason_codes.iter().any(|r| r == "ADAPTER_ERROR_7"));

        engine.run_cycle(100_000_000);
        let second = engine.datahub.get_latest().unwrap();
        assert!(!second.feed.reason_codes.iter().any(|r| r == "ADAPTER_ERROR_7"));
    }
}
