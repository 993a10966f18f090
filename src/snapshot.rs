// =============================================================================
// Snapshot — the single immutable artifact the engine publishes each cycle
// =============================================================================
//
// Every reader (dashboard REST/WS, trigger-card logger) sees only complete,
// self-consistent snapshots. There is no API for partial reads of engine
// state — you either hold an `Arc<Snapshot>` or you don't.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::events::MarketDataMode;
use crate::types::Intent;

pub const SCHEMA_VERSION: &str = "snapshot.v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub contract_key: String,
    pub con_id: Option<i64>,
    pub tick_size: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub connected: bool,
    pub md_mode: MarketDataMode,
    pub degraded: bool,
    pub reason_codes: Vec<String>,
    pub last_status_change_mono_ns: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last: Option<f64>,
    pub bid_size: Option<f64>,
    pub ask_size: Option<f64>,
    pub ts_recv_wall_ms: Option<i64>,
    pub ts_recv_mono_ns: Option<u64>,
    pub ts_exch_wall_ms: Option<i64>,
    pub staleness_ms: Option<i64>,
    pub spread_ticks: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub in_operating_window: bool,
    pub is_break_window: bool,
    pub session_phase: String,
    pub session_date_iso: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Controls {
    pub intent: Intent,
    pub arm: bool,
    pub last_cmd_id: u64,
    pub last_cmd_ts_wall_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopInfo {
    pub cycle_ms: u64,
    pub cycle_overrun: bool,
    pub engine_degraded: bool,
    pub last_cycle_start_mono_ns: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatesInfo {
    pub allowed: bool,
    pub reason_codes: Vec<String>,
    pub gate_metrics: serde_json::Value,
}

/// The full state of the kernel at one engine cycle, produced by exactly
/// one writer and read by arbitrarily many readers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: String,
    pub run_id: String,
    pub run_start_wall_ms: i64,
    pub snapshot_id: u64,
    pub cycle_count: u64,
    pub cycle_start_wall_ms: i64,
    pub cycle_start_mono_ns: u64,
    pub instrument: Instrument,
    pub feed: Feed,
    pub quote: Quote,
    pub session: SessionInfo,
    pub controls: Controls,
    #[serde(rename = "loop")]
    pub loop_: LoopInfo,
    pub gates: GatesInfo,
    pub last_any_event_mono_ns: Option<u64>,
    pub last_quote_event_mono_ns: Option<u64>,
    pub quotes_received_count: u64,
    pub ready: bool,
    pub ready_reasons: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gates::{evaluate_hard_gates, GateInputs};

    #[test]
    fn ready_mirrors_gates_allowed_invariant() {
        let gates = evaluate_hard_gates(&GateInputs::default());
        let ready = gates.allowed;
        let ready_reasons = gates.reason_codes.clone();
        assert_eq!(ready, false);
        assert!(!ready_reasons.is_empty());
    }

    #[test]
    fn snapshot_serializes_loop_field_under_loop_keyword() {
        let snap = Snapshot {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: "test-run".to_string(),
            run_start_wall_ms: 0,
            snapshot_id: 1,
            cycle_count: 1,
            cycle_start_wall_ms: 0,
            cycle_start_mono_ns: 0,
            instrument: Instrument {
                symbol: "MNQ".to_string(),
                contract_key: "MNQ.202603".to_string(),
                con_id: None,
                tick_size: 0.25,
            },
            feed: Feed {
                connected: false,
                md_mode: MarketDataMode::None,
                degraded: false,
                reason_codes: vec![],
                last_status_change_mono_ns: None,
            },
            quote: Quote {
                bid: None,
                ask: None,
                last: None,
                bid_size: None,
                ask_size: None,
                ts_recv_wall_ms: None,
                ts_recv_mono_ns: None,
                ts_exch_wall_ms: None,
                staleness_ms: None,
                spread_ticks: None,
            },
            session: SessionInfo {
                in_operating_window: false,
                is_break_window: false,
                session_phase: "CLOSED".to_string(),
                session_date_iso: "2026-03-16".to_string(),
            },
            controls: Controls {
                intent: Intent::Flat,
                arm: false,
                last_cmd_id: 0,
                last_cmd_ts_wall_ms: None,
            },
            loop_: LoopInfo {
                cycle_ms: 100,
                cycle_overrun: false,
                engine_degraded: false,
                last_cycle_start_mono_ns: 0,
            },
            gates: GatesInfo {
                allowed: false,
                reason_codes: vec!["ARM_OFF".to_string()],
                gate_metrics: serde_json::json!({}),
            },
            last_any_event_mono_ns: None,
            last_quote_event_mono_ns: None,
            quotes_received_count: 0,
            ready: false,
            ready_reasons: vec!["ARM_OFF".to_string()],
        };

        let value = serde_json::to_value(&snap).unwrap();
        assert!(value.get("loop").is_some());
        assert!(value.get("loop_").is_none());
    }
}
