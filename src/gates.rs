// =============================================================================
// Hard Gates — the sole authority on whether the engine is allowed to trade
// =============================================================================
//
// `evaluate_hard_gates` is a pure function: no I/O, no clock reads, no
// locking. It is handed every fact it needs and returns every reason the
// answer is what it is. Unlike a typical circuit-breaker panel that stops at
// the first tripped condition, every one of the eleven conditions below is
// checked on every call — an operator staring at `reason_codes` must see the
// full picture, not whichever reason happened to be evaluated first.
// =============================================================================

use serde_json::{json, Map, Value};

use crate::events::MarketDataMode;
use crate::types::Intent;

pub const REASON_ARM_OFF: &str = "ARM_OFF";
pub const REASON_INTENT_FLAT: &str = "INTENT_FLAT";
pub const REASON_OUTSIDE_OPERATING_WINDOW: &str = "OUTSIDE_OPERATING_WINDOW";
pub const REASON_SESSION_BREAK: &str = "SESSION_BREAK";
pub const REASON_FEED_DISCONNECTED: &str = "FEED_DISCONNECTED";
pub const REASON_MD_NOT_REALTIME: &str = "MD_NOT_REALTIME";
pub const REASON_NO_CONTRACT: &str = "NO_CONTRACT";
pub const REASON_STALE_DATA: &str = "STALE_DATA";
pub const REASON_SPREAD_UNAVAILABLE: &str = "SPREAD_UNAVAILABLE";
pub const REASON_SPREAD_WIDE: &str = "SPREAD_WIDE";
pub const REASON_ENGINE_DEGRADED: &str = "ENGINE_DEGRADED";

pub const DEFAULT_STALE_THRESHOLD_MS: i64 = 5000;
pub const DEFAULT_FEED_HEARTBEAT_TIMEOUT_MS: i64 = 10_000;
pub const DEFAULT_MAX_SPREAD_TICKS: i64 = 4;

/// Every raw fact the gate panel needs to reach a verdict. Deliberately
/// flat: the engine assembles this from its own state each cycle, the
/// panel itself holds none.
#[derive(Debug, Clone)]
pub struct GateInputs {
    pub arm: bool,
    pub intent: Intent,
    pub in_operating_window: bool,
    pub is_break_window: bool,
    pub feed_connected: bool,
    pub md_mode: MarketDataMode,
    pub con_id: Option<i64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last: Option<f64>,
    pub staleness_ms: Option<i64>,
    pub last_quote_event_age_ms: Option<i64>,
    pub has_seen_quote_event: bool,
    pub spread_ticks: Option<i64>,
    pub engine_degraded: bool,
    pub max_spread_ticks: i64,
    pub stale_threshold_ms: i64,
    pub feed_heartbeat_timeout_ms: i64,
}

impl Default for GateInputs {
    fn default() -> Self {
        Self {
            arm: false,
            intent: Intent::Flat,
            in_operating_window: false,
            is_break_window: false,
            feed_connected: false,
            md_mode: MarketDataMode::None,
            con_id: None,
            bid: None,
            ask: None,
            last: None,
            staleness_ms: None,
            last_quote_event_age_ms: None,
            has_seen_quote_event: false,
            spread_ticks: None,
            engine_degraded: false,
            max_spread_ticks: DEFAULT_MAX_SPREAD_TICKS,
            stale_threshold_ms: DEFAULT_STALE_THRESHOLD_MS,
            feed_heartbeat_timeout_ms: DEFAULT_FEED_HEARTBEAT_TIMEOUT_MS,
        }
    }
}

/// Outcome of one gate evaluation: whether trading is allowed, every reason
/// it isn't (empty when allowed), and the raw metrics that produced them
/// for display in the dashboard.
#[derive(Debug, Clone)]
pub struct GateResult {
    pub allowed: bool,
    pub reason_codes: Vec<String>,
    pub gate_metrics: Map<String, Value>,
}

/// Evaluate all eleven Hard Gate conditions, in the fixed order below, with
/// no short-circuiting. `allowed` is true iff `reason_codes` is empty.
pub fn evaluate_hard_gates(inputs: &GateInputs) -> GateResult {
    let mut reasons = Vec::new();
    let mut metrics = Map::new();

    if !inputs.arm {
        reasons.push(REASON_ARM_OFF.to_string());
    }

    if inputs.intent == Intent::Flat {
        reasons.push(REASON_INTENT_FLAT.to_string());
    }

    if !inputs.in_operating_window {
        reasons.push(REASON_OUTSIDE_OPERATING_WINDOW.to_string());
    }

    if inputs.is_break_window {
        reasons.push(REASON_SESSION_BREAK.to_string());
    }

    if !inputs.feed_connected {
        reasons.push(REASON_FEED_DISCONNECTED.to_string());
    }

    if inputs.md_mode != MarketDataMode::Realtime {
        reasons.push(REASON_MD_NOT_REALTIME.to_string());
    }

    if inputs.con_id.is_none() {
        reasons.push(REASON_NO_CONTRACT.to_string());
    }

    let no_prices_at_all = inputs.bid.is_none() && inputs.ask.is_none() && inputs.last.is_none();
    let stale_by_age = inputs
        .staleness_ms
        .is_some_and(|ms| ms > inputs.stale_threshold_ms);
    let stale_by_heartbeat = inputs.has_seen_quote_event
        && inputs
            .last_quote_event_age_ms
            .is_some_and(|ms| ms > inputs.feed_heartbeat_timeout_ms);
    let stale_data = no_prices_at_all || stale_by_age || stale_by_heartbeat;
    if stale_data {
        reasons.push(REASON_STALE_DATA.to_string());
    }

    let spread_unavailable = inputs.bid.is_none()
        || inputs.ask.is_none()
        || inputs.spread_ticks.is_none()
        || inputs.spread_ticks.is_some_and(|t| t <= 0);
    if spread_unavailable {
        reasons.push(REASON_SPREAD_UNAVAILABLE.to_string());
    }

    let spread_wide = !spread_unavailable
        && inputs
            .spread_ticks
            .is_some_and(|t| t > inputs.max_spread_ticks);
    if spread_wide {
        reasons.push(REASON_SPREAD_WIDE.to_string());
    }

    if inputs.engine_degraded {
        reasons.push(REASON_ENGINE_DEGRADED.to_string());
    }

    metrics.insert("arm".to_string(), json!(inputs.arm));
    metrics.insert("intent".to_string(), json!(inputs.intent.to_string()));
    metrics.insert(
        "in_operating_window".to_string(),
        json!(inputs.in_operating_window),
    );
    metrics.insert("is_break_window".to_string(), json!(inputs.is_break_window));
    metrics.insert("feed_connected".to_string(), json!(inputs.feed_connected));
    metrics.insert("md_mode".to_string(), json!(inputs.md_mode.to_string()));
    metrics.insert("con_id".to_string(), json!(inputs.con_id));
    metrics.insert("staleness_ms".to_string(), json!(inputs.staleness_ms));
    metrics.insert(
        "last_quote_event_age_ms".to_string(),
        json!(inputs.last_quote_event_age_ms),
    );
    metrics.insert("spread_ticks".to_string(), json!(inputs.spread_ticks));
    metrics.insert(
        "max_spread_ticks".to_string(),
        json!(inputs.max_spread_ticks),
    );
    metrics.insert("engine_degraded".to_string(), json!(inputs.engine_degraded));

    GateResult {
        allowed: reasons.is_empty(),
        reason_codes: reasons,
        gate_metrics: metrics,
    }
}
