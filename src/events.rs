// =============================================================================
// Inbound event schemas — adapter → engine communication
// =============================================================================
//
// Adapters normalize broker-native updates into these event types and push
// them onto the `InboundQueue`. The engine is the only consumer; adapters
// never mutate engine or UI state directly.
// =============================================================================

use serde::{Deserialize, Serialize};

/// Market-data mode reported by the broker, normalized to a fixed enum at
/// the adapter boundary (see spec §9 Open Question (a)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketDataMode {
    Realtime,
    Delayed,
    Frozen,
    None,
}

impl Default for MarketDataMode {
    fn default() -> Self {
        Self::None
    }
}

impl std::fmt::Display for MarketDataMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Realtime => write!(f, "REALTIME"),
            Self::Delayed => write!(f, "DELAYED"),
            Self::Frozen => write!(f, "FROZEN"),
            Self::None => write!(f, "NONE"),
        }
    }
}

/// L1 market-data update (bid/ask/last). No depth, no time-and-sales.
#[derive(Debug, Clone)]
pub struct QuoteEvent {
    /// Monotonic receipt time, used for staleness math.
    pub ts_recv_mono_ns: u64,
    /// Wall-clock receipt time.
    pub ts_recv_wall_ms: i64,
    /// Contract identity, if the event carries one. The adapter emits an
    /// initial quote carrying only this field immediately after contract
    /// qualification, to clear `NO_CONTRACT` before any price arrives.
    pub con_id: Option<i64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last: Option<f64>,
    pub bid_size: Option<f64>,
    pub ask_size: Option<f64>,
    /// Exchange-reported timestamp, if the broker provides one.
    pub ts_exch_wall_ms: Option<i64>,
}

impl QuoteEvent {
    /// Whether this event carries at least one price field. Per spec
    /// §4.1 step 4, `quotes_received_count` only advances on such events —
    /// the contract-only event emitted at connect time does not count.
    pub fn has_any_price(&self) -> bool {
        self.bid.is_some() || self.ask.is_some() || self.last.is_some()
    }
}

/// Connection / feed status change: connect, disconnect, or md_mode change.
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub ts_recv_mono_ns: u64,
    pub ts_recv_wall_ms: i64,
    pub connected: bool,
    pub md_mode: MarketDataMode,
    pub reason: Option<String>,
    pub error_code: Option<i32>,
}

/// Non-fatal adapter-level error surfaced for diagnostics. Fatal errors
/// (e.g. client-id collision) terminate the process instead of being
/// emitted as an event — see the adapter contract in spec §4.7.
#[derive(Debug, Clone)]
pub struct AdapterErrorEvent {
    pub ts_recv_mono_ns: u64,
    pub ts_recv_wall_ms: i64,
    pub error_code: i32,
    pub message: String,
    pub request_id: Option<i64>,
}

/// Tagged union over the three inbound event kinds. The engine dispatches
/// on this tag rather than maintaining a class hierarchy (see spec §9).
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Quote(QuoteEvent),
    Status(StatusEvent),
    AdapterError(AdapterErrorEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md_mode_serializes_to_the_same_uppercase_string_as_display() {
        for mode in [
            MarketDataMode::Realtime,
            MarketDataMode::Delayed,
            MarketDataMode::Frozen,
            MarketDataMode::None,
        ] {
            let json = serde_json::to_value(mode).unwrap();
            assert_eq!(json, serde_json::Value::String(mode.to_string()));
        }
    }
}
