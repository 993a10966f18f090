// =============================================================================
// MockAdapter — deterministic synthetic L1 feed for testing and demos
// =============================================================================
//
// Oscillates price around a base with a slow sinusoidal drift, so the gate
// panel and dashboard have something realistic to show without any network
// dependency.
// =============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{interval, Duration};

use crate::adapter::{AdapterError, MarketAdapter};
use crate::clock::SharedClock;
use crate::events::{InboundEvent, MarketDataMode, QuoteEvent, StatusEvent};
use crate::queues::InboundQueue;

const DEFAULT_BASE_PRICE: f64 = 18_500.0;
const DEFAULT_TICK_SIZE: f64 = 0.25;
const DEFAULT_SPREAD_TICKS: f64 = 1.0;
const DEFAULT_QUOTE_RATE_HZ: f64 = 10.0;
const DEFAULT_DRIFT_AMPLITUDE: f64 = 5.0;
const DEFAULT_DRIFT_PERIOD_S: f64 = 60.0;
const MOCK_CON_ID: i64 = 999_999;

pub struct MockAdapter {
    clock: SharedClock,
    inbound: Arc<InboundQueue>,
    connected: AtomicBool,
    base_price: f64,
    tick_size: f64,
    spread_ticks: f64,
    quote_rate_hz: f64,
    drift_amplitude: f64,
    drift_period_s: f64,
}

impl MockAdapter {
    pub fn new(clock: SharedClock, inbound: Arc<InboundQueue>) -> Self {
        Self {
            clock,
            inbound,
            connected: AtomicBool::new(false),
            base_price: DEFAULT_BASE_PRICE,
            tick_size: DEFAULT_TICK_SIZE,
            spread_ticks: DEFAULT_SPREAD_TICKS,
            quote_rate_hz: DEFAULT_QUOTE_RATE_HZ,
            drift_amplitude: DEFAULT_DRIFT_AMPLITUDE,
            drift_period_s: DEFAULT_DRIFT_PERIOD_S,
        }
    }

    fn mid_price(&self, elapsed_s: f64) -> f64 {
        let phase = 2.0 * std::f64::consts::PI * elapsed_s / self.drift_period_s;
        self.base_price + self.drift_amplitude * phase.sin()
    }

    fn push_status(&self, connected: bool, reason: Option<&str>) {
        self.inbound.push(InboundEvent::Status(StatusEvent {
            ts_recv_mono_ns: self.clock.now_mono_ns(),
            ts_recv_wall_ms: self.clock.now_wall_ms(),
            connected,
            md_mode: if connected {
                MarketDataMode::Realtime
            } else {
                MarketDataMode::None
            },
            reason: reason.map(str::to_string),
            error_code: None,
        }));
    }

    /// Runs the quote-generation loop until `running` flips false. Spawned
    /// as its own task by `main`; `run_event_loop_iteration` is a no-op for
    /// this adapter because it generates quotes on its own clock rather
    /// than pumping an external socket.
    pub async fn run_quote_loop(self: Arc<Self>, running: Arc<AtomicBool>) {
        let period_ms = (1000.0 / self.quote_rate_hz).max(1.0) as u64;
        let mut ticker = interval(Duration::from_millis(period_ms));
        let start_mono_ns = self.clock.now_mono_ns();

        while running.load(Ordering::Relaxed) {
            ticker.tick().await;
            let elapsed_s =
                (self.clock.now_mono_ns().saturating_sub(start_mono_ns)) as f64 / 1_000_000_000.0;
            let mid = self.mid_price(elapsed_s);
            let half_spread = self.spread_ticks * self.tick_size / 2.0;

            self.inbound.push(InboundEvent::Quote(QuoteEvent {
                ts_recv_mono_ns: self.clock.now_mono_ns(),
                ts_recv_wall_ms: self.clock.now_wall_ms(),
                con_id: Some(MOCK_CON_ID),
                bid: Some(mid - half_spread),
                ask: Some(mid + half_spread),
                last: Some(mid),
                bid_size: Some(10.0),
                ask_size: Some(10.0),
                ts_exch_wall_ms: Some(self.clock.now_wall_ms()),
            }));
        }
    }
}

#[async_trait]
impl MarketAdapter for MockAdapter {
    async fn connect(&self) -> anyhow::Result<()> {
        self.connected.store(true, Ordering::Relaxed);
        self.push_status(true, Some("mock feed connected"));
        // Clear NO_CONTRACT immediately, before any priced quote arrives.
        self.inbound.push(InboundEvent::Quote(QuoteEvent {
            ts_recv_mono_ns: self.clock.now_mono_ns(),
            ts_recv_wall_ms: self.clock.now_wall_ms(),
            con_id: Some(MOCK_CON_ID),
            bid: None,
            ask: None,
            last: None,
            bid_size: None,
            ask_size: None,
            ts_exch_wall_ms: None,
        }));
        Ok(())
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::Relaxed);
        self.push_status(false, Some("mock feed disconnected"));
    }

    async fn run_event_loop_iteration(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FrozenClock;

    #[test]
    fn mid_price_oscillates_within_drift_amplitude() {
        let clock: SharedClock = Arc::new(FrozenClock::new(0, 0));
        let adapter = MockAdapter::new(clock, Arc::new(InboundQueue::new(10)));
        for step in 0..120 {
            let price = adapter.mid_price(step as f64);
            assert!((price - adapter.base_price).abs() <= adapter.drift_amplitude + 1e-9);
        }
    }
}
