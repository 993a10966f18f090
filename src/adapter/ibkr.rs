// =============================================================================
// IbkrAdapter — connection-health stub for a TWS/Gateway feed
// =============================================================================
//
// The full TWS wire protocol (contract qualification RPCs, tick-by-tick
// streaming, client-id collision detection) is explicitly out of scope.
// `connect` performs a real TCP health check against the configured
// host:port so the adapter has genuine failure modes to report; everything
// past that boundary is a documented no-op.
// =============================================================================

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::adapter::{AdapterError, MarketAdapter};
use crate::clock::SharedClock;
use crate::config::{IbkrConnectionConfig, IbkrContractConfig};
use crate::events::{InboundEvent, MarketDataMode, QuoteEvent, StatusEvent};
use crate::queues::InboundQueue;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct IbkrAdapter {
    connection: IbkrConnectionConfig,
    contract: IbkrContractConfig,
    clock: SharedClock,
    inbound: std::sync::Arc<InboundQueue>,
    connected: AtomicBool,
}

impl IbkrAdapter {
    pub fn new(
        connection: IbkrConnectionConfig,
        contract: IbkrContractConfig,
        clock: SharedClock,
        inbound: std::sync::Arc<InboundQueue>,
    ) -> Self {
        Self {
            connection,
            contract,
            clock,
            inbound,
            connected: AtomicBool::new(false),
        }
    }

    fn push_status(&self, connected: bool, reason: Option<String>) {
        self.inbound.push(InboundEvent::Status(StatusEvent {
            ts_recv_mono_ns: self.clock.now_mono_ns(),
            ts_recv_wall_ms: self.clock.now_wall_ms(),
            connected,
            md_mode: MarketDataMode::None,
            reason,
            error_code: None,
        }));
    }

    /// Exercises the fatal identity-collision path without implementing
    /// real TWS client-id negotiation, which this adapter does not speak.
    pub fn simulate_identity_collision(&self, error_code: i32) -> AdapterError {
        self.push_status(false, Some("client id collision".to_string()));
        AdapterError::IdentityCollision(error_code)
    }

    /// Derives a stable synthetic contract id from the contract key, since
    /// this adapter does not speak the TWS qualification RPC that would
    /// otherwise hand one back. Same role as `MockAdapter`'s `MOCK_CON_ID`.
    fn synthetic_con_id(&self) -> i64 {
        let mut hasher = DefaultHasher::new();
        self.contract.contract_key().hash(&mut hasher);
        (hasher.finish() & 0x7FFF_FFFF) as i64
    }
}

#[async_trait]
impl MarketAdapter for IbkrAdapter {
    async fn connect(&self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.connection.host, self.connection.port);
        let addr: std::net::SocketAddr = addr
            .parse()
            .map_err(|err| anyhow::anyhow!("invalid IBKR address {addr}: {err}"))?;

        let stream = tokio::task::spawn_blocking(move || {
            TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
        })
        .await??;
        drop(stream);

        self.connected.store(true, Ordering::Relaxed);
        self.push_status(true, Some(format!("connected to {}", self.connection.host)));
        Ok(())
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::Relaxed);
        self.push_status(false, Some("disconnected".to_string()));
    }

    async fn run_event_loop_iteration(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn qualify_contract(&self) -> anyhow::Result<()> {
        if self.contract.symbol.trim().is_empty() {
            anyhow::bail!("cannot qualify contract with empty symbol");
        }
        // Clear NO_CONTRACT immediately, before any priced quote arrives —
        // same contract as MockAdapter::connect (spec §4.7).
        self.inbound.push(InboundEvent::Quote(QuoteEvent {
            ts_recv_mono_ns: self.clock.now_mono_ns(),
            ts_recv_wall_ms: self.clock.now_wall_ms(),
            con_id: Some(self.synthetic_con_id()),
            bid: None,
            ask: None,
            last: None,
            bid_size: None,
            ask_size: None,
            ts_exch_wall_ms: None,
        }));
        Ok(())
    }

    async fn subscribe_market_data(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FrozenClock, SharedClock};
    use std::sync::Arc;

    fn adapter() -> IbkrAdapter {
        let clock: SharedClock = Arc::new(FrozenClock::new(0, 0));
        IbkrAdapter::new(
            IbkrConnectionConfig::default(),
            IbkrContractConfig {
                symbol: "MNQ".to_string(),
                expiry: "202603".to_string(),
                exchange: "CME".to_string(),
                currency: "USD".to_string(),
                sec_type: "FUT".to_string(),
                multiplier: None,
            },
            clock,
            Arc::new(InboundQueue::new(10)),
        )
    }

    #[test]
    fn simulate_identity_collision_returns_fatal_variant() {
        let adapter = adapter();
        let err = adapter.simulate_identity_collision(326);
        assert!(matches!(err, AdapterError::IdentityCollision(326)));
    }

    #[tokio::test]
    async fn qualify_contract_clears_no_contract_with_a_synthetic_con_id() {
        let adapter = adapter();
        adapter.qualify_contract().await.unwrap();

        let events = adapter.inbound.drain(10);
        assert_eq!(events.len(), 1);
        match &events[0] {
            InboundEvent::Quote(quote) => {
                assert!(quote.con_id.is_some());
                assert!(quote.bid.is_none());
                assert!(quote.ask.is_none());
                assert!(quote.last.is_none());
            }
            other => panic!("expected a Quote event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn qualify_contract_rejects_empty_symbol() {
        let clock: SharedClock = Arc::new(FrozenClock::new(0, 0));
        let adapter = IbkrAdapter::new(
            IbkrConnectionConfig::default(),
            IbkrContractConfig {
                symbol: String::new(),
                expiry: "202603".to_string(),
                exchange: "CME".to_string(),
                currency: "USD".to_string(),
                sec_type: "FUT".to_string(),
                multiplier: None,
            },
            clock,
            Arc::new(InboundQueue::new(10)),
        );
        assert!(adapter.qualify_contract().await.is_err());
    }
}
