// =============================================================================
// MarketAdapter — the contract every feed implementation satisfies
// =============================================================================
//
// The engine never speaks to a broker directly. It sees only `InboundEvent`s
// pushed through an `InboundQueue` by whichever adapter the process was
// configured to run. The full IBKR wire protocol is explicitly out of scope;
// `IbkrAdapter` proves the contract's shape without implementing it.
// =============================================================================

pub mod ibkr;
pub mod mock;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("adapter connection failed: {0}")]
    Connection(String),
    #[error("adapter event loop error: {0}")]
    EventLoop(String),
    #[error("client id collision detected (code {0}) — another session owns this identity")]
    IdentityCollision(i32),
}

/// Behavioral contract every market-data adapter implements. `connect` and
/// `run_event_loop_iteration` are the only required methods; contract
/// qualification and subscription are no-ops by default for adapters (like
/// the mock) that have no such concept.
#[async_trait]
pub trait MarketAdapter: Send + Sync {
    async fn connect(&self) -> anyhow::Result<()>;

    fn disconnect(&self);

    async fn run_event_loop_iteration(&self) -> Result<(), AdapterError>;

    async fn qualify_contract(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn subscribe_market_data(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
