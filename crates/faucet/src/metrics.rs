//! Prometheus metrics for the faucet

use prometheus::{opts, Encoder, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder};

use crate::error::FaucetError;

#[derive(Debug, Clone)]
pub struct FaucetMetrics {
    registry: Registry,
    pub claims_total: IntCounter,
    pub claim_rejections_total: IntCounterVec,
    pub reserve_balance: IntGauge,
    pub paused: IntGauge,
}

impl FaucetMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let claims_total = IntCounter::with_opts(opts!(
            "spout_claims_total",
            "Total number of successful claims"
        ))?;

        let claim_rejections_total = IntCounterVec::new(
            opts!(
                "spout_claim_rejections_total",
                "Total number of rejected claims by reason"
            ),
            &["reason"],
        )?;

        let reserve_balance = IntGauge::with_opts(opts!(
            "spout_reserve_balance",
            "Token units left in the faucet reserve"
        ))?;

        let paused = IntGauge::with_opts(opts!(
            "spout_paused",
            "1 while the faucet is paused"
        ))?;

        registry.register(Box::new(claims_total.clone()))?;
        registry.register(Box::new(claim_rejections_total.clone()))?;
        registry.register(Box::new(reserve_balance.clone()))?;
        registry.register(Box::new(paused.clone()))?;

        Ok(Self {
            registry,
            claims_total,
            claim_rejections_total,
            reserve_balance,
            paused,
        })
    }

    pub fn record_claim(&self, reserve_after: u128) {
        self.claims_total.inc();
        self.set_reserve_balance(reserve_after);
    }

    pub fn record_rejection(&self, error: &FaucetError) {
        self.claim_rejections_total
            .with_label_values(&[error.code()])
            .inc();
    }

    pub fn set_reserve_balance(&self, balance: u128) {
        self.reserve_balance
            .set(i64::try_from(balance).unwrap_or(i64::MAX));
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.set(paused as i64);
    }

    /// Render all metrics in the Prometheus text format
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
