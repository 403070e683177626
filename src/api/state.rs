use std::sync::Arc;

use crate::{
    config::Settings,
    gateways::GatewayRegistry,
    ledger::{Ledger, RefundProcessor},
    repository::PaymentRepository,
};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub refunds: Arc<RefundProcessor>,
    pub gateways: Arc<GatewayRegistry>,
    pub payments: Arc<dyn PaymentRepository>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(
        ledger: Arc<Ledger>,
        refunds: Arc<RefundProcessor>,
        gateways: Arc<GatewayRegistry>,
        payments: Arc<dyn PaymentRepository>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            ledger,
            refunds,
            gateways,
            payments,
            settings,
        }
    }
}
