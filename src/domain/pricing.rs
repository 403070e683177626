use std::collections::HashMap;

use serde::Deserialize;

use crate::{
    domain::Currency,
    error::{AppError, Result},
};

/// A purchasable credit package with per-currency prices in minor units.
#[derive(Debug, Clone, Deserialize)]
pub struct CreditPackage {
    pub credits: i64,
    pub prices: HashMap<Currency, i64>,
}

/// Pricing snapshot resolved from configuration and passed into the
/// ledger at call time, so tests can inject fixed pricing and a config
/// reload cannot change an in-flight initiation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PricingTable {
    #[serde(default)]
    pub packages: HashMap<String, CreditPackage>,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolvedPackage {
    pub credits: i64,
    pub amount: i64,
}

impl PricingTable {
    pub fn resolve(&self, package_id: &str, currency: Currency) -> Result<ResolvedPackage> {
        let package = self
            .packages
            .get(package_id)
            .ok_or_else(|| AppError::InvalidPackage(package_id.to_string()))?;

        let amount = package.prices.get(&currency).copied().ok_or_else(|| {
            AppError::InvalidPackage(format!("{} is not priced in {}", package_id, currency))
        })?;

        if package.credits <= 0 || amount <= 0 {
            return Err(AppError::InvalidPackage(format!(
                "{} has a non-positive price or credit grant",
                package_id
            )));
        }

        Ok(ResolvedPackage {
            credits: package.credits,
            amount,
        })
    }

    /// The stock packages the service ships with; deployments override
    /// them through configuration.
    pub fn defaults() -> Self {
        let mut packages = HashMap::new();
        packages.insert(
            "basic".to_string(),
            CreditPackage {
                credits: 100,
                prices: HashMap::from([
                    (Currency::Irr, 500_000),
                    (Currency::Usd, 999),
                    (Currency::Ton, 2_000_000_000),
                ]),
            },
        );
        packages.insert(
            "pro".to_string(),
            CreditPackage {
                credits: 500,
                prices: HashMap::from([
                    (Currency::Irr, 2_000_000),
                    (Currency::Usd, 3_999),
                    (Currency::Ton, 8_000_000_000),
                ]),
            },
        );
        packages.insert(
            "business".to_string(),
            CreditPackage {
                credits: 2_000,
                prices: HashMap::from([
                    (Currency::Irr, 6_500_000),
                    (Currency::Usd, 12_999),
                    (Currency::Ton, 26_000_000_000),
                ]),
            },
        );
        Self { packages }
    }
}
