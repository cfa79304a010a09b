//! Margin-call classification for collateralized borrowing.
//!
//! Share pledges are judged on collateral coverage (value / principal), every
//! other secured loan on loan-to-value (principal / value). Both use the
//! stressed collateral value, so a market crash flows straight into the tiers.

use super::engine::percent_of;
use super::types::{
    AdjustedAsset, BareAssetRow, CollateralView, Liability, LiabilityKind, LiabilityRow,
    MarginPolicy, Portfolio, RiskRow, RiskTier, TableView, TriggerLines,
};

pub const PLEDGE_LIQUIDATION_COVERAGE: f64 = 1.3;
pub const PLEDGE_TOP_UP_COVERAGE: f64 = 1.4;
pub const PLEDGE_WARNING_COVERAGE: f64 = 1.5;

pub const LTV_LIQUIDATION: f64 = 0.8;
pub const LTV_TOP_UP: f64 = 0.7;
pub const LTV_WARNING: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub policy: MarginPolicy,
    pub ratio: f64,
    pub tier: RiskTier,
    pub triggers: Option<TriggerLines>,
}

impl Classification {
    fn unsecured() -> Self {
        Self {
            policy: MarginPolicy::Unsecured,
            ratio: 0.0,
            tier: RiskTier::Safe,
            triggers: None,
        }
    }
}

/// Classifies one liability against the stressed value of its collateral.
/// `collateral_value` is `None` when the liability has no collateral or the
/// reference dangles.
pub fn classify(kind: LiabilityKind, principal: f64, collateral_value: Option<f64>) -> Classification {
    let Some(current_value) = collateral_value else {
        return Classification::unsecured();
    };
    if principal <= 0.0 {
        return Classification::unsecured();
    }

    match kind {
        LiabilityKind::SharePledge => classify_coverage(principal, current_value),
        _ => classify_loan_to_value(principal, current_value),
    }
}

fn classify_coverage(principal: f64, current_value: f64) -> Classification {
    let coverage = current_value.max(0.0) / principal;
    let tier = if coverage <= PLEDGE_LIQUIDATION_COVERAGE {
        RiskTier::Liquidated
    } else if coverage <= PLEDGE_TOP_UP_COVERAGE {
        RiskTier::TopUpRequired
    } else if coverage <= PLEDGE_WARNING_COVERAGE {
        RiskTier::Warning
    } else {
        RiskTier::Safe
    };
    let liquidation_line = principal * PLEDGE_LIQUIDATION_COVERAGE;
    Classification {
        policy: MarginPolicy::Coverage,
        ratio: coverage,
        tier,
        triggers: Some(TriggerLines {
            top_up_line: principal * PLEDGE_TOP_UP_COVERAGE,
            liquidation_line,
            liquidation_headroom: current_value - liquidation_line,
        }),
    }
}

fn classify_loan_to_value(principal: f64, current_value: f64) -> Classification {
    let ratio = if current_value > 0.0 {
        principal / current_value
    } else {
        f64::INFINITY
    };
    let tier = if ratio >= LTV_LIQUIDATION {
        RiskTier::Liquidated
    } else if ratio >= LTV_TOP_UP {
        RiskTier::TopUpRequired
    } else if ratio >= LTV_WARNING {
        RiskTier::Warning
    } else {
        RiskTier::Safe
    };
    let liquidation_line = principal / LTV_LIQUIDATION;
    Classification {
        policy: MarginPolicy::LoanToValue,
        ratio,
        tier,
        triggers: Some(TriggerLines {
            top_up_line: principal / LTV_TOP_UP,
            liquidation_line,
            liquidation_headroom: current_value - liquidation_line,
        }),
    }
}

/// Gain including realized income relative to cost, in percent.
pub fn total_roi_pct(current_value: f64, realized_income: f64, cost_basis: f64) -> f64 {
    percent_of(current_value + realized_income - cost_basis, cost_basis)
}

/// Every liability is evaluated on its own against the full value of its
/// collateral, even when several liabilities share one asset.
pub fn build_risk_table(
    portfolio: &Portfolio,
    adjusted_assets: &[AdjustedAsset],
    view: TableView,
) -> Vec<RiskRow> {
    let mut rows = portfolio
        .liabilities
        .iter()
        .map(|l| RiskRow::Liability(liability_row(l, adjusted_assets)))
        .collect::<Vec<_>>();

    if view == TableView::Expanded {
        rows.extend(
            adjusted_assets
                .iter()
                .filter(|a| {
                    !portfolio
                        .liabilities
                        .iter()
                        .any(|l| l.collateral_asset_id.as_deref() == Some(a.id.as_str()))
                })
                .map(|a| RiskRow::BareAsset(bare_asset_row(a))),
        );
    }
    rows
}

fn liability_row(liability: &Liability, adjusted_assets: &[AdjustedAsset]) -> LiabilityRow {
    let collateral = liability
        .collateral_asset_id
        .as_deref()
        .and_then(|id| adjusted_assets.iter().find(|a| a.id == id));
    let classification = classify(
        liability.kind,
        liability.principal,
        collateral.map(|a| a.current_value),
    );
    let total_roi = match collateral {
        Some(a) if liability.principal > 0.0 => {
            total_roi_pct(a.current_value, a.realized_income, a.cost_basis)
        }
        _ => 0.0,
    };

    LiabilityRow {
        liability_id: liability.id.clone(),
        name: liability.name.clone(),
        kind: liability.kind,
        principal: liability.principal,
        annual_rate: liability.annual_rate,
        collateral: collateral.map(|a| CollateralView {
            asset_id: a.id.clone(),
            name: a.name.clone(),
            current_value: a.current_value,
            cost_basis: a.cost_basis,
            realized_income: a.realized_income,
        }),
        policy: classification.policy,
        ratio: classification.ratio,
        tier: classification.tier,
        triggers: classification.triggers,
        total_roi_pct: total_roi,
    }
}

fn bare_asset_row(asset: &AdjustedAsset) -> BareAssetRow {
    BareAssetRow {
        asset_id: asset.id.clone(),
        name: asset.name.clone(),
        kind: asset.kind,
        current_value: asset.current_value,
        cost_basis: asset.cost_basis,
        realized_income: asset.realized_income,
        total_roi_pct: total_roi_pct(asset.current_value, asset.realized_income, asset.cost_basis),
    }
}
