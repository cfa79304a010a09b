use serde::{Deserialize, Serialize};

use super::error::{Error, Result};

pub const DEFAULT_CASH_RESERVE_ID: &str = "c1";

pub const MAX_MARKET_CRASH: f64 = 0.5;
pub const MAX_INTEREST_HIKE: f64 = 0.02;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    #[serde(rename = "investment")]
    Investment,
    #[serde(rename = "realestate", alias = "real_estate", alias = "realEstate")]
    RealEstate,
    #[serde(rename = "cash")]
    Cash,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum LiabilityKind {
    #[serde(rename = "mortgage")]
    Mortgage,
    #[serde(rename = "credit", alias = "credit_line", alias = "creditLine")]
    CreditLine,
    #[serde(rename = "pledge", alias = "share_pledge", alias = "sharePledge")]
    SharePledge,
    #[serde(rename = "policy", alias = "policy_loan", alias = "policyLoan")]
    PolicyLoan,
}

impl LiabilityKind {
    /// Margin-style borrowing whose cost floats with rates and counts against
    /// investment equity.
    pub fn is_investment_loan(self) -> bool {
        matches!(self, LiabilityKind::SharePledge | LiabilityKind::PolicyLoan)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: AssetKind,
    #[serde(alias = "market_value")]
    pub market_value: f64,
    #[serde(rename = "cost", alias = "cost_basis", alias = "costBasis")]
    pub cost_basis: f64,
    #[serde(rename = "annualDividend", alias = "annual_income", default)]
    pub annual_income: f64,
    #[serde(rename = "realizedDividend", alias = "realized_income", default)]
    pub realized_income: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Liability {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: LiabilityKind,
    pub principal: f64,
    #[serde(rename = "interestRate", alias = "annual_rate", alias = "annualRate")]
    pub annual_rate: f64,
    #[serde(
        rename = "relatedAssetId",
        alias = "collateral_asset_id",
        alias = "collateralAssetId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub collateral_asset_id: Option<String>,
    #[serde(
        alias = "maintenance_threshold",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub maintenance_threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeExpense {
    #[serde(alias = "monthly_active_income")]
    pub monthly_active_income: f64,
    #[serde(alias = "monthly_passive_income")]
    pub monthly_passive_income: f64,
    #[serde(alias = "monthly_mortgage_payment")]
    pub monthly_mortgage_payment: f64,
    #[serde(alias = "monthly_credit_payment")]
    pub monthly_credit_payment: f64,
    #[serde(alias = "monthly_base_living_expense")]
    pub monthly_base_living_expense: f64,
    #[serde(alias = "fire_goal")]
    pub fire_goal: f64,
    #[serde(alias = "unused_credit_limit")]
    pub unused_credit_limit: f64,
}

/// Hypothetical scenario applied on top of the portfolio. Never persisted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StressParams {
    market_crash_fraction: f64,
    interest_hike_fraction: f64,
}

impl StressParams {
    pub fn new(market_crash_fraction: f64, interest_hike_fraction: f64) -> Result<Self> {
        if !market_crash_fraction.is_finite()
            || !(0.0..=MAX_MARKET_CRASH).contains(&market_crash_fraction)
        {
            return Err(Error::InvalidStress(format!(
                "market crash must be between 0 and {MAX_MARKET_CRASH}, got {market_crash_fraction}"
            )));
        }
        if !interest_hike_fraction.is_finite()
            || !(0.0..=MAX_INTEREST_HIKE).contains(&interest_hike_fraction)
        {
            return Err(Error::InvalidStress(format!(
                "interest hike must be between 0 and {MAX_INTEREST_HIKE}, got {interest_hike_fraction}"
            )));
        }
        Ok(Self {
            market_crash_fraction,
            interest_hike_fraction,
        })
    }

    pub fn market_crash_fraction(&self) -> f64 {
        self.market_crash_fraction
    }

    pub fn interest_hike_fraction(&self) -> f64 {
        self.interest_hike_fraction
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub assets: Vec<Asset>,
    pub liabilities: Vec<Liability>,
    pub income_expense: IncomeExpense,
    #[serde(default = "default_cash_reserve_id")]
    pub cash_reserve_asset_id: Option<String>,
}

fn default_cash_reserve_id() -> Option<String> {
    Some(DEFAULT_CASH_RESERVE_ID.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustedAsset {
    pub id: String,
    pub name: String,
    pub kind: AssetKind,
    pub market_value: f64,
    pub current_value: f64,
    pub cost_basis: f64,
    pub realized_income: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityBreakdownItem {
    pub asset_id: String,
    pub name: String,
    pub net_value: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetKindTotals {
    pub investment: f64,
    pub real_estate: f64,
    pub cash: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiabilityKindTotals {
    pub mortgage: f64,
    pub credit_line: f64,
    pub share_pledge: f64,
    pub policy_loan: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Safe,
    Warning,
    TopUpRequired,
    Liquidated,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginPolicy {
    /// Collateral value over principal; higher is safer.
    Coverage,
    /// Principal over collateral value; lower is safer.
    LoanToValue,
    Unsecured,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerLines {
    pub top_up_line: f64,
    pub liquidation_line: f64,
    pub liquidation_headroom: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollateralView {
    pub asset_id: String,
    pub name: String,
    pub current_value: f64,
    pub cost_basis: f64,
    pub realized_income: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiabilityRow {
    pub liability_id: String,
    pub name: String,
    pub kind: LiabilityKind,
    pub principal: f64,
    pub annual_rate: f64,
    pub collateral: Option<CollateralView>,
    pub policy: MarginPolicy,
    pub ratio: f64,
    pub tier: RiskTier,
    pub triggers: Option<TriggerLines>,
    pub total_roi_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BareAssetRow {
    pub asset_id: String,
    pub name: String,
    pub kind: AssetKind,
    pub current_value: f64,
    pub cost_basis: f64,
    pub realized_income: f64,
    pub total_roi_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "row", rename_all = "snake_case")]
pub enum RiskRow {
    Liability(LiabilityRow),
    BareAsset(BareAssetRow),
}

impl RiskRow {
    pub fn tier(&self) -> RiskTier {
        match self {
            RiskRow::Liability(row) => row.tier,
            RiskRow::BareAsset(_) => RiskTier::Safe,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RiskRow::Liability(row) => &row.name,
            RiskRow::BareAsset(row) => &row.name,
        }
    }

    pub fn total_roi_pct(&self) -> f64 {
        match self {
            RiskRow::Liability(row) => row.total_roi_pct,
            RiskRow::BareAsset(row) => row.total_roi_pct,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum TableView {
    #[default]
    Compact,
    Expanded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialSnapshot {
    pub stress: StressParams,
    pub adjusted_assets: Vec<AdjustedAsset>,
    pub total_assets: f64,
    pub total_liabilities: f64,
    pub net_worth: f64,
    pub monthly_active_income: f64,
    pub monthly_passive_income: f64,
    pub monthly_income: f64,
    pub extra_interest_burden: f64,
    pub monthly_expense: f64,
    pub net_cash_flow: f64,
    pub fire_progress_pct: f64,
    pub total_cost_basis: f64,
    pub total_realized_income: f64,
    pub total_profit: f64,
    pub roi_pct: f64,
    pub investment_loans_total: f64,
    pub net_investment_equity: f64,
    pub total_liquidity: f64,
    pub investment_equity_breakdown: Vec<EquityBreakdownItem>,
    pub assets_by_kind: AssetKindTotals,
    pub liabilities_by_kind: LiabilityKindTotals,
    pub risk_table: Vec<RiskRow>,
}
