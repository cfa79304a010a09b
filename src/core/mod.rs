mod engine;
mod error;
mod portfolio;
mod risk;
mod types;

pub use engine::{adjust_assets, compute, compute_with_view};
pub use error::{Error, Result};
pub use portfolio::{
    AssetField, IncomeExpenseField, LiabilityField, NewAsset, PortfolioEdit, default_portfolio,
};
pub use risk::{Classification, classify, total_roi_pct};
pub use types::{
    AdjustedAsset, Asset, AssetKind, AssetKindTotals, BareAssetRow, CollateralView,
    DEFAULT_CASH_RESERVE_ID, EquityBreakdownItem, FinancialSnapshot, IncomeExpense, Liability,
    LiabilityKind, LiabilityKindTotals, LiabilityRow, MAX_INTEREST_HIKE, MAX_MARKET_CRASH,
    MarginPolicy, Portfolio, RiskRow, RiskTier, StressParams, TableView, TriggerLines,
};
