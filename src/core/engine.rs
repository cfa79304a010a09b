use super::risk::build_risk_table;
use super::types::{
    AdjustedAsset, Asset, AssetKind, AssetKindTotals, EquityBreakdownItem, FinancialSnapshot,
    Liability, LiabilityKind, LiabilityKindTotals, Portfolio, StressParams, TableView,
};

#[derive(Debug, Clone, Copy)]
struct CashflowTotals {
    income: f64,
    extra_interest: f64,
    expense: f64,
}

impl CashflowTotals {
    fn net(self) -> f64 {
        self.income - self.expense
    }
}

#[derive(Debug, Clone, Copy)]
struct ReturnTotals {
    market_value: f64,
    cost_basis: f64,
    realized_income: f64,
}

impl ReturnTotals {
    fn profit(self) -> f64 {
        self.market_value + self.realized_income - self.cost_basis
    }
}

pub fn compute(portfolio: &Portfolio, stress: &StressParams) -> FinancialSnapshot {
    compute_with_view(portfolio, stress, TableView::Compact)
}

pub fn compute_with_view(
    portfolio: &Portfolio,
    stress: &StressParams,
    view: TableView,
) -> FinancialSnapshot {
    let adjusted_assets = adjust_assets(&portfolio.assets, stress);
    let liabilities = &portfolio.liabilities;
    let income_expense = &portfolio.income_expense;

    let total_assets = adjusted_assets.iter().map(|a| a.current_value).sum::<f64>();
    let total_liabilities = liabilities.iter().map(|l| l.principal).sum::<f64>();
    let net_worth = total_assets - total_liabilities;

    let cashflow = monthly_cashflow(portfolio, stress);
    let returns = return_totals(&portfolio.assets);
    let total_profit = returns.profit();

    let investment_loans_total = liabilities
        .iter()
        .filter(|l| l.kind.is_investment_loan())
        .map(|l| l.principal)
        .sum::<f64>();
    let investment_value = adjusted_assets
        .iter()
        .filter(|a| a.kind == AssetKind::Investment)
        .map(|a| a.current_value)
        .sum::<f64>();
    let net_investment_equity = investment_value - investment_loans_total;

    let cash_reserve = portfolio
        .cash_reserve_asset_id
        .as_deref()
        .and_then(|id| adjusted_assets.iter().find(|a| a.id == id))
        .map(|a| a.current_value)
        .unwrap_or(0.0);
    let total_liquidity =
        net_investment_equity + cash_reserve + income_expense.unused_credit_limit;

    let investment_equity_breakdown = equity_breakdown(&adjusted_assets, liabilities);
    let assets_by_kind = asset_kind_totals(&adjusted_assets);
    let liabilities_by_kind = liability_kind_totals(liabilities);
    let risk_table = build_risk_table(portfolio, &adjusted_assets, view);

    FinancialSnapshot {
        stress: *stress,
        total_assets,
        total_liabilities,
        net_worth,
        monthly_active_income: income_expense.monthly_active_income,
        monthly_passive_income: income_expense.monthly_passive_income,
        monthly_income: cashflow.income,
        extra_interest_burden: cashflow.extra_interest,
        monthly_expense: cashflow.expense,
        net_cash_flow: cashflow.net(),
        fire_progress_pct: percent_of(net_worth, income_expense.fire_goal),
        total_cost_basis: returns.cost_basis,
        total_realized_income: returns.realized_income,
        total_profit,
        roi_pct: percent_of(total_profit, returns.cost_basis),
        investment_loans_total,
        net_investment_equity,
        total_liquidity,
        investment_equity_breakdown,
        assets_by_kind,
        liabilities_by_kind,
        risk_table,
        adjusted_assets,
    }
}

/// Only investment assets react to a market crash; real estate and cash keep
/// their recorded value.
pub fn adjust_assets(assets: &[Asset], stress: &StressParams) -> Vec<AdjustedAsset> {
    assets
        .iter()
        .map(|asset| AdjustedAsset {
            id: asset.id.clone(),
            name: asset.name.clone(),
            kind: asset.kind,
            market_value: asset.market_value,
            current_value: stressed_value(asset, stress),
            cost_basis: asset.cost_basis,
            realized_income: asset.realized_income,
        })
        .collect()
}

fn stressed_value(asset: &Asset, stress: &StressParams) -> f64 {
    match asset.kind {
        AssetKind::Investment => asset.market_value * (1.0 - stress.market_crash_fraction()),
        AssetKind::RealEstate | AssetKind::Cash => asset.market_value,
    }
}

fn monthly_cashflow(portfolio: &Portfolio, stress: &StressParams) -> CashflowTotals {
    let ie = &portfolio.income_expense;
    // Mortgage and credit-line payments are contractually fixed; only
    // rate-sensitive margin borrowing picks up the hike.
    let extra_interest = portfolio
        .liabilities
        .iter()
        .filter(|l| l.kind.is_investment_loan())
        .map(|l| l.principal * stress.interest_hike_fraction() / 12.0)
        .sum::<f64>();
    CashflowTotals {
        income: ie.monthly_active_income + ie.monthly_passive_income,
        extra_interest,
        expense: ie.monthly_mortgage_payment
            + ie.monthly_credit_payment
            + ie.monthly_base_living_expense
            + extra_interest,
    }
}

// Profit is measured on recorded market values, independent of the scenario.
fn return_totals(assets: &[Asset]) -> ReturnTotals {
    assets.iter().fold(
        ReturnTotals {
            market_value: 0.0,
            cost_basis: 0.0,
            realized_income: 0.0,
        },
        |acc, a| ReturnTotals {
            market_value: acc.market_value + a.market_value,
            cost_basis: acc.cost_basis + a.cost_basis,
            realized_income: acc.realized_income + a.realized_income,
        },
    )
}

fn equity_breakdown(
    adjusted_assets: &[AdjustedAsset],
    liabilities: &[Liability],
) -> Vec<EquityBreakdownItem> {
    adjusted_assets
        .iter()
        .filter(|a| a.kind == AssetKind::Investment)
        .map(|a| {
            let loan = liabilities
                .iter()
                .find(|l| l.collateral_asset_id.as_deref() == Some(a.id.as_str()))
                .map(|l| l.principal)
                .unwrap_or(0.0);
            EquityBreakdownItem {
                asset_id: a.id.clone(),
                name: a.name.clone(),
                net_value: a.current_value - loan,
            }
        })
        .collect()
}

fn asset_kind_totals(adjusted_assets: &[AdjustedAsset]) -> AssetKindTotals {
    let mut totals = AssetKindTotals::default();
    for asset in adjusted_assets {
        match asset.kind {
            AssetKind::Investment => totals.investment += asset.current_value,
            AssetKind::RealEstate => totals.real_estate += asset.current_value,
            AssetKind::Cash => totals.cash += asset.current_value,
        }
    }
    totals
}

fn liability_kind_totals(liabilities: &[Liability]) -> LiabilityKindTotals {
    let mut totals = LiabilityKindTotals::default();
    for liability in liabilities {
        match liability.kind {
            LiabilityKind::Mortgage => totals.mortgage += liability.principal,
            LiabilityKind::CreditLine => totals.credit_line += liability.principal,
            LiabilityKind::SharePledge => totals.share_pledge += liability.principal,
            LiabilityKind::PolicyLoan => totals.policy_loan += liability.principal,
        }
    }
    totals
}

/// `numerator / denominator * 100`, or 0 when the denominator is not positive.
pub(crate) fn percent_of(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::portfolio::default_portfolio;
    use crate::core::types::{IncomeExpense, RiskRow, RiskTier};
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn stress(crash: f64, hike: f64) -> StressParams {
        StressParams::new(crash, hike).expect("valid stress")
    }

    fn asset(id: &str, kind: AssetKind, market_value: f64, cost_basis: f64) -> Asset {
        Asset {
            id: id.to_string(),
            name: format!("asset {id}"),
            kind,
            market_value,
            cost_basis,
            annual_income: 0.0,
            realized_income: 0.0,
        }
    }

    fn liability(
        id: &str,
        kind: LiabilityKind,
        principal: f64,
        collateral: Option<&str>,
    ) -> Liability {
        Liability {
            id: id.to_string(),
            name: format!("loan {id}"),
            kind,
            principal,
            annual_rate: 0.03,
            collateral_asset_id: collateral.map(str::to_string),
            maintenance_threshold: None,
        }
    }

    fn small_portfolio() -> Portfolio {
        Portfolio {
            assets: vec![
                asset("inv", AssetKind::Investment, 1_000_000.0, 800_000.0),
                asset("home", AssetKind::RealEstate, 3_000_000.0, 3_000_000.0),
                asset("c1", AssetKind::Cash, 200_000.0, 200_000.0),
            ],
            liabilities: vec![
                liability("pl", LiabilityKind::PolicyLoan, 300_000.0, Some("inv")),
                liability("mg", LiabilityKind::Mortgage, 2_000_000.0, None),
            ],
            income_expense: IncomeExpense {
                monthly_active_income: 50_000.0,
                monthly_passive_income: 10_000.0,
                monthly_mortgage_payment: 20_000.0,
                monthly_credit_payment: 5_000.0,
                monthly_base_living_expense: 15_000.0,
                fire_goal: 10_000_000.0,
                unused_credit_limit: 100_000.0,
            },
            cash_reserve_asset_id: Some("c1".to_string()),
        }
    }

    #[test]
    fn zero_stress_keeps_market_values_and_adds_no_interest() {
        let portfolio = default_portfolio();
        let snapshot = compute(&portfolio, &StressParams::default());

        for (raw, adjusted) in portfolio.assets.iter().zip(&snapshot.adjusted_assets) {
            assert_eq!(adjusted.current_value, raw.market_value);
        }
        assert_eq!(snapshot.extra_interest_burden, 0.0);
    }

    #[test]
    fn crash_only_hits_investment_assets() {
        let snapshot = compute(&small_portfolio(), &stress(0.2, 0.0));
        let values = snapshot
            .adjusted_assets
            .iter()
            .map(|a| a.current_value)
            .collect::<Vec<_>>();
        assert_eq!(values, vec![800_000.0, 3_000_000.0, 200_000.0]);
        assert_approx(snapshot.total_assets, 4_000_000.0);
        assert_approx(snapshot.assets_by_kind.investment, 800_000.0);
        assert_approx(snapshot.assets_by_kind.real_estate, 3_000_000.0);
        assert_approx(snapshot.assets_by_kind.cash, 200_000.0);
    }

    #[test]
    fn aggregates_match_hand_calculation() {
        let snapshot = compute(&small_portfolio(), &stress(0.1, 0.012));

        assert_approx(snapshot.total_assets, 900_000.0 + 3_000_000.0 + 200_000.0);
        assert_approx(snapshot.total_liabilities, 2_300_000.0);
        assert_approx(snapshot.net_worth, 1_800_000.0);
        assert_approx(snapshot.monthly_income, 60_000.0);
        // Only the policy loan reacts to the hike.
        assert_approx(snapshot.extra_interest_burden, 300_000.0 * 0.012 / 12.0);
        assert_approx(snapshot.monthly_expense, 40_000.0 + 300.0);
        assert_approx(snapshot.net_cash_flow, 19_700.0);
        assert_approx(snapshot.fire_progress_pct, 18.0);
        assert_approx(snapshot.total_cost_basis, 4_000_000.0);
        assert_approx(snapshot.total_profit, 200_000.0);
        assert_approx(snapshot.roi_pct, 5.0);
        assert_approx(snapshot.investment_loans_total, 300_000.0);
        assert_approx(snapshot.net_investment_equity, 600_000.0);
        assert_approx(snapshot.total_liquidity, 600_000.0 + 200_000.0 + 100_000.0);
        assert_approx(snapshot.liabilities_by_kind.mortgage, 2_000_000.0);
        assert_approx(snapshot.liabilities_by_kind.policy_loan, 300_000.0);
    }

    #[test]
    fn profit_ignores_the_stress_scenario() {
        let calm = compute(&small_portfolio(), &StressParams::default());
        let crashed = compute(&small_portfolio(), &stress(0.5, 0.02));
        assert_eq!(calm.total_profit, crashed.total_profit);
        assert_eq!(calm.roi_pct, crashed.roi_pct);
    }

    #[test]
    fn zero_cost_basis_and_zero_goal_give_zero_percentages() {
        let mut portfolio = small_portfolio();
        for a in &mut portfolio.assets {
            a.cost_basis = 0.0;
        }
        portfolio.income_expense.fire_goal = 0.0;

        let snapshot = compute(&portfolio, &StressParams::default());
        assert_eq!(snapshot.roi_pct, 0.0);
        assert_eq!(snapshot.fire_progress_pct, 0.0);
    }

    #[test]
    fn fire_progress_is_not_clamped() {
        let mut portfolio = small_portfolio();
        portfolio.income_expense.fire_goal = 1_000_000.0;
        let snapshot = compute(&portfolio, &StressParams::default());
        assert_approx(snapshot.fire_progress_pct, 190.0);

        portfolio.liabilities[1].principal = 10_000_000.0;
        let snapshot = compute(&portfolio, &StressParams::default());
        assert!(snapshot.fire_progress_pct < 0.0);
        assert!(snapshot.net_worth < 0.0);
    }

    #[test]
    fn missing_cash_reserve_contributes_nothing_to_liquidity() {
        let mut portfolio = small_portfolio();
        portfolio.cash_reserve_asset_id = Some("gone".to_string());
        let snapshot = compute(&portfolio, &StressParams::default());
        assert_approx(snapshot.total_liquidity, 700_000.0 + 100_000.0);

        portfolio.cash_reserve_asset_id = None;
        let snapshot = compute(&portfolio, &StressParams::default());
        assert_approx(snapshot.total_liquidity, 700_000.0 + 100_000.0);
    }

    #[test]
    fn net_investment_equity_goes_negative_when_loans_exceed_value() {
        let mut portfolio = small_portfolio();
        portfolio.liabilities[0].principal = 900_000.0;
        let snapshot = compute(&portfolio, &stress(0.5, 0.0));
        assert_approx(snapshot.net_investment_equity, -400_000.0);
        assert_approx(snapshot.investment_equity_breakdown[0].net_value, -400_000.0);
    }

    #[test]
    fn equity_breakdown_uses_first_linked_loan_only() {
        let mut portfolio = small_portfolio();
        portfolio.liabilities.push(liability(
            "pl2",
            LiabilityKind::SharePledge,
            100_000.0,
            Some("inv"),
        ));
        let snapshot = compute(&portfolio, &StressParams::default());
        assert_eq!(snapshot.investment_equity_breakdown.len(), 1);
        assert_approx(snapshot.investment_equity_breakdown[0].net_value, 700_000.0);
        assert_approx(snapshot.net_investment_equity, 600_000.0);
    }

    #[test]
    fn default_dataset_matches_hand_calculation() {
        let snapshot = compute(&default_portfolio(), &StressParams::default());

        assert_approx(snapshot.total_assets, 14_604_000.0);
        assert_approx(snapshot.total_liabilities, 8_580_000.0);
        assert_approx(snapshot.net_worth, 6_024_000.0);
        assert_approx(snapshot.net_cash_flow, 97_000.0 - 64_000.0);
        assert_approx(snapshot.fire_progress_pct, 30.12);
        assert_approx(snapshot.investment_loans_total, 3_020_000.0);
        assert_approx(snapshot.net_investment_equity, 9_484_000.0 - 3_020_000.0);
        assert_approx(
            snapshot.total_liquidity,
            9_484_000.0 - 3_020_000.0 + 420_000.0 + 860_000.0,
        );
    }

    #[test]
    fn default_policy_loan_goes_from_safe_to_liquidated_at_half_crash() {
        let portfolio = default_portfolio();
        let tier_for = |snapshot: &FinancialSnapshot| {
            snapshot
                .risk_table
                .iter()
                .find_map(|row| match row {
                    RiskRow::Liability(r) if r.liability_id == "l1" => Some((r.ratio, r.tier)),
                    _ => None,
                })
                .expect("l1 row")
        };

        let (ratio, tier) = tier_for(&compute(&portfolio, &StressParams::default()));
        assert_approx(ratio, 200_000.0 / 477_000.0);
        assert_eq!(tier, RiskTier::Safe);

        let crashed = compute(&portfolio, &stress(0.5, 0.0));
        assert_approx(crashed.adjusted_assets[0].current_value, 238_500.0);
        let (ratio, tier) = tier_for(&crashed);
        assert_approx(ratio, 200_000.0 / 238_500.0);
        assert_eq!(tier, RiskTier::Liquidated);
    }

    #[test]
    fn compute_is_deterministic() {
        let portfolio = default_portfolio();
        let s = stress(0.35, 0.015);
        assert_eq!(compute(&portfolio, &s), compute(&portfolio, &s));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_deeper_crash_never_raises_asset_totals(
            low_bp in 0u32..=5_000,
            extra_bp in 0u32..=5_000,
            hike_bp in 0u32..=200,
        ) {
            let high_bp = (low_bp + extra_bp).min(5_000);
            let hike = hike_bp as f64 / 10_000.0;
            let portfolio = default_portfolio();
            let low = compute(&portfolio, &stress(low_bp as f64 / 10_000.0, hike));
            let high = compute(&portfolio, &stress(high_bp as f64 / 10_000.0, hike));

            prop_assert!(high.total_assets <= low.total_assets + EPS);
            prop_assert!(high.net_worth <= low.net_worth + EPS);
            prop_assert!(high.net_investment_equity <= low.net_investment_equity + EPS);
            for (h, l) in high.risk_table.iter().zip(&low.risk_table) {
                prop_assert!(h.tier() >= l.tier());
            }
        }
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_rate_hike_never_improves_cash_flow(
            crash_bp in 0u32..=5_000,
            low_bp in 0u32..=200,
            extra_bp in 1u32..=200,
            principal in 1u32..5_000_000,
        ) {
            let high_bp = (low_bp + extra_bp).min(200);
            let crash = crash_bp as f64 / 10_000.0;
            let mut portfolio = small_portfolio();
            portfolio.liabilities[0].principal = principal as f64;

            let low = compute(&portfolio, &stress(crash, low_bp as f64 / 10_000.0));
            let high = compute(&portfolio, &stress(crash, high_bp as f64 / 10_000.0));
            prop_assert!(high.net_cash_flow <= low.net_cash_flow);
            if high_bp > low_bp {
                prop_assert!(high.net_cash_flow < low.net_cash_flow);
            }
            prop_assert!((high.total_profit - low.total_profit).abs() <= EPS);
        }
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_totals_are_consistent_with_breakdowns(
            crash_bp in 0u32..=5_000,
            hike_bp in 0u32..=200,
            values in proptest::collection::vec(0u32..3_000_000, 3),
        ) {
            let mut portfolio = small_portfolio();
            for (asset, value) in portfolio.assets.iter_mut().zip(&values) {
                asset.market_value = *value as f64;
            }
            let s = stress(crash_bp as f64 / 10_000.0, hike_bp as f64 / 10_000.0);
            let snapshot = compute(&portfolio, &s);

            let by_kind = snapshot.assets_by_kind;
            prop_assert!(
                (by_kind.investment + by_kind.real_estate + by_kind.cash - snapshot.total_assets).abs()
                    <= EPS
            );
            prop_assert!(
                (snapshot.net_worth - (snapshot.total_assets - snapshot.total_liabilities)).abs()
                    <= EPS
            );
            prop_assert!(snapshot.fire_progress_pct.is_finite());
            prop_assert!(snapshot.roi_pct.is_finite());
        }
    }
}
