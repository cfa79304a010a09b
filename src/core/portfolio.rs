use std::collections::HashSet;

use serde::Deserialize;
use uuid::Uuid;

use super::error::{Error, Result};
use super::types::{
    Asset, AssetKind, DEFAULT_CASH_RESERVE_ID, IncomeExpense, Liability, LiabilityKind, Portfolio,
};

/// Rate and threshold given to the loan created alongside a new asset.
const PAIRED_LOAN_RATE: f64 = 0.03;
const PAIRED_LOAN_THRESHOLD: f64 = 0.5;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetField {
    #[serde(alias = "market_value")]
    MarketValue,
    #[serde(alias = "cost", alias = "cost_basis")]
    CostBasis,
    #[serde(alias = "realizedDividend", alias = "realized_income")]
    RealizedIncome,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LiabilityField {
    Principal,
    #[serde(alias = "interestRate", alias = "annual_rate")]
    AnnualRate,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IncomeExpenseField {
    #[serde(alias = "monthly_active_income")]
    MonthlyActiveIncome,
    #[serde(alias = "monthly_passive_income")]
    MonthlyPassiveIncome,
    #[serde(alias = "monthly_mortgage_payment")]
    MonthlyMortgagePayment,
    #[serde(alias = "monthly_credit_payment")]
    MonthlyCreditPayment,
    #[serde(alias = "monthly_base_living_expense")]
    MonthlyBaseLivingExpense,
    #[serde(alias = "fire_goal")]
    FireGoal,
    #[serde(alias = "unused_credit_limit")]
    UnusedCreditLimit,
}

impl IncomeExpenseField {
    fn label(self) -> &'static str {
        match self {
            IncomeExpenseField::MonthlyActiveIncome => "monthlyActiveIncome",
            IncomeExpenseField::MonthlyPassiveIncome => "monthlyPassiveIncome",
            IncomeExpenseField::MonthlyMortgagePayment => "monthlyMortgagePayment",
            IncomeExpenseField::MonthlyCreditPayment => "monthlyCreditPayment",
            IncomeExpenseField::MonthlyBaseLivingExpense => "monthlyBaseLivingExpense",
            IncomeExpenseField::FireGoal => "fireGoal",
            IncomeExpenseField::UnusedCreditLimit => "unusedCreditLimit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAsset {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: AssetKind,
    #[serde(default)]
    pub market_value: f64,
    #[serde(default, alias = "cost")]
    pub cost_basis: f64,
    #[serde(default, alias = "realizedDividend")]
    pub realized_income: f64,
    /// Principal of a loan opened against the new asset, if any.
    #[serde(default)]
    pub loan: Option<f64>,
}

/// One user action against the session portfolio.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum PortfolioEdit {
    AddAsset {
        asset: NewAsset,
    },
    UpdateAsset {
        id: String,
        field: AssetField,
        value: f64,
    },
    DeleteAsset {
        id: String,
    },
    AddLiability {
        liability: Liability,
    },
    UpdateLiability {
        id: String,
        field: LiabilityField,
        value: f64,
    },
    DeleteLiability {
        id: String,
    },
    UpdateIncomeExpense {
        field: IncomeExpenseField,
        value: f64,
    },
}

impl Portfolio {
    /// Returns the snapshot that results from `edit`; `self` is left untouched.
    pub fn apply(&self, edit: PortfolioEdit) -> Result<Portfolio> {
        let mut next = self.clone();
        match edit {
            PortfolioEdit::AddAsset { asset } => next.add_asset(asset)?,
            PortfolioEdit::UpdateAsset { id, field, value } => {
                let value = check_amount(asset_field_label(field), value)?;
                let asset = next
                    .assets
                    .iter_mut()
                    .find(|a| a.id == id)
                    .ok_or(Error::UnknownAsset(id))?;
                match field {
                    AssetField::MarketValue => asset.market_value = value,
                    AssetField::CostBasis => asset.cost_basis = value,
                    AssetField::RealizedIncome => asset.realized_income = value,
                }
            }
            PortfolioEdit::DeleteAsset { id } => {
                next = self.without_asset(&id)?;
            }
            PortfolioEdit::AddLiability { liability } => {
                check_liability(&liability)?;
                if next.liabilities.iter().any(|l| l.id == liability.id) {
                    return Err(Error::DuplicateId(liability.id));
                }
                next.liabilities.push(liability);
            }
            PortfolioEdit::UpdateLiability { id, field, value } => {
                let value = match field {
                    LiabilityField::Principal => check_amount("principal", value)?,
                    LiabilityField::AnnualRate => check_amount("interestRate", value)?,
                };
                let liability = next
                    .liabilities
                    .iter_mut()
                    .find(|l| l.id == id)
                    .ok_or(Error::UnknownLiability(id))?;
                match field {
                    LiabilityField::Principal => liability.principal = value,
                    LiabilityField::AnnualRate => liability.annual_rate = value,
                }
            }
            PortfolioEdit::DeleteLiability { id } => {
                let before = next.liabilities.len();
                next.liabilities.retain(|l| l.id != id);
                if next.liabilities.len() == before {
                    return Err(Error::UnknownLiability(id));
                }
            }
            PortfolioEdit::UpdateIncomeExpense { field, value } => {
                let value = check_amount(field.label(), value)?;
                let ie = &mut next.income_expense;
                let slot = match field {
                    IncomeExpenseField::MonthlyActiveIncome => &mut ie.monthly_active_income,
                    IncomeExpenseField::MonthlyPassiveIncome => &mut ie.monthly_passive_income,
                    IncomeExpenseField::MonthlyMortgagePayment => {
                        &mut ie.monthly_mortgage_payment
                    }
                    IncomeExpenseField::MonthlyCreditPayment => &mut ie.monthly_credit_payment,
                    IncomeExpenseField::MonthlyBaseLivingExpense => {
                        &mut ie.monthly_base_living_expense
                    }
                    IncomeExpenseField::FireGoal => &mut ie.fire_goal,
                    IncomeExpenseField::UnusedCreditLimit => &mut ie.unused_credit_limit,
                };
                *slot = value;
            }
        }
        Ok(next)
    }

    /// Removes the asset and every liability that uses it as collateral.
    pub fn without_asset(&self, id: &str) -> Result<Portfolio> {
        if !self.assets.iter().any(|a| a.id == id) {
            return Err(Error::UnknownAsset(id.to_string()));
        }
        let mut next = self.clone();
        next.assets.retain(|a| a.id != id);
        next.liabilities
            .retain(|l| l.collateral_asset_id.as_deref() != Some(id));
        Ok(next)
    }

    fn add_asset(&mut self, new: NewAsset) -> Result<()> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::EmptyName);
        }
        let market_value = check_amount("marketValue", new.market_value)?;
        let cost_basis = check_amount("cost", new.cost_basis)?;
        let realized_income = check_amount("realizedDividend", new.realized_income)?;
        let loan = new.loan.map(|v| check_amount("loan", v)).transpose()?;

        let id = new.id.unwrap_or_else(|| generated_id("a"));
        if self.assets.iter().any(|a| a.id == id) {
            return Err(Error::DuplicateId(id));
        }

        if let Some(principal) = loan.filter(|p| *p > 0.0) {
            let kind = match new.kind {
                AssetKind::Investment => LiabilityKind::PolicyLoan,
                AssetKind::RealEstate | AssetKind::Cash => LiabilityKind::Mortgage,
            };
            self.liabilities.push(Liability {
                id: generated_id("l"),
                name: format!("{name} loan"),
                kind,
                principal,
                annual_rate: PAIRED_LOAN_RATE,
                collateral_asset_id: Some(id.clone()),
                maintenance_threshold: Some(PAIRED_LOAN_THRESHOLD),
            });
        }

        self.assets.push(Asset {
            id,
            name,
            kind: new.kind,
            market_value,
            cost_basis,
            annual_income: 0.0,
            realized_income,
        });
        Ok(())
    }

    /// Checks the invariants a loaded or imported snapshot must satisfy before
    /// it becomes the session state.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for asset in &self.assets {
            if !seen.insert(asset.id.as_str()) {
                return Err(Error::DuplicateId(asset.id.clone()));
            }
            check_amount("marketValue", asset.market_value)?;
            check_amount("cost", asset.cost_basis)?;
            check_amount("realizedDividend", asset.realized_income)?;
        }
        let mut seen = HashSet::new();
        for liability in &self.liabilities {
            if !seen.insert(liability.id.as_str()) {
                return Err(Error::DuplicateId(liability.id.clone()));
            }
            check_liability(liability)?;
        }
        let ie = &self.income_expense;
        for (field, value) in [
            ("monthlyActiveIncome", ie.monthly_active_income),
            ("monthlyPassiveIncome", ie.monthly_passive_income),
            ("monthlyMortgagePayment", ie.monthly_mortgage_payment),
            ("monthlyCreditPayment", ie.monthly_credit_payment),
            ("monthlyBaseLivingExpense", ie.monthly_base_living_expense),
            ("fireGoal", ie.fire_goal),
            ("unusedCreditLimit", ie.unused_credit_limit),
        ] {
            check_amount(field, value)?;
        }
        Ok(())
    }
}

fn asset_field_label(field: AssetField) -> &'static str {
    match field {
        AssetField::MarketValue => "marketValue",
        AssetField::CostBasis => "cost",
        AssetField::RealizedIncome => "realizedDividend",
    }
}

fn check_liability(liability: &Liability) -> Result<()> {
    check_amount("principal", liability.principal)?;
    check_amount("interestRate", liability.annual_rate)?;
    Ok(())
}

fn check_amount(field: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(Error::InvalidValue { field, value })
    }
}

fn generated_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

/// The household the dashboard starts with before anything is saved.
pub fn default_portfolio() -> Portfolio {
    let asset = |id: &str, name: &str, kind, market_value, cost_basis, realized_income| Asset {
        id: id.to_string(),
        name: name.to_string(),
        kind,
        market_value,
        cost_basis,
        annual_income: 0.0,
        realized_income,
    };
    let liability =
        |id: &str, name: &str, kind, principal, annual_rate, collateral: Option<&str>, threshold| {
            Liability {
                id: id.to_string(),
                name: name.to_string(),
                kind,
                principal,
                annual_rate,
                collateral_asset_id: collateral.map(str::to_string),
                maintenance_threshold: threshold,
            }
        };

    use AssetKind::{Cash, Investment, RealEstate};
    use LiabilityKind::{CreditLine, Mortgage, PolicyLoan, SharePledge};

    Portfolio {
        assets: vec![
            asset("p1", "Policy A (annuity)", Investment, 477_000.0, 500_000.0, 12_000.0),
            asset("p2", "Policy B (whole life)", Investment, 1_477_000.0, 1_500_000.0, 35_000.0),
            asset("p3", "Policy C (annuity)", Investment, 1_800_000.0, 1_729_999.0, 80_000.0),
            asset("p4", "Policy D (core)", Investment, 3_280_000.0, 3_030_000.0, 150_000.0),
            asset("s1", "Pledged share portfolio", Investment, 2_450_000.0, 1_890_000.0, 660_000.0),
            asset("r1", "Residence (appraised)", RealEstate, 4_700_000.0, 4_700_000.0, 0.0),
            asset(DEFAULT_CASH_RESERVE_ID, "Emergency cash reserve", Cash, 420_000.0, 420_000.0, 0.0),
        ],
        liabilities: vec![
            liability("l1", "Policy A loan", PolicyLoan, 200_000.0, 0.0317, Some("p1"), Some(0.5)),
            liability("l2", "Policy B loan", PolicyLoan, 650_000.0, 0.0317, Some("p2"), Some(0.5)),
            liability("l3", "Policy C loan", PolicyLoan, 790_000.0, 0.04, Some("p3"), Some(0.5)),
            liability("l4", "Policy D loan", PolicyLoan, 880_000.0, 0.04, Some("p4"), Some(0.5)),
            liability("l6", "Share pledge loan", SharePledge, 500_000.0, 0.03, Some("s1"), Some(1.3)),
            liability("l7", "Home mortgage", Mortgage, 4_604_000.0, 0.021, None, None),
            liability("l8", "Personal credit line", CreditLine, 956_000.0, 0.035, None, None),
        ],
        income_expense: IncomeExpense {
            monthly_active_income: 42_000.0,
            monthly_passive_income: 55_000.0,
            monthly_mortgage_payment: 31_000.0,
            monthly_credit_payment: 13_000.0,
            monthly_base_living_expense: 20_000.0,
            fire_goal: 20_000_000.0,
            unused_credit_limit: 860_000.0,
        },
        cash_reserve_asset_id: Some(DEFAULT_CASH_RESERVE_ID.to_string()),
    }
}
