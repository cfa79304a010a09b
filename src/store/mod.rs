//! Snapshot persistence and the JSON interchange document.
//!
//! The on-disk save file and the export/import backup share one layout, so a
//! backup produced by the dashboard can be dropped in as a save file and the
//! other way round.

mod autosave;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::{
    Asset, DEFAULT_CASH_RESERVE_ID, IncomeExpense, Liability, Portfolio, Result,
    default_portfolio,
};

pub use autosave::Autosaver;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterchangeDocument {
    pub assets: Vec<Asset>,
    pub liabilities: Vec<Liability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub income_expense: Option<IncomeExpense>,
    /// Absent means the default reserve; an explicit `null` means none.
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub cash_reserve_asset_id: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_saved_at: Option<DateTime<Utc>>,
}

impl InterchangeDocument {
    pub fn export(portfolio: &Portfolio, now: DateTime<Utc>) -> Self {
        Self {
            export_date: Some(now),
            ..Self::from_portfolio(portfolio)
        }
    }

    fn from_portfolio(portfolio: &Portfolio) -> Self {
        Self {
            assets: portfolio.assets.clone(),
            liabilities: portfolio.liabilities.clone(),
            income_expense: Some(portfolio.income_expense.clone()),
            cash_reserve_asset_id: Some(portfolio.cash_reserve_asset_id.clone()),
            export_date: None,
            last_saved_at: None,
        }
    }

    /// Missing income/expense figures fall back to the defaults; a missing
    /// cash-reserve id falls back to the default reserve asset.
    pub fn into_portfolio(self) -> Result<Portfolio> {
        let portfolio = Portfolio {
            assets: self.assets,
            liabilities: self.liabilities,
            income_expense: self
                .income_expense
                .unwrap_or_else(|| default_portfolio().income_expense),
            cash_reserve_asset_id: self
                .cash_reserve_asset_id
                .unwrap_or_else(|| Some(DEFAULT_CASH_RESERVE_ID.to_string())),
        };
        portfolio.validate()?;
        Ok(portfolio)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn present_or_null<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// JSON file holding the last saved session.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the saved session. A missing file yields the default dataset; a
    /// malformed one is reported so it is never silently overwritten.
    pub fn load(&self) -> Result<Portfolio> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "no saved snapshot, starting from defaults");
            return Ok(default_portfolio());
        }
        let raw = fs::read_to_string(&self.path)?;
        let portfolio = InterchangeDocument::from_json(&raw)?.into_portfolio()?;
        info!(
            path = %self.path.display(),
            assets = portfolio.assets.len(),
            liabilities = portfolio.liabilities.len(),
            "loaded snapshot"
        );
        Ok(portfolio)
    }

    /// Writes through a uniquely named sibling temp file so a crash mid-write
    /// keeps the previous save intact and concurrent writers never share one.
    pub fn save(&self, portfolio: &Portfolio) -> Result<DateTime<Utc>> {
        let saved_at = Utc::now();
        let doc = InterchangeDocument {
            last_saved_at: Some(saved_at),
            ..InterchangeDocument::from_portfolio(portfolio)
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self
            .path
            .with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        let written = fs::write(&tmp, doc.to_json()?).and_then(|()| fs::rename(&tmp, &self.path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        debug!(path = %self.path.display(), %saved_at, "snapshot saved");
        Ok(saved_at)
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "saved snapshot removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to remove snapshot");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn scratch_path(label: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("strategy-core-{label}-{}", Uuid::new_v4()))
        .join("snapshot.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Error, StressParams, TableView, compute_with_view};

    const LEGACY_BACKUP: &str = r#"{
      "assets": [
        { "id": "p1", "name": "Policy A", "type": "investment", "marketValue": 477000, "cost": 500000, "annualDividend": 0, "realizedDividend": 12000 },
        { "id": "c1", "name": "Cash", "type": "cash", "marketValue": 420000, "cost": 420000, "annualDividend": 0, "realizedDividend": 0 }
      ],
      "liabilities": [
        { "id": "l1", "name": "Policy A loan", "type": "policy", "principal": 200000, "interestRate": 0.0317, "relatedAssetId": "p1", "maintenanceThreshold": 0.5 },
        { "id": "l8", "name": "Credit", "type": "credit", "principal": 956000, "interestRate": 0.035 }
      ],
      "incomeExpense": {
        "monthlyActiveIncome": 42000, "monthlyPassiveIncome": 55000, "monthlyMortgagePayment": 31000,
        "monthlyCreditPayment": 13000, "monthlyBaseLivingExpense": 20000, "fireGoal": 20000000, "unusedCreditLimit": 860000
      },
      "exportDate": "2025-01-15T08:30:00.000Z"
    }"#;

    #[test]
    fn legacy_backup_parses_with_optional_fields_absent() {
        let doc = InterchangeDocument::from_json(LEGACY_BACKUP).expect("valid backup");
        assert!(doc.export_date.is_some());
        let portfolio = doc.into_portfolio().expect("valid portfolio");

        assert_eq!(portfolio.assets[0].cost_basis, 500_000.0);
        assert_eq!(portfolio.assets[0].realized_income, 12_000.0);
        assert_eq!(
            portfolio.liabilities[0].collateral_asset_id.as_deref(),
            Some("p1")
        );
        assert!(portfolio.liabilities[1].collateral_asset_id.is_none());
        assert!(portfolio.liabilities[1].maintenance_threshold.is_none());
        assert_eq!(
            portfolio.cash_reserve_asset_id.as_deref(),
            Some(DEFAULT_CASH_RESERVE_ID)
        );
    }

    #[test]
    fn documents_without_assets_are_rejected() {
        let err = InterchangeDocument::from_json(r#"{"liabilities": []}"#).expect_err("no assets");
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn missing_income_expense_falls_back_to_defaults() {
        let doc = InterchangeDocument::from_json(r#"{"assets": [], "liabilities": []}"#)
            .expect("minimal document");
        let portfolio = doc.into_portfolio().expect("valid");
        assert_eq!(portfolio.income_expense, default_portfolio().income_expense);
    }

    #[test]
    fn export_then_import_computes_identically() {
        let portfolio = default_portfolio();
        let json = InterchangeDocument::export(&portfolio, Utc::now())
            .to_json()
            .expect("serializable");
        let restored = InterchangeDocument::from_json(&json)
            .and_then(InterchangeDocument::into_portfolio)
            .expect("round trip");

        assert_eq!(restored, portfolio);
        let stress = StressParams::new(0.3, 0.01).expect("valid stress");
        assert_eq!(
            compute_with_view(&restored, &stress, TableView::Expanded),
            compute_with_view(&portfolio, &stress, TableView::Expanded)
        );
    }

    #[test]
    fn explicit_null_cash_reserve_survives_export() {
        let mut portfolio = default_portfolio();
        portfolio.cash_reserve_asset_id = None;
        let json = InterchangeDocument::export(&portfolio, Utc::now())
            .to_json()
            .expect("serializable");
        assert!(json.contains("\"cashReserveAssetId\": null"));

        let restored = InterchangeDocument::from_json(&json)
            .and_then(InterchangeDocument::into_portfolio)
            .expect("round trip");
        assert_eq!(restored.cash_reserve_asset_id, None);
        let stress = StressParams::default();
        assert_eq!(
            compute_with_view(&restored, &stress, TableView::Compact).total_liquidity,
            compute_with_view(&portfolio, &stress, TableView::Compact).total_liquidity
        );
    }

    #[test]
    fn store_round_trips_and_clears() {
        let store = SnapshotStore::new(scratch_path("store"));
        assert_eq!(store.load().expect("defaults"), default_portfolio());

        let mut portfolio = default_portfolio();
        portfolio.income_expense.fire_goal = 12_345_678.0;
        store.save(&portfolio).expect("saved");
        assert_eq!(store.load().expect("reloaded"), portfolio);

        store.clear().expect("cleared");
        store.clear().expect("clearing twice is fine");
        assert_eq!(store.load().expect("defaults again"), default_portfolio());
    }

    #[test]
    fn concurrent_saves_all_succeed() {
        let store = std::sync::Arc::new(SnapshotStore::new(scratch_path("concurrent")));
        let writers = (0..2)
            .map(|i| {
                let store = std::sync::Arc::clone(&store);
                std::thread::spawn(move || {
                    let mut portfolio = default_portfolio();
                    portfolio.income_expense.fire_goal = 1_000_000.0 * (i + 1) as f64;
                    (0..100).filter(|_| store.save(&portfolio).is_err()).count()
                })
            })
            .collect::<Vec<_>>();

        for writer in writers {
            assert_eq!(writer.join().expect("writer thread"), 0);
        }
        let goal = store.load().expect("one writer won").income_expense.fire_goal;
        assert!(goal == 1_000_000.0 || goal == 2_000_000.0);
        let leftovers = fs::read_dir(store.path().parent().expect("scratch dir"))
            .expect("readable")
            .count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn malformed_save_file_is_reported() {
        let store = SnapshotStore::new(scratch_path("malformed"));
        if let Some(parent) = store.path().parent() {
            fs::create_dir_all(parent).expect("scratch dir");
        }
        fs::write(store.path(), "{ not json").expect("write garbage");
        assert!(matches!(store.load(), Err(Error::Json(_))));
    }
}
