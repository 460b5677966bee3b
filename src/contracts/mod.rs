use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

use crate::{api::ApiError, protocol::ContractAnalysis};

#[async_trait]
pub trait ContractStore: Send + Sync {
    async fn list(&self) -> Result<Vec<ContractAnalysis>, ApiError>;

    async fn delete(&self, id: &str) -> Result<(), ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeColor {
    Blue,
    Green,
    Yellow,
    Emerald,
    Pink,
    Orange,
    Red,
    Gray,
}

static CONTRACT_TYPE_BADGES: Lazy<HashMap<&'static str, BadgeColor>> = Lazy::new(|| {
    HashMap::from([
        ("Employment", BadgeColor::Blue),
        ("Non-Disclosure Agreement", BadgeColor::Green),
        ("Sales", BadgeColor::Yellow),
        ("Lease", BadgeColor::Emerald),
        ("Service", BadgeColor::Pink),
        ("Other", BadgeColor::Gray),
    ])
});

pub fn contract_type_badge(contract_type: &str) -> BadgeColor {
    CONTRACT_TYPE_BADGES
        .get(contract_type)
        .copied()
        .unwrap_or(BadgeColor::Gray)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreTier {
    Excellent,
    Good,
    Fair,
    Weak,
    Poor,
}

impl ScoreTier {
    pub fn from_score(score: Option<f64>) -> Self {
        match score {
            Some(value) if value >= 80.0 => ScoreTier::Excellent,
            Some(value) if value >= 70.0 => ScoreTier::Good,
            Some(value) if value >= 60.0 => ScoreTier::Fair,
            Some(value) if value >= 50.0 => ScoreTier::Weak,
            _ => ScoreTier::Poor,
        }
    }

    pub fn color(self) -> BadgeColor {
        match self {
            ScoreTier::Excellent => BadgeColor::Green,
            ScoreTier::Good => BadgeColor::Blue,
            ScoreTier::Fair => BadgeColor::Yellow,
            ScoreTier::Weak => BadgeColor::Orange,
            ScoreTier::Poor => BadgeColor::Red,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContractRow {
    pub id: String,
    pub score_label: String,
    pub tier: ScoreTier,
    pub contract_type: String,
    pub type_badge: BadgeColor,
}

impl ContractRow {
    fn from_record(record: &ContractAnalysis) -> Self {
        let score = record.score();
        let contract_type = record
            .contract_type
            .clone()
            .unwrap_or_else(|| "Other".to_string());

        Self {
            id: record.id.clone(),
            score_label: score
                .map(|value| format!("{:.2}", value))
                .unwrap_or_else(|| "n/a".to_string()),
            tier: ScoreTier::from_score(score),
            type_badge: contract_type_badge(&contract_type),
            contract_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContractsSummary {
    pub total: usize,
    pub average_score: f64,
    pub high_risk: usize,
}

impl ContractsSummary {
    pub fn from_records(records: &[ContractAnalysis]) -> Self {
        let total = records.len();
        let average_score = if total == 0 {
            0.0
        } else {
            let sum: f64 = records
                .iter()
                .map(|record| record.score().unwrap_or(0.0))
                .sum();
            sum / total as f64
        };

        // Stored severities are compared as-is, without case folding.
        let high_risk = records
            .iter()
            .filter(|record| {
                record
                    .risks
                    .iter()
                    .any(|risk| risk.severity.as_deref() == Some("high"))
            })
            .count();

        Self {
            total,
            average_score,
            high_risk,
        }
    }
}

/// The user's analyses as last fetched, minus anything deleted since.
pub struct ContractList<S: ?Sized> {
    store: Arc<S>,
    records: Vec<ContractAnalysis>,
    deleted: HashSet<String>,
    loaded: bool,
}

impl<S> ContractList<S>
where
    S: ContractStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            records: Vec::new(),
            deleted: HashSet::new(),
            loaded: false,
        }
    }

    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn records(&self) -> &[ContractAnalysis] {
        &self.records
    }

    pub fn summary(&self) -> ContractsSummary {
        ContractsSummary::from_records(&self.records)
    }

    pub fn rows(&self) -> Vec<ContractRow> {
        self.records.iter().map(ContractRow::from_record).collect()
    }

    pub async fn refresh(&mut self) -> Result<(), ApiError> {
        let outcome = self.store.list().await;
        self.apply_fetch(outcome)
    }

    pub async fn delete(&mut self, id: &str) -> Result<(), ApiError> {
        let outcome = self.store.delete(id).await;
        self.apply_delete(id, outcome)
    }

    /// Folds a finished list fetch into the view. Errors leave it unchanged.
    pub fn apply_fetch(
        &mut self,
        outcome: Result<Vec<ContractAnalysis>, ApiError>,
    ) -> Result<(), ApiError> {
        let fetched = outcome.inspect_err(|err| warn!(%err, "failed to fetch contracts"))?;
        let before = fetched.len();
        self.records = fetched
            .into_iter()
            .filter(|record| !self.deleted.contains(&record.id))
            .collect();
        self.loaded = true;

        debug!(
            fetched = before,
            kept = self.records.len(),
            "contract list refreshed"
        );
        Ok(())
    }

    pub fn apply_delete(
        &mut self,
        id: &str,
        outcome: Result<(), ApiError>,
    ) -> Result<(), ApiError> {
        outcome.inspect_err(|err| warn!(%err, contract = id, "failed to delete contract"))?;
        self.records.retain(|record| record.id != id);
        self.deleted.insert(id.to_string());
        info!(contract = id, "contract deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    fn record(value: Value) -> ContractAnalysis {
        serde_json::from_value(value).unwrap()
    }

    struct FakeStore {
        records: Mutex<Vec<ContractAnalysis>>,
        fail_deletes: bool,
        fail_lists: Mutex<bool>,
    }

    impl FakeStore {
        fn new(records: Vec<ContractAnalysis>, fail_deletes: bool) -> Arc<Self> {
            Arc::new(Self {
                records: Mutex::new(records),
                fail_deletes,
                fail_lists: Mutex::new(false),
            })
        }
    }

    #[async_trait]
    impl ContractStore for FakeStore {
        async fn list(&self) -> Result<Vec<ContractAnalysis>, ApiError> {
            if *self.fail_lists.lock().unwrap() {
                return Err(ApiError::Network("Failed to load contracts".into()));
            }
            Ok(self.records.lock().unwrap().clone())
        }

        async fn delete(&self, id: &str) -> Result<(), ApiError> {
            if self.fail_deletes {
                return Err(ApiError::Server {
                    status: 500,
                    message: "Failed to delete contract".into(),
                });
            }
            self.records.lock().unwrap().retain(|record| record.id != id);
            Ok(())
        }
    }

    fn sample() -> Vec<ContractAnalysis> {
        vec![
            record(json!({
                "_id": "a",
                "overallScore": 90,
                "contractType": "Lease",
                "risks": [
                    { "risk": "r1", "severity": "high" },
                    { "risk": "r2", "severity": "high" }
                ]
            })),
            record(json!({
                "_id": "b",
                "overallScore": "bad",
                "contractType": "Franchise",
                "risks": [{ "risk": "r3", "severity": "HIGH" }]
            })),
            record(json!({
                "_id": "c",
                "overallScore": "50",
                "risks": [{ "risk": "r4", "severity": "low" }, { "risk": "r5", "severity": "high" }]
            })),
        ]
    }

    #[test]
    fn summary_averages_with_non_numeric_as_zero() {
        let summary = ContractsSummary::from_records(&sample());

        assert_eq!(summary.total, 3);
        assert!((summary.average_score - 140.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary.high_risk, 2, "exact 'high' only, once per contract");
    }

    #[test]
    fn absent_and_non_numeric_scores_stay_in_the_denominator() {
        let records = vec![
            record(json!({ "_id": "a", "overallScore": 90 })),
            record(json!({ "_id": "b", "overallScore": "bad" })),
            record(json!({ "_id": "c", "overallScore": 50 })),
        ];
        let summary = ContractsSummary::from_records(&records);
        assert_eq!(summary.total, 3);
        assert!((summary.average_score - 140.0 / 3.0).abs() < 1e-9);

        let mut records = records;
        records.push(record(json!({ "_id": "d", "contractType": "Sales" })));
        let summary = ContractsSummary::from_records(&records);
        assert_eq!(summary.total, 4);
        assert!((summary.average_score - 35.0).abs() < 1e-9);
    }

    #[test]
    fn empty_summary_is_zero() {
        let summary = ContractsSummary::from_records(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.average_score, 0.0);
        assert_eq!(summary.high_risk, 0);
    }

    #[test]
    fn rows_project_score_and_badges() {
        let rows: Vec<ContractRow> = sample().iter().map(ContractRow::from_record).collect();

        assert_eq!(rows[0].score_label, "90.00");
        assert_eq!(rows[0].tier, ScoreTier::Excellent);
        assert_eq!(rows[0].type_badge, BadgeColor::Emerald);
        assert_eq!(rows[1].score_label, "n/a");
        assert_eq!(rows[1].tier, ScoreTier::Poor);
        assert_eq!(rows[1].type_badge, BadgeColor::Gray);
        assert_eq!(rows[2].tier, ScoreTier::Weak);
        assert_eq!(rows[2].contract_type, "Other");
    }

    #[tokio::test]
    async fn deleted_records_do_not_come_back() {
        let store = FakeStore::new(sample(), false);
        let mut list = ContractList::new(Arc::clone(&store));
        list.refresh().await.unwrap();
        assert_eq!(list.records().len(), 3);

        list.delete("b").await.unwrap();
        assert!(list.records().iter().all(|record| record.id != "b"));

        // A fetch that raced the delete still carries the old record.
        list.apply_fetch(Ok(sample())).unwrap();
        assert_eq!(list.records().len(), 2);
        assert!(list.records().iter().all(|record| record.id != "b"));

        list.refresh().await.unwrap();
        assert_eq!(list.records().len(), 2);
    }

    #[tokio::test]
    async fn failed_delete_leaves_list_unchanged() {
        let store = FakeStore::new(sample(), true);
        let mut list = ContractList::new(store);
        list.refresh().await.unwrap();
        let before = list.records().to_vec();

        let err = list.delete("a").await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to delete contract");
        assert_eq!(list.records(), before.as_slice());
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_records() {
        let store = FakeStore::new(sample(), false);
        let mut list = ContractList::new(Arc::clone(&store));
        list.refresh().await.unwrap();

        *store.fail_lists.lock().unwrap() = true;
        assert!(list.refresh().await.is_err());
        assert_eq!(list.records().len(), 3);
        assert!(list.is_loaded());
    }
}
