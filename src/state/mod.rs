use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::protocol::ContractAnalysis;

/// Most recent completed analysis. Only the upload workflow writes it.
#[derive(Debug, Clone, Default)]
pub struct LatestAnalysis {
    inner: Arc<RwLock<Option<Arc<ContractAnalysis>>>>,
}

impl LatestAnalysis {
    pub(crate) async fn publish(&self, analysis: Arc<ContractAnalysis>) {
        debug!(contract = %analysis.id, "publishing latest analysis");
        let mut slot = self.inner.write().await;
        *slot = Some(analysis);
    }

    pub async fn snapshot(&self) -> Option<Arc<ContractAnalysis>> {
        let slot = self.inner.read().await;
        slot.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn analysis(id: &str) -> Arc<ContractAnalysis> {
        Arc::new(serde_json::from_value(json!({ "_id": id })).unwrap())
    }

    #[tokio::test]
    async fn clones_share_the_same_slot() {
        let latest = LatestAnalysis::default();
        let reader = latest.clone();
        assert!(reader.snapshot().await.is_none());

        latest.publish(analysis("first")).await;
        latest.publish(analysis("second")).await;

        let current = reader.snapshot().await.expect("analysis should be published");
        assert_eq!(current.id, "second");
    }
}
