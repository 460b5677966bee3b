use crate::protocol::{ContractAnalysis, Opportunity, Risk};

pub const FREE_TIER_VISIBLE: usize = 3;
pub const FALLBACK_SCORE: f64 = 45.0;

const NO_SUMMARY: &str = "No summary available.";
const NO_LEGAL_COMPLIANCE: &str = "No legal compliance information available.";
const NO_KEY_CLAUSES: &str = "No key clauses have been identified for this contract.";
const NO_CLAUSE_DETAILS: &str = "No details provided";
const NO_RECOMMENDATIONS: &str = "No recommendations available.";
const NO_NEGOTIATION_POINTS: &str = "No negotiation points available.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    High,
    Medium,
    Low,
    Unknown,
}

impl Bucket {
    pub fn classify(level: Option<&str>) -> Self {
        match level.map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("high") => Bucket::High,
            Some(value) if value.eq_ignore_ascii_case("medium") => Bucket::Medium,
            Some(value) if value.eq_ignore_ascii_case("low") => Bucket::Low,
            _ => Bucket::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindingKind {
    Risk,
    Opportunity,
}

impl FindingKind {
    pub fn level_label(self) -> &'static str {
        match self {
            FindingKind::Risk => "Severity",
            FindingKind::Opportunity => "Impact",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindingEntry {
    pub title: String,
    pub explanation: String,
    pub level: String,
    pub bucket: Bucket,
}

impl FindingEntry {
    fn from_risk(risk: &Risk) -> Self {
        Self::new(
            risk.risk.as_deref(),
            risk.explanation.as_deref(),
            risk.severity.as_deref(),
        )
    }

    fn from_opportunity(opportunity: &Opportunity) -> Self {
        Self::new(
            opportunity.opportunity.as_deref(),
            opportunity.explanation.as_deref(),
            opportunity.impact.as_deref(),
        )
    }

    fn new(title: Option<&str>, explanation: Option<&str>, level: Option<&str>) -> Self {
        Self {
            title: title.unwrap_or_default().to_string(),
            explanation: explanation.unwrap_or_default().to_string(),
            level: level.unwrap_or_default().to_string(),
            bucket: Bucket::classify(level),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindingView {
    Visible(FindingEntry),
    /// Blurred teaser for the first hidden item.
    Locked {
        preview: FindingEntry,
        hidden_count: usize,
    },
}

pub fn gate_findings(entries: Vec<FindingEntry>, premium_viewer: bool) -> Vec<FindingView> {
    if premium_viewer {
        return entries.into_iter().map(FindingView::Visible).collect();
    }

    let total = entries.len();
    let mut entries = entries.into_iter();
    let mut views: Vec<FindingView> = entries
        .by_ref()
        .take(FREE_TIER_VISIBLE)
        .map(FindingView::Visible)
        .collect();

    if let Some(preview) = entries.next() {
        views.push(FindingView::Locked {
            preview,
            hidden_count: total - FREE_TIER_VISIBLE,
        });
    }

    views
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreTrend {
    Good,
    Average,
    Bad,
}

impl ScoreTrend {
    pub fn from_score(score: f64) -> Self {
        if score > 70.0 {
            ScoreTrend::Good
        } else if score > 50.0 {
            ScoreTrend::Average
        } else {
            ScoreTrend::Bad
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ScoreTrend::Good => "Good",
            ScoreTrend::Average => "Average",
            ScoreTrend::Bad => "Bad",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultsTab {
    Summary,
    Risks,
    Opportunities,
    Details,
}

impl ResultsTab {
    pub const ALL: [ResultsTab; 4] = [
        ResultsTab::Summary,
        ResultsTab::Risks,
        ResultsTab::Opportunities,
        ResultsTab::Details,
    ];

    pub fn title(self) -> &'static str {
        match self {
            ResultsTab::Summary => "Summary",
            ResultsTab::Risks => "Risks",
            ResultsTab::Opportunities => "Opportunities",
            ResultsTab::Details => "Details",
        }
    }

    pub fn index(self) -> usize {
        Self::ALL
            .iter()
            .position(|tab| *tab == self)
            .unwrap_or_default()
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn previous(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetailsView {
    pub key_clauses: Vec<String>,
    pub clause_details: String,
    pub legal_compliance: String,
    pub recommendations: Vec<String>,
    pub negotiation_points: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultsView {
    pub contract_id: String,
    pub contract_type: String,
    pub score: f64,
    pub trend: ScoreTrend,
    pub risk_percent: f64,
    pub opportunity_percent: f64,
    pub summary: String,
    pub risks: Vec<FindingView>,
    pub opportunities: Vec<FindingView>,
    pub details: DetailsView,
    pub premium_viewer: bool,
}

impl ResultsView {
    pub fn build(analysis: &ContractAnalysis, premium_viewer: bool) -> Self {
        let score = analysis.score().unwrap_or(FALLBACK_SCORE);

        let risks = analysis.risks.iter().map(FindingEntry::from_risk).collect();
        let opportunities = analysis
            .opportunities
            .iter()
            .map(FindingEntry::from_opportunity)
            .collect();

        Self {
            contract_id: analysis.id.clone(),
            contract_type: analysis
                .contract_type
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            score,
            trend: ScoreTrend::from_score(score),
            risk_percent: 100.0 - score,
            opportunity_percent: score,
            summary: non_empty(analysis.summary.as_deref()).unwrap_or(NO_SUMMARY).to_string(),
            risks: gate_findings(risks, premium_viewer),
            opportunities: gate_findings(opportunities, premium_viewer),
            details: build_details(analysis),
            premium_viewer,
        }
    }

    pub fn findings(&self, kind: FindingKind) -> &[FindingView] {
        match kind {
            FindingKind::Risk => &self.risks,
            FindingKind::Opportunity => &self.opportunities,
        }
    }
}

fn build_details(analysis: &ContractAnalysis) -> DetailsView {
    let key_clauses = if analysis.key_clauses.is_empty() {
        vec![NO_KEY_CLAUSES.to_string()]
    } else {
        analysis.key_clauses.clone()
    };

    DetailsView {
        key_clauses,
        clause_details: non_empty(analysis.specific_clauses.as_deref())
            .unwrap_or(NO_CLAUSE_DETAILS)
            .to_string(),
        legal_compliance: non_empty(analysis.legal_compliance.as_deref())
            .unwrap_or(NO_LEGAL_COMPLIANCE)
            .to_string(),
        recommendations: or_placeholder(&analysis.recommendations, NO_RECOMMENDATIONS),
        negotiation_points: or_placeholder(&analysis.negotiation_points, NO_NEGOTIATION_POINTS),
    }
}

fn or_placeholder(items: &[String], placeholder: &str) -> Vec<String> {
    if items.is_empty() {
        vec![placeholder.to_string()]
    } else {
        items.to_vec()
    }
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn risks(count: usize) -> Value {
        Value::Array(
            (1..=count)
                .map(|n| json!({ "risk": format!("r{}", n), "explanation": "x", "severity": "high" }))
                .collect(),
        )
    }

    fn analysis(value: Value) -> ContractAnalysis {
        serde_json::from_value(value).unwrap()
    }

    fn titles(views: &[FindingView]) -> Vec<String> {
        views
            .iter()
            .map(|view| match view {
                FindingView::Visible(entry) => entry.title.clone(),
                FindingView::Locked { preview, .. } => format!("locked:{}", preview.title),
            })
            .collect()
    }

    #[test]
    fn free_tier_shows_three_and_locks_the_fourth() {
        let analysis = analysis(json!({ "_id": "a", "risks": risks(5) }));
        let view = ResultsView::build(&analysis, false);

        assert_eq!(view.risks.len(), 4);
        assert_eq!(titles(&view.risks), vec!["r1", "r2", "r3", "locked:r4"]);
        match &view.risks[3] {
            FindingView::Locked { hidden_count, .. } => assert_eq!(*hidden_count, 2),
            other => panic!("expected locked preview, got {:?}", other),
        }
    }

    #[test]
    fn hidden_count_covers_everything_past_the_visible_items() {
        let analysis = analysis(json!({ "_id": "a", "risks": risks(12) }));
        let view = ResultsView::build(&analysis, false);

        assert_eq!(view.risks.len(), 4);
        assert!(matches!(
            view.risks[3],
            FindingView::Locked { hidden_count: 9, .. }
        ));
    }

    #[test]
    fn three_items_have_no_locked_preview() {
        let analysis = analysis(json!({ "_id": "a", "risks": risks(3) }));
        let view = ResultsView::build(&analysis, false);
        assert_eq!(titles(&view.risks), vec!["r1", "r2", "r3"]);
    }

    #[test]
    fn premium_viewers_see_everything_in_order() {
        let analysis = analysis(json!({ "_id": "a", "risks": risks(6) }));
        let view = ResultsView::build(&analysis, true);
        assert_eq!(titles(&view.risks), vec!["r1", "r2", "r3", "r4", "r5", "r6"]);
    }

    #[test]
    fn levels_bucket_case_insensitively() {
        assert_eq!(Bucket::classify(Some("HIGH")), Bucket::High);
        assert_eq!(Bucket::classify(Some("Medium")), Bucket::Medium);
        assert_eq!(Bucket::classify(Some("low")), Bucket::Low);
        assert_eq!(Bucket::classify(Some("critical")), Bucket::Unknown);
        assert_eq!(Bucket::classify(Some("")), Bucket::Unknown);
        assert_eq!(Bucket::classify(None), Bucket::Unknown);
    }

    #[test]
    fn score_falls_back_to_placeholder() {
        let record = analysis(json!({ "_id": "a", "overallScore": "72.5" }));
        let view = ResultsView::build(&record, false);
        assert_eq!(view.score, 72.5);
        assert_eq!(view.trend, ScoreTrend::Good);

        let view = ResultsView::build(&analysis(json!({ "_id": "a" })), false);
        assert_eq!(view.score, FALLBACK_SCORE);
        assert_eq!(view.trend, ScoreTrend::Bad);
        assert_eq!(view.risk_percent, 55.0);

        let view = ResultsView::build(&analysis(json!({ "_id": "a", "overallScore": "n/a" })), false);
        assert_eq!(view.score, FALLBACK_SCORE);
    }

    #[test]
    fn opportunities_use_impact_levels() {
        let analysis = analysis(json!({
            "_id": "a",
            "opportunities": [
                { "opportunity": "Renewal discount", "impact": "Low" },
                { "opportunity": "Exclusivity" }
            ]
        }));
        let view = ResultsView::build(&analysis, false);

        match view.findings(FindingKind::Opportunity) {
            [FindingView::Visible(first), FindingView::Visible(second)] => {
                assert_eq!(first.bucket, Bucket::Low);
                assert_eq!(second.bucket, Bucket::Unknown);
                assert_eq!(second.level, "");
            }
            other => panic!("unexpected opportunities: {:?}", other),
        }
    }

    #[test]
    fn missing_details_use_placeholders() {
        let view = ResultsView::build(&analysis(json!({ "_id": "a", "summary": " " })), true);

        assert_eq!(view.summary, NO_SUMMARY);
        assert_eq!(view.details.key_clauses, vec![NO_KEY_CLAUSES]);
        assert_eq!(view.details.legal_compliance, NO_LEGAL_COMPLIANCE);
        assert_eq!(view.details.recommendations, vec![NO_RECOMMENDATIONS]);
        assert_eq!(view.contract_type, "Unknown");
    }

    #[test]
    fn tabs_cycle_both_ways() {
        assert_eq!(ResultsTab::Summary.next(), ResultsTab::Risks);
        assert_eq!(ResultsTab::Details.next(), ResultsTab::Summary);
        assert_eq!(ResultsTab::Summary.previous(), ResultsTab::Details);
    }
}
