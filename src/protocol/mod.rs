use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum RawScore {
    Number(f64),
    Text(String),
}

impl RawScore {
    pub fn as_number(&self) -> Option<f64> {
        let value = match self {
            Self::Number(value) => *value,
            Self::Text(text) => text.trim().parse::<f64>().ok()?,
        };

        value.is_finite().then_some(value)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractAnalysis {
    #[serde(rename = "_id", alias = "id", default)]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_score")]
    pub overall_score: Option<RawScore>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub contract_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub risks: Vec<Risk>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub opportunities: Vec<Opportunity>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub legal_compliance: Option<String>,
    #[serde(default, deserialize_with = "text_items")]
    pub recommendations: Vec<String>,
    #[serde(default, deserialize_with = "text_items")]
    pub negotiation_points: Vec<String>,
    #[serde(default, deserialize_with = "text_items")]
    pub key_clauses: Vec<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub specific_clauses: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ContractAnalysis {
    pub fn score(&self) -> Option<f64> {
        self.overall_score.as_ref().and_then(RawScore::as_number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Risk {
    #[serde(default, deserialize_with = "lenient_text")]
    pub risk: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub explanation: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub severity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Opportunity {
    #[serde(default, deserialize_with = "lenient_text")]
    pub opportunity: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub explanation: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub impact: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectTypeResponse {
    pub detected_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    #[serde(rename = "_id", alias = "id", default)]
    pub id: String,
    #[serde(default)]
    pub google_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub is_premium: bool,
}

impl CurrentUser {
    pub fn label(&self) -> String {
        match (self.display_name.as_deref(), self.email.as_deref()) {
            (Some(name), Some(email)) => format!("{} <{}>", name, email),
            (Some(name), None) => name.to_string(),
            (None, Some(email)) => email.to_string(),
            (None, None) => self.id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MembershipStatus {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorBody {
    pub fn into_message(self) -> Option<String> {
        self.message
            .or(self.error)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
    }
}

fn lenient_score<'de, D>(deserializer: D) -> Result<Option<RawScore>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => number.as_f64().map(RawScore::Number),
        Some(Value::String(text)) => Some(RawScore::Text(text)),
        _ => None,
    })
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(value_to_text))
}

fn text_items<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items.into_iter().filter_map(value_to_text).collect(),
        Some(other) => value_to_text(other).into_iter().collect(),
        None => Vec::new(),
    })
}

fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        // Clause objects vary by backend version; prefer their human-readable part.
        Value::Object(map) => ["title", "clause", "text", "description"]
            .iter()
            .find_map(|key| map.get(*key).and_then(|value| value.as_str()))
            .map(ToOwned::to_owned)
            .or_else(|| Some(Value::Object(map).to_string())),
        other @ Value::Array(_) => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_full_analysis() {
        let raw = r#"
        {
            "_id": "65f1c2e4a1b2c3d4e5f60718",
            "userId": "user-1",
            "overallScore": 82,
            "contractType": "Employment",
            "risks": [
                { "risk": "Broad non-compete", "explanation": "Two years, worldwide", "severity": "high" }
            ],
            "opportunities": [
                { "opportunity": "Equity grant", "explanation": "Four year vest", "impact": "Medium" }
            ],
            "summary": "Standard employment agreement.",
            "legalCompliance": "Compliant with local labor law.",
            "recommendations": ["Narrow the non-compete"],
            "negotiationPoints": ["Vesting cliff"],
            "keyClauses": ["Termination", { "title": "Confidentiality" }],
            "createdAt": "2025-01-02T03:04:05.000Z"
        }
        "#;

        let analysis: ContractAnalysis = serde_json::from_str(raw).expect("should parse");

        assert_eq!(analysis.id, "65f1c2e4a1b2c3d4e5f60718");
        assert_eq!(analysis.score(), Some(82.0));
        assert_eq!(analysis.contract_type.as_deref(), Some("Employment"));
        assert_eq!(analysis.risks.len(), 1);
        assert_eq!(analysis.risks[0].severity.as_deref(), Some("high"));
        assert_eq!(analysis.opportunities[0].impact.as_deref(), Some("Medium"));
        assert_eq!(analysis.key_clauses, vec!["Termination", "Confidentiality"]);
        assert_eq!(analysis.negotiation_points, vec!["Vesting cliff"]);
    }

    #[test]
    fn numeric_string_scores_are_coerced() {
        let analysis: ContractAnalysis =
            serde_json::from_value(json!({ "_id": "a", "overallScore": "72.5" })).unwrap();
        assert_eq!(analysis.score(), Some(72.5));

        let analysis: ContractAnalysis =
            serde_json::from_value(json!({ "_id": "b", "overallScore": "bad" })).unwrap();
        assert_eq!(analysis.score(), None);

        let analysis: ContractAnalysis =
            serde_json::from_value(json!({ "_id": "c", "overallScore": true })).unwrap();
        assert_eq!(analysis.score(), None);

        let analysis: ContractAnalysis = serde_json::from_value(json!({ "_id": "d" })).unwrap();
        assert_eq!(analysis.score(), None);
    }

    #[test]
    fn missing_or_null_lists_become_empty() {
        let analysis: ContractAnalysis = serde_json::from_value(json!({
            "_id": "a",
            "risks": null
        }))
        .unwrap();

        assert!(analysis.risks.is_empty());
        assert!(analysis.opportunities.is_empty());
        assert!(analysis.recommendations.is_empty());
    }

    #[test]
    fn non_string_text_fields_do_not_reject_the_record() {
        let records: Vec<ContractAnalysis> = serde_json::from_value(json!([
            {
                "_id": "a",
                "contractType": 7,
                "summary": ["Part one"],
                "risks": [{ "risk": 42, "explanation": { "text": "Penalty clause" }, "severity": "low" }],
                "opportunities": [{ "opportunity": true, "explanation": null, "impact": "high" }]
            },
            { "_id": "b", "summary": "Plain" }
        ]))
        .unwrap();

        assert_eq!(records.len(), 2);
        let first = &records[0];
        assert_eq!(first.contract_type.as_deref(), Some("7"));
        assert!(first.summary.is_some());
        assert_eq!(first.risks[0].risk.as_deref(), Some("42"));
        assert_eq!(first.risks[0].explanation.as_deref(), Some("Penalty clause"));
        assert_eq!(first.opportunities[0].opportunity.as_deref(), Some("true"));
        assert_eq!(first.opportunities[0].explanation, None);
        assert_eq!(records[1].summary.as_deref(), Some("Plain"));
    }

    #[test]
    fn error_body_prefers_message() {
        let body: ErrorBody =
            serde_json::from_value(json!({ "message": "File too large", "error": "x" })).unwrap();
        assert_eq!(body.into_message().as_deref(), Some("File too large"));

        let body: ErrorBody = serde_json::from_value(json!({ "error": "Unauthorized" })).unwrap();
        assert_eq!(body.into_message().as_deref(), Some("Unauthorized"));

        let body: ErrorBody = serde_json::from_value(json!({ "message": "  " })).unwrap();
        assert_eq!(body.into_message(), None);
    }

    #[test]
    fn user_label_falls_back_to_email() {
        let user: CurrentUser = serde_json::from_value(json!({
            "_id": "u1",
            "email": "ada@example.com",
            "isPremium": true
        }))
        .unwrap();

        assert!(user.is_premium);
        assert_eq!(user.label(), "ada@example.com");
    }
}
