use tracing::{debug, warn};

use crate::{
    api::{ApiClient, ApiError},
    protocol::{CurrentUser, MembershipStatus},
};

#[derive(Debug, Clone, Default)]
pub struct AccountContext {
    pub user: Option<CurrentUser>,
    pub membership: Option<MembershipStatus>,
}

impl AccountContext {
    pub async fn load(api: &ApiClient) -> Self {
        let user = api.current_user().await;
        let membership = if user.is_some() {
            match api.membership_status().await {
                Ok(status) => Some(status),
                Err(err) => {
                    warn!(%err, "membership status unavailable");
                    None
                }
            }
        } else {
            None
        };

        let context = Self { user, membership };
        debug!(
            signed_in = context.user.is_some(),
            premium = context.subscription().is_active,
            "account context loaded"
        );
        context
    }

    pub fn subscription(&self) -> SubscriptionView {
        SubscriptionView::resolve(self.membership.as_ref(), self.user.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionView {
    pub is_active: bool,
    pub membership_active: bool,
    pub user_flag: bool,
}

impl SubscriptionView {
    pub fn resolve(membership: Option<&MembershipStatus>, user: Option<&CurrentUser>) -> Self {
        let membership_active = membership
            .and_then(|membership| membership.status.as_deref())
            .is_some_and(|status| status == "active");
        let user_flag = user.is_some_and(|user| user.is_premium);

        Self {
            is_active: membership_active || user_flag,
            membership_active,
            user_flag,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    AlreadyPremium,
    Checkout { session_id: String },
}

pub async fn start_upgrade(
    api: &ApiClient,
    account: &AccountContext,
) -> Result<UpgradeOutcome, ApiError> {
    if account.subscription().is_active {
        return Ok(UpgradeOutcome::AlreadyPremium);
    }

    let session_id = api.create_checkout_session().await?;
    Ok(UpgradeOutcome::Checkout { session_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(is_premium: bool) -> CurrentUser {
        serde_json::from_value(json!({ "_id": "u1", "isPremium": is_premium })).unwrap()
    }

    fn membership(status: &str) -> MembershipStatus {
        MembershipStatus {
            status: Some(status.to_string()),
        }
    }

    #[test]
    fn either_source_grants_premium() {
        let view = SubscriptionView::resolve(Some(&membership("active")), Some(&user(false)));
        assert!(view.is_active);
        assert!(view.membership_active);
        assert!(!view.user_flag);

        let view = SubscriptionView::resolve(Some(&membership("canceled")), Some(&user(true)));
        assert!(view.is_active);
        assert!(!view.membership_active);

        let view = SubscriptionView::resolve(None, Some(&user(true)));
        assert!(view.is_active);
    }

    #[test]
    fn neither_source_means_free_tier() {
        assert!(!SubscriptionView::resolve(None, None).is_active);
        let view = SubscriptionView::resolve(Some(&membership("Active")), Some(&user(false)));
        assert!(!view.is_active);
        assert!(!SubscriptionView::resolve(Some(&MembershipStatus { status: None }), None).is_active);
    }

    #[tokio::test]
    async fn premium_accounts_skip_checkout() {
        let api = ApiClient::new(crate::api::ApiConfig {
            // Nothing listens here; reaching the network would fail the test.
            base_url: "http://127.0.0.1:9".to_string(),
            session_cookie: None,
            timeout: std::time::Duration::from_millis(200),
        })
        .unwrap();
        let account = AccountContext {
            user: Some(user(true)),
            membership: None,
        };

        let outcome = start_upgrade(&api, &account).await.unwrap();
        assert_eq!(outcome, UpgradeOutcome::AlreadyPremium);
    }
}
