use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{
    Client, RequestBuilder, Response, StatusCode,
    header::{COOKIE, HeaderMap, HeaderValue},
    multipart::{Form, Part},
};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    contracts::ContractStore,
    protocol::{
        CheckoutSession, ContractAnalysis, CurrentUser, DetectTypeResponse, ErrorBody,
        MembershipStatus,
    },
    workflow::{AnalysisBackend, UploadFile},
};

const DETECT_FAILED: &str = "Failed to detect contract type";
const ANALYZE_FAILED: &str = "Failed to analyze contract";
const LIST_FAILED: &str = "Failed to load contracts";
const FETCH_FAILED: &str = "Failed to load contract";
const DELETE_FAILED: &str = "Failed to delete contract";
const MEMBERSHIP_FAILED: &str = "Failed to load membership status";
const CHECKOUT_FAILED: &str = "Failed to process upgrade. Please try again or contact support.";
const LOGOUT_FAILED: &str = "Failed to log out";
const DELETE_ACCOUNT_FAILED: &str = "Failed to delete account";
const INVALID_RESPONSE: &str = "Invalid response from server";

static CONTRACT_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("{0}")]
    Network(String),
    #[error("{message}")]
    Server { status: u16, message: String },
    #[error("The request timed out. Please try again.")]
    Timeout,
    #[error("Invalid contract id: {0:?}")]
    InvalidContractId(String),
    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Server { status, .. } if *status == StatusCode::UNAUTHORIZED.as_u16())
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub session_cookie: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = config.session_cookie.as_deref().map(str::trim) {
            if !cookie.is_empty() {
                let value = HeaderValue::from_str(cookie).map_err(|_| {
                    ApiError::Config("session cookie contains invalid characters".to_string())
                })?;
                headers.insert(COOKIE, value);
            }
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| ApiError::Config(err.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn login_url(&self) -> String {
        self.url("/auth/google")
    }

    pub async fn detect_type(&self, file: &UploadFile) -> Result<String, ApiError> {
        let form = Form::new().part("contract", file_part(file, DETECT_FAILED)?);
        let request = self
            .http
            .post(self.url("/contracts/detect-type"))
            .multipart(form);
        let response: DetectTypeResponse = self.send_json(request, DETECT_FAILED).await?;
        Ok(response.detected_type)
    }

    pub async fn analyze(
        &self,
        file: &UploadFile,
        contract_type: &str,
    ) -> Result<ContractAnalysis, ApiError> {
        let form = Form::new()
            .part("contract", file_part(file, ANALYZE_FAILED)?)
            .text("contractType", contract_type.to_string());
        let request = self.http.post(self.url("/contracts/analyze")).multipart(form);
        self.send_json(request, ANALYZE_FAILED).await
    }

    pub async fn user_contracts(&self) -> Result<Vec<ContractAnalysis>, ApiError> {
        let request = self.http.get(self.url("/contracts/user-contracts"));
        let contracts: Option<Vec<ContractAnalysis>> = self.send_json(request, LIST_FAILED).await?;
        Ok(contracts.unwrap_or_default())
    }

    pub async fn contract(&self, id: &str) -> Result<ContractAnalysis, ApiError> {
        let id = validate_contract_id(id)?;
        let request = self
            .http
            .get(self.url(&format!("/contracts/contract/{}", id)));
        self.send_json(request, FETCH_FAILED).await
    }

    pub async fn delete_contract(&self, id: &str) -> Result<(), ApiError> {
        let id = validate_contract_id(id)?;
        let request = self.http.delete(self.url(&format!("/contracts/{}", id)));
        self.execute(request, DELETE_FAILED).await?;
        Ok(())
    }

    /// Probes the session. Any failure reads as "signed out".
    pub async fn current_user(&self) -> Option<CurrentUser> {
        let request = self.http.get(self.url("/auth/current-user"));
        match self
            .send_json::<Option<CurrentUser>>(request, "Failed to load user")
            .await
        {
            Ok(user) => user.filter(|user| !user.id.is_empty() || user.email.is_some()),
            Err(err) => {
                debug!(%err, "current user probe failed; treating as signed out");
                None
            }
        }
    }

    pub async fn membership_status(&self) -> Result<MembershipStatus, ApiError> {
        let request = self.http.get(self.url("/payments/membership-status"));
        self.send_json(request, MEMBERSHIP_FAILED).await
    }

    pub async fn create_checkout_session(&self) -> Result<String, ApiError> {
        let request = self.http.get(self.url("/payments/create-checkout-session"));
        let session: CheckoutSession = self.send_json(request, CHECKOUT_FAILED).await?;
        session
            .session_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ApiError::Network(INVALID_RESPONSE.to_string()))
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        let request = self.http.get(self.url("/auth/logout"));
        self.execute(request, LOGOUT_FAILED).await?;
        Ok(())
    }

    pub async fn delete_account(&self) -> Result<(), ApiError> {
        let request = self.http.delete(self.url("/api/users/delete-account"));
        self.execute(request, DELETE_ACCOUNT_FAILED).await?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        fallback: &'static str,
    ) -> Result<T, ApiError> {
        let response = self.execute(request, fallback).await?;
        response.json::<T>().await.map_err(|err| {
            warn!(?err, "failed to decode response body");
            ApiError::Network(INVALID_RESPONSE.to_string())
        })
    }

    async fn execute(
        &self,
        request: RequestBuilder,
        fallback: &'static str,
    ) -> Result<Response, ApiError> {
        let request_id = Uuid::new_v4();
        let response = request
            .header("x-request-id", request_id.to_string())
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    warn!(%request_id, "request timed out");
                    ApiError::Timeout
                } else {
                    warn!(%request_id, ?err, "request failed before a response arrived");
                    ApiError::Network(fallback.to_string())
                }
            })?;

        let status = response.status();
        debug!(%request_id, %status, url = %response.url(), "backend responded");

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(ErrorBody::into_message)
            .unwrap_or_else(|| fallback.to_string());

        warn!(%request_id, %status, %message, "backend rejected request");

        Err(ApiError::Server {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl AnalysisBackend for ApiClient {
    async fn detect_type(&self, file: &UploadFile) -> Result<String, ApiError> {
        ApiClient::detect_type(self, file).await
    }

    async fn analyze(
        &self,
        file: &UploadFile,
        contract_type: &str,
    ) -> Result<ContractAnalysis, ApiError> {
        ApiClient::analyze(self, file, contract_type).await
    }
}

#[async_trait]
impl ContractStore for ApiClient {
    async fn list(&self) -> Result<Vec<ContractAnalysis>, ApiError> {
        self.user_contracts().await
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.delete_contract(id).await
    }
}

pub fn validate_contract_id(id: &str) -> Result<&str, ApiError> {
    let trimmed = id.trim();
    if CONTRACT_ID_RE.is_match(trimmed) {
        Ok(trimmed)
    } else {
        Err(ApiError::InvalidContractId(id.to_string()))
    }
}

fn file_part(file: &UploadFile, fallback: &'static str) -> Result<Part, ApiError> {
    Part::bytes(file.bytes().to_vec())
        .file_name(file.name().to_string())
        .mime_str(file.media_type())
        .map_err(|err| {
            warn!(?err, media_type = file.media_type(), "invalid upload media type");
            ApiError::Network(fallback.to_string())
        })
}
