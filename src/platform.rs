// PokitDok platform endpoints
// One method per remote operation, layered over the authenticated client

use reqwest::Method;
use serde_json::{Map, Value};
use std::path::Path;
use tokio::sync::RwLock;

use crate::auth::Credentials;
use crate::config::{ClientConfig, DEFAULT_API_SITE, DEFAULT_VERSION_PATH, TOKEN_PATH};
use crate::error::{ClientError, Result};
use crate::http_client::ApiClient;
use crate::request::{Attachment, Multipart, Params, RequestSpec};
use crate::response::{Body, HttpResponse};

pub const ENDPOINT_ACTIVITIES: &str = "/activities/";
pub const ENDPOINT_AUTHORIZATIONS: &str = "/authorizations/";
pub const ENDPOINT_CASH_PRICES: &str = "/prices/cash";
pub const ENDPOINT_CLAIMS: &str = "/claims/";
pub const ENDPOINT_CLAIMS_CONVERT: &str = "/claims/convert";
pub const ENDPOINT_CLAIMS_STATUS: &str = "/claims/status";
pub const ENDPOINT_DEDUCTIBLE: &str = "/deductible/";
pub const ENDPOINT_ELIGIBILITY: &str = "/eligibility/";
pub const ENDPOINT_ENROLLMENT: &str = "/enrollment/";
pub const ENDPOINT_FILES: &str = "/files/";
pub const ENDPOINT_ICD_CONVERT: &str = "/icd/convert/";
pub const ENDPOINT_INSURANCE_PRICES: &str = "/prices/insurance";
pub const ENDPOINT_MPC: &str = "/mpc/";
pub const ENDPOINT_PAYERS: &str = "/payers/";
pub const ENDPOINT_PHARMACY_FORMULARY: &str = "/pharmacy/formulary";
pub const ENDPOINT_PHARMACY_PLANS: &str = "/pharmacy/plans";
pub const ENDPOINT_PLANS: &str = "/plans/";
pub const ENDPOINT_PROVIDERS: &str = "/providers/";
pub const ENDPOINT_REFERRALS: &str = "/referrals/";
pub const ENDPOINT_TRADING_PARTNERS: &str = "/tradingpartners/";
pub const ENDPOINT_SCHEDULERS: &str = "/schedule/schedulers/";
pub const ENDPOINT_APPOINTMENT_TYPES: &str = "/schedule/appointmenttypes/";
pub const ENDPOINT_SLOTS: &str = "/schedule/slots/";
pub const ENDPOINT_APPOINTMENTS: &str = "/schedule/appointments/";

/// Client for the PokitDok platform API
///
/// Wraps an [`ApiClient`] and keeps the `meta` block of the last successful
/// response as usage information.
pub struct PlatformClient {
    api: ApiClient,
    site: String,
    version_path: String,
    usage: RwLock<Option<Value>>,
}

impl PlatformClient {
    /// Create a client against the production site
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Result<Self> {
        Self::with_config(
            Credentials::new(client_id, client_secret),
            ClientConfig::default(),
            None,
        )
    }

    /// Create a client with explicit settings and an optional saved token
    pub fn with_config(
        credentials: Credentials,
        config: ClientConfig,
        token_json: Option<&str>,
    ) -> Result<Self> {
        Ok(Self::from_api(ApiClient::new(credentials, config, token_json)?))
    }

    /// Wrap an existing authenticated client
    pub fn from_api(api: ApiClient) -> Self {
        let (site, version_path) = split_base_url(api.api_base_url());
        Self {
            api,
            site,
            version_path,
            usage: RwLock::new(None),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn api_mut(&mut self) -> &mut ApiClient {
        &mut self.api
    }

    /// Acquire a token up front
    pub async fn init(&self) -> Result<()> {
        self.api.init().await
    }

    pub fn version_path(&self) -> &str {
        &self.version_path
    }

    /// Switch API version, e.g. `/api/v5`
    pub fn set_version_path(&mut self, version_path: impl Into<String>) {
        self.version_path = version_path.into();
        let base = format!("{}{}", self.site, self.version_path);
        self.api.set_api_base_url(base);
    }

    /// Point the client at another site, keeping the version path
    pub fn set_site(&mut self, site: impl Into<String>) {
        let site: String = site.into();
        self.site = site.trim_end_matches('/').to_string();
        let base = format!("{}{}", self.site, self.version_path);
        self.api.set_api_base_url(base);
        self.api.set_api_token_url(format!("{}{}", self.site, TOKEN_PATH));
    }

    /// Check a response body and record its usage block
    ///
    /// The body must be a JSON object; a top-level `errors` field is fatal
    /// even on a success status.
    pub async fn apply_response(&self, response: HttpResponse) -> Result<HttpResponse> {
        let status = response.status();
        let body = match response.body() {
            Body::Json(Value::Object(map)) => map,
            other => {
                return Err(ClientError::Api {
                    status,
                    body: Value::String(match other {
                        Body::Json(value) => value.to_string(),
                        Body::Raw(_) => response.text(),
                    }),
                })
            }
        };

        if let Some(errors) = body.get("errors") {
            tracing::warn!(status = status, errors = %errors, "Platform reported errors");
            return Err(ClientError::Api {
                status,
                body: errors.clone(),
            });
        }

        *self.usage.write().await = body.get("meta").cloned();
        Ok(response)
    }

    /// Usage metadata from the last response
    ///
    /// When nothing is cached yet, issues an empty eligibility request to fetch it.
    pub async fn usage(&self) -> Result<Option<Value>> {
        if let Some(usage) = self.usage.read().await.clone() {
            return Ok(Some(usage));
        }

        let response = self
            .api
            .execute(
                RequestSpec::new(Method::POST, ENDPOINT_ELIGIBILITY)
                    .params(Map::new())
                    .json(),
            )
            .await?;

        let meta = match response.body() {
            Body::Json(Value::Object(map)) => map.get("meta").cloned(),
            other => {
                return Err(ClientError::Api {
                    status: response.status(),
                    body: other.into_value(),
                })
            }
        };

        *self.usage.write().await = meta.clone();
        Ok(meta)
    }

    /// Cached usage metadata without any request
    pub async fn cached_usage(&self) -> Option<Value> {
        self.usage.read().await.clone()
    }

    /// Generic call through `apply_response`
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: impl Into<Params>,
        content_type: &str,
    ) -> Result<HttpResponse> {
        let response = self.api.request(method, path, params, content_type).await?;
        self.apply_response(response).await
    }

    async fn get(&self, path: &str, params: impl Into<Params>) -> Result<HttpResponse> {
        self.call(RequestSpec::new(Method::GET, path).params(params).json())
            .await
    }

    async fn send_json(&self, method: Method, path: &str, body: Value) -> Result<HttpResponse> {
        self.call(RequestSpec::new(method, path).params(body).json())
            .await
    }

    async fn call(&self, spec: RequestSpec) -> Result<HttpResponse> {
        let response = self.api.execute(spec).await?;
        self.apply_response(response).await
    }

    /// Activities by ID (string) or query parameters
    pub async fn activities(&self, request: impl Into<Params>) -> Result<HttpResponse> {
        self.get(ENDPOINT_ACTIVITIES, request).await
    }

    pub async fn authorizations(&self, request: Value) -> Result<HttpResponse> {
        self.send_json(Method::POST, ENDPOINT_AUTHORIZATIONS, request)
            .await
    }

    pub async fn cash_prices(&self, query: Value) -> Result<HttpResponse> {
        self.get(ENDPOINT_CASH_PRICES, query).await
    }

    pub async fn claims(&self, request: Value) -> Result<HttpResponse> {
        self.send_json(Method::POST, ENDPOINT_CLAIMS, request).await
    }

    /// Convert an X12 837 claim file to JSON
    pub async fn claims_convert(&self, file: impl AsRef<Path>) -> Result<HttpResponse> {
        let body = Multipart::new().attachment(Attachment::new(
            "file",
            file.as_ref(),
            "application/EDI-X12",
        ));
        self.call(RequestSpec::new(Method::POST, ENDPOINT_CLAIMS_CONVERT).params(body))
            .await
    }

    pub async fn claims_status(&self, request: Value) -> Result<HttpResponse> {
        self.send_json(Method::POST, ENDPOINT_CLAIMS_STATUS, request)
            .await
    }

    /// Deductible lookup from an EDI 270 file
    pub async fn deductible(&self, file: impl AsRef<Path>) -> Result<HttpResponse> {
        let body = Multipart::new().attachment(Attachment::text("enrollment", file.as_ref()));
        self.call(RequestSpec::new(Method::POST, ENDPOINT_DEDUCTIBLE).params(body))
            .await
    }

    pub async fn eligibility(&self, request: Value) -> Result<HttpResponse> {
        self.send_json(Method::POST, ENDPOINT_ELIGIBILITY, request)
            .await
    }

    pub async fn enrollment(&self, request: Value) -> Result<HttpResponse> {
        self.send_json(Method::POST, ENDPOINT_ENROLLMENT, request)
            .await
    }

    /// Submit an X12 file for a trading partner
    pub async fn files(
        &self,
        file: impl AsRef<Path>,
        trading_partner_id: &str,
    ) -> Result<HttpResponse> {
        let body = Multipart::new()
            .field("trading_partner_id", trading_partner_id)
            .attachment(Attachment::new(
                "file",
                file.as_ref(),
                "application/octet-stream",
            ));
        self.call(RequestSpec::new(Method::POST, ENDPOINT_FILES).params(body))
            .await
    }

    pub async fn icd_convert(&self, code: &str) -> Result<HttpResponse> {
        self.get(&format!("{}{}", ENDPOINT_ICD_CONVERT, code), Params::None)
            .await
    }

    pub async fn insurance_prices(&self, query: Value) -> Result<HttpResponse> {
        self.get(ENDPOINT_INSURANCE_PRICES, query).await
    }

    /// Medical procedure codes, optionally a single code
    pub async fn medical_procedure_code(
        &self,
        code: Option<&str>,
        query: Value,
    ) -> Result<HttpResponse> {
        self.get(&with_id(ENDPOINT_MPC, code), query).await
    }

    pub async fn payers(&self, query: Value) -> Result<HttpResponse> {
        self.get(ENDPOINT_PAYERS, query).await
    }

    pub async fn pharmacy_formulary(&self, query: Value) -> Result<HttpResponse> {
        self.get(ENDPOINT_PHARMACY_FORMULARY, query).await
    }

    pub async fn pharmacy_plans(&self, query: Value) -> Result<HttpResponse> {
        self.get(ENDPOINT_PHARMACY_PLANS, query).await
    }

    pub async fn plans(&self, query: Value) -> Result<HttpResponse> {
        self.get(ENDPOINT_PLANS, query).await
    }

    /// Providers by NPI/UUID (string) or search parameters
    pub async fn providers(&self, request: impl Into<Params>) -> Result<HttpResponse> {
        self.get(ENDPOINT_PROVIDERS, request).await
    }

    pub async fn referrals(&self, request: Value) -> Result<HttpResponse> {
        self.send_json(Method::POST, ENDPOINT_REFERRALS, request)
            .await
    }

    pub async fn trading_partners(&self, id: Option<&str>) -> Result<HttpResponse> {
        self.get(&with_id(ENDPOINT_TRADING_PARTNERS, id), Params::None)
            .await
    }

    pub async fn schedulers(&self, id: Option<&str>) -> Result<HttpResponse> {
        self.get(&with_id(ENDPOINT_SCHEDULERS, id), Params::None)
            .await
    }

    pub async fn appointment_types(&self, id: Option<&str>) -> Result<HttpResponse> {
        self.get(&with_id(ENDPOINT_APPOINTMENT_TYPES, id), Params::None)
            .await
    }

    /// Create an open appointment slot
    pub async fn schedule_slots(&self, request: Value) -> Result<HttpResponse> {
        self.send_json(Method::POST, ENDPOINT_SLOTS, request).await
    }

    /// Appointments by ID (string) or query parameters
    pub async fn get_appointments(&self, request: impl Into<Params>) -> Result<HttpResponse> {
        self.get(ENDPOINT_APPOINTMENTS, request).await
    }

    pub async fn book_appointment(&self, id: &str, request: Value) -> Result<HttpResponse> {
        self.send_json(Method::PUT, &with_id(ENDPOINT_APPOINTMENTS, Some(id)), request)
            .await
    }

    pub async fn update_appointment(&self, id: &str, request: Value) -> Result<HttpResponse> {
        self.send_json(Method::PUT, &with_id(ENDPOINT_APPOINTMENTS, Some(id)), request)
            .await
    }

    pub async fn cancel_appointment(&self, id: &str) -> Result<HttpResponse> {
        self.call(
            RequestSpec::new(Method::DELETE, with_id(ENDPOINT_APPOINTMENTS, Some(id))).json(),
        )
        .await
    }
}

fn with_id(path: &str, id: Option<&str>) -> String {
    match id {
        Some(id) if !id.is_empty() => format!("{}{}", path, id),
        _ => path.to_string(),
    }
}

/// Split a base URL into site and version path (`/api/...`)
fn split_base_url(base: &str) -> (String, String) {
    match base.find("/api/") {
        Some(idx) => (base[..idx].to_string(), base[idx..].to_string()),
        None if base.is_empty() => (
            DEFAULT_API_SITE.to_string(),
            DEFAULT_VERSION_PATH.to_string(),
        ),
        None => (base.to_string(), String::new()),
    }
}
