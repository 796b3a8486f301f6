use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::error::ApiError;
use super::signature;

pub const DEFAULT_RAM_ENDPOINT: &str = "https://ram.aliyuncs.com";
pub const RAM_API_VERSION: &str = "2015-05-01";

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const SIGNATURE_VERSION: &str = "1.0";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// AliCloud RPC-style API client
///
/// Performs exactly one HTTP attempt per call. Retrying is the caller's
/// business (see [`super::RamGateway`]).
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    endpoint: String,
    access_key: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorResponse {
    code: String,
    #[serde(default)]
    message: String,
    request_id: Option<String>,
}

impl Client {
    pub fn new(endpoint: &str, access_key: &str, secret_key: &str) -> Result<Self, ApiError> {
        Self::with_timeout(endpoint, access_key, secret_key, Duration::from_secs(30))
    }

    pub fn with_timeout(
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let parsed = url::Url::parse(endpoint)
            .map_err(|e| ApiError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::InvalidEndpoint(format!(
                "{}: scheme must be http or https",
                endpoint
            )));
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http_client,
                endpoint: endpoint.trim_end_matches('/').to_string(),
                access_key: access_key.to_string(),
                secret_key: secret_key.to_string(),
            }),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Invoke `action` with the given business parameters
    pub async fn call<T: DeserializeOwned>(
        &self,
        action: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let form = self.signed_params(action, params);
        let url = format!("{}/", self.inner.endpoint);

        tracing::debug!("POST {} to {}", action, url);

        let response = self.inner.http_client.post(&url).form(&form).send().await?;

        if response.status().is_success() {
            self.parse_success_response(action, response).await
        } else {
            self.handle_error_response(response).await
        }
    }

    fn signed_params(&self, action: &str, params: &[(&str, &str)]) -> BTreeMap<String, String> {
        let mut all: BTreeMap<String, String> = params
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        all.insert("Action".to_string(), action.to_string());
        all.insert("Format".to_string(), "JSON".to_string());
        all.insert("Version".to_string(), RAM_API_VERSION.to_string());
        all.insert("AccessKeyId".to_string(), self.inner.access_key.clone());
        all.insert("SignatureMethod".to_string(), SIGNATURE_METHOD.to_string());
        all.insert("SignatureVersion".to_string(), SIGNATURE_VERSION.to_string());
        all.insert(
            "SignatureNonce".to_string(),
            uuid::Uuid::new_v4().to_string(),
        );
        all.insert(
            "Timestamp".to_string(),
            chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string(),
        );

        let signature = signature::sign("POST", &all, &self.inner.secret_key);
        all.insert("Signature".to_string(), signature);
        all
    }

    async fn parse_success_response<T: DeserializeOwned>(
        &self,
        action: &str,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let text = response.text().await?;
        tracing::debug!("{} response body: {}", action, text);

        serde_json::from_str::<T>(&text).map_err(|e| {
            tracing::error!("Failed to deserialize {} response: {}", action, e);
            ApiError::ParseError(format!("{}: {}", action, e))
        })
    }

    async fn handle_error_response<T>(&self, response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        let err = match serde_json::from_str::<ErrorResponse>(&text) {
            Ok(body) => ApiError::Service {
                status,
                code: body.code,
                message: body.message,
                request_id: body.request_id,
            },
            Err(_) => ApiError::service(status, format!("HTTP.{}", status), text),
        };

        tracing::debug!("API error response: {}", err);
        Err(err)
    }
}
