//! HTTP client for the MLIL platform REST API.
//!
//! Every call authenticates with HTTP basic auth, checks the response status
//! and turns a non-success answer into [`ClientError::Api`] carrying the
//! server's JSON body.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use base64::prelude::*;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::endpoints::{
    DATA_DOWNLOAD, DATA_UPLOAD, DELETE_VARIABLE, GET_PREDICTIONS, GET_VARIABLE, LIST_DATA,
    LIST_PREDICTIONS_MODELS, LIST_VARIABLES, SET_VARIABLE,
};
use crate::error::{ClientError, ClientResult};
use crate::value::VariableValue;

/// Default request timeout
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Platform credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    /// API key or password
    pub key: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            key: key.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Platform base URL (e.g., "https://mlil.example.com")
    pub url: String,
    pub credentials: Credentials,
    /// Request timeout
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            url: url.into(),
            credentials,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Client for the MLIL REST API.
#[derive(Debug, Clone)]
pub struct MlilClient {
    base_url: Url,
    credentials: Credentials,
    http: Client,
}

impl MlilClient {
    /// Create a client with the default configuration.
    pub fn new(url: impl Into<String>, credentials: Credentials) -> ClientResult<Self> {
        Self::with_config(ClientConfig::new(url, credentials))
    }

    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        let trimmed = config.url.trim();
        if trimmed.is_empty() {
            return Err(ClientError::InvalidUrl("platform URL is empty".to_string()));
        }

        let base_url = Url::parse(trimmed.trim_end_matches('/'))
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", trimmed, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(trimmed.to_string()));
        }

        let http = Client::builder().timeout(config.request_timeout).build()?;

        info!(url = %base_url, username = %config.credentials.username, "MLIL client created");

        Ok(Self {
            base_url,
            credentials: config.credentials,
            http,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // =========================================================================
    // Data store
    // =========================================================================

    /// List the files in a data store directory.
    pub async fn list_data(&self, directory: &str) -> ClientResult<Value> {
        let url = self.endpoint(LIST_DATA, &[])?;
        let body = json!({ "directory": directory });
        self.send_json(self.http.post(url).json(&body)).await
    }

    /// Upload a local file to the data store under `file_name`.
    ///
    /// # Arguments
    /// * `file_path` - Local file to upload
    /// * `file_name` - Name to give the file in the data store
    /// * `overwrite` - Replace an existing file of the same name
    pub async fn upload_data(
        &self,
        file_path: &Path,
        file_name: &str,
        overwrite: bool,
    ) -> ClientResult<Value> {
        let bytes = tokio::fs::read(file_path).await?;
        debug!(
            file_path = %file_path.display(),
            file_name = %file_name,
            size = bytes.len(),
            "Uploading data"
        );

        let url = self.endpoint(DATA_UPLOAD, &[])?;
        let body = upload_body(file_name, &bytes, overwrite);
        self.send_json(self.http.post(url).json(&body)).await
    }

    /// Download a file from the data store and write it to `output_path`.
    ///
    /// # Returns
    /// Number of bytes written
    pub async fn download_data(&self, file_name: &str, output_path: &Path) -> ClientResult<usize> {
        let url = self.endpoint(DATA_DOWNLOAD, &[])?;
        let body = json!({ "filename": file_name });
        let response = self.send(self.http.post(url).json(&body)).await?;

        let encoded = response.text().await?;
        let decoded = decode_download(&encoded)?;
        tokio::fs::write(output_path, &decoded).await?;

        debug!(
            file_name = %file_name,
            output = %output_path.display(),
            size = decoded.len(),
            "Downloaded data"
        );

        Ok(decoded.len())
    }

    // =========================================================================
    // Variable store
    // =========================================================================

    pub async fn get_variable(&self, variable_name: &str) -> ClientResult<Value> {
        let url = self.endpoint(GET_VARIABLE, &[variable_name])?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn list_variables(&self) -> ClientResult<Value> {
        let url = self.endpoint(LIST_VARIABLES, &[])?;
        self.send_json(self.http.get(url)).await
    }

    /// Create or update a variable.
    ///
    /// Fails if the variable exists and `overwrite` is false.
    pub async fn set_variable(
        &self,
        variable_name: &str,
        value: &VariableValue,
        overwrite: bool,
    ) -> ClientResult<Value> {
        let url = self.endpoint(SET_VARIABLE, &[])?;
        let body = json!({
            "variable_name": variable_name,
            "value": value,
            "overwrite": overwrite,
        });
        self.send_json(self.http.post(url).json(&body)).await
    }

    pub async fn delete_variable(&self, variable_name: &str) -> ClientResult<Value> {
        let url = self.endpoint(DELETE_VARIABLE, &[variable_name])?;
        self.send_json(self.http.delete(url)).await
    }

    // =========================================================================
    // Predictions
    // =========================================================================

    /// Predictions stored for one model version or alias.
    pub async fn get_predictions(
        &self,
        model_name: &str,
        model_flavor: &str,
        model_version_or_alias: &str,
    ) -> ClientResult<Value> {
        let url = self.endpoint(
            GET_PREDICTIONS,
            &[model_name, model_flavor, model_version_or_alias],
        )?;
        self.send_json(self.http.get(url)).await
    }

    /// Models that have stored predictions.
    pub async fn list_prediction_models(&self) -> ClientResult<Value> {
        let url = self.endpoint(LIST_PREDICTIONS_MODELS, &[])?;
        self.send_json(self.http.get(url)).await
    }

    fn endpoint(&self, path: &str, params: &[&str]) -> ClientResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(path.split('/'))
            .extend(params);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> ClientResult<Response> {
        let response = request
            .basic_auth(&self.credentials.username, Some(&self.credentials.key))
            .send()
            .await?;

        let status = response.status();
        debug!(url = %response.url(), status = status.as_u16(), "MLIL response");

        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Err(ClientError::Api {
            status: status.as_u16(),
            body,
        })
    }

    async fn send_json(&self, request: RequestBuilder) -> ClientResult<Value> {
        let response = self.send(request).await?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn upload_body(file_name: &str, bytes: &[u8], overwrite: bool) -> Value {
    json!({
        "filename": file_name,
        "file_bytes": BASE64_STANDARD.encode(bytes),
        "overwrite": overwrite,
    })
}

/// Decode a download body: base64 text, optionally JSON-quoted.
fn decode_download(body: &str) -> ClientResult<Vec<u8>> {
    let trimmed = body.trim();
    let encoded = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    Ok(BASE64_STANDARD.decode(encoded)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> MlilClient {
        MlilClient::new(url, Credentials::new("alice", "secret")).unwrap()
    }

    #[test]
    fn test_endpoint_normalization() {
        let c = client("http://127.0.0.1:4488/");
        assert_eq!(
            c.endpoint(LIST_DATA, &[]).unwrap().as_str(),
            "http://127.0.0.1:4488/data/list"
        );

        let c = client("https://mlil.example.com/api/");
        assert_eq!(
            c.endpoint(GET_VARIABLE, &["threshold"]).unwrap().as_str(),
            "https://mlil.example.com/api/variables/get/threshold"
        );
    }

    #[test]
    fn test_endpoint_escapes_params() {
        let c = client("http://localhost:4488");
        let url = c
            .endpoint(GET_PREDICTIONS, &["my model", "sklearn", "v1/beta"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:4488/predictions/get/my%20model/sklearn/v1%2Fbeta"
        );
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(matches!(
            MlilClient::new("", Credentials::new("a", "b")),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(matches!(
            MlilClient::new("not a url", Credentials::new("a", "b")),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_upload_body() {
        let body = upload_body("iris.csv", b"a,b\n1,2\n", true);
        assert_eq!(body["filename"], "iris.csv");
        assert_eq!(body["file_bytes"], "YSxiCjEsMgo=");
        assert_eq!(body["overwrite"], true);
    }

    #[test]
    fn test_decode_download_accepts_quoted() {
        assert_eq!(decode_download("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(decode_download("\"aGVsbG8=\"\n").unwrap(), b"hello");
        assert!(decode_download("not base64!").is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_key() {
        let rendered = format!("{:?}", Credentials::new("alice", "secret"));
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("secret"));
    }
}
