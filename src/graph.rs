use serde::{Deserialize, Serialize};

use crate::configuration::BackendConfiguration;
use crate::error::{ContextError, ServiceError};

/// The scope requested with the client-credentials grant.
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// The client for the two outbound collaborators of the pipeline: the identity provider
/// which exchanges the service credentials for a bearer token, and the Graph drive the
/// files are uploaded into.
///
/// A token is fetched fresh for every request and never cached, so the client carries no
/// mutable state at all and can be shared freely between requests.
pub struct GraphClient {
    http_client: reqwest::Client,
    login_endpoint: String,
    graph_endpoint: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    drive_id: String,
}

/// The part of the token endpoint response the pipeline needs.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// The subset of the uploaded DriveItem relayed back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedItem {
    #[serde(rename = "webUrl", default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl GraphClient {
    pub fn new(configuration: &BackendConfiguration) -> Self {
        GraphClient {
            http_client: reqwest::Client::new(),
            login_endpoint: configuration.login_endpoint.clone(),
            graph_endpoint: configuration.graph_endpoint.clone(),
            tenant_id: configuration.tenant_id.clone(),
            client_id: configuration.client_id.clone(),
            client_secret: configuration.client_secret.clone(),
            drive_id: configuration.drive_id.clone(),
        }
    }

    /// Exchange the service credentials for a bearer token through the client-credentials
    /// grant. A non-success answer surfaces the raw response body of the provider, so the
    /// caller sees exactly what the provider complained about.
    pub async fn fetch_access_token(&self) -> Result<String, ServiceError> {
        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.login_endpoint, self.tenant_id
        );

        let response = self
            .http_client
            .post(&token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", GRAPH_SCOPE),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|error| {
                ServiceError::Auth(ContextError::with_error(
                    "Unable to reach the identity provider",
                    &error,
                ))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            ServiceError::Auth(ContextError::with_error(
                "Unable to read the identity provider response",
                &error,
            ))
        })?;
        if !status.is_success() {
            return Err(ServiceError::Auth(ContextError::with_context(body)));
        }

        let token_response: TokenResponse = serde_json::from_str(&body).map_err(|error| {
            ServiceError::Auth(ContextError::with_error(
                "Unable to parse the identity provider response",
                &error,
            ))
        })?;

        Ok(token_response.access_token)
    }

    /// PUT the file contents into the configured drive under the given folder and filename,
    /// authorized by the given bearer token. One attempt, no chunking: the bodies handled
    /// here are bounded by the request-body limit of the server.
    pub async fn upload(
        &self,
        access_token: &str,
        file_contents: Vec<u8>,
        filename: &str,
        folder: &str,
    ) -> Result<UploadedItem, ServiceError> {
        let upload_url = self.upload_url(filename, folder);

        let response = self
            .http_client
            .put(&upload_url)
            .bearer_auth(access_token)
            .header(reqwest::header::CONTENT_TYPE, "application/pdf")
            .body(file_contents)
            .send()
            .await
            .map_err(|error| {
                ServiceError::Upload(ContextError::with_error("Unable to reach the drive", &error))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            ServiceError::Upload(ContextError::with_error(
                "Unable to read the drive response",
                &error,
            ))
        })?;
        if !status.is_success() {
            return Err(ServiceError::Upload(ContextError::with_context(body)));
        }

        serde_json::from_str(&body).map_err(|error| {
            ServiceError::Upload(ContextError::with_error(
                "Unable to parse the drive response",
                &error,
            ))
        })
    }

    /// Compose the content endpoint of the upload target. The folder segments and the
    /// filename are percent-encoded independently of each other.
    fn upload_url(&self, filename: &str, folder: &str) -> String {
        format!(
            "{}/drives/{}/root:/{}/{}:/content",
            self.graph_endpoint,
            self.drive_id,
            encode_folder_path(folder),
            urlencoding::encode(filename),
        )
    }
}

/// Percent-encode every segment of a folder path while keeping the separators between them.
fn encode_folder_path(folder: &str) -> String {
    folder
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
