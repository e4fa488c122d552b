use crate::error::ContextError;

/// The base URL of the Microsoft identity platform, to which the tenant path is appended.
pub const DEFAULT_LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com";
/// The base URL of the Microsoft Graph API.
pub const DEFAULT_GRAPH_ENDPOINT: &str = "https://graph.microsoft.com/v1.0";

/// The folder of the drive the uploaded files end up in when no other one is configured.
pub const DEFAULT_FOLDER_PATH: &str = "Extra Seguro";
/// The port the server listens on when no other one is configured.
pub const DEFAULT_PORT: u16 = 3000;

/// The whole configuration of the backend, sourced from the process environment once at startup.
///
/// The two endpoint fields always default to the public Microsoft endpoints; they are plain
/// fields instead of constants so that the tests can point the pipeline at a local mock server.
#[derive(Debug, Clone)]
pub struct BackendConfiguration {
    /// The tenant the client credentials belong to.
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    /// The drive the files are uploaded into.
    pub drive_id: String,
    /// The SharePoint site the drive belongs to. Kept for operators that address
    /// the drive through its site, the upload path itself only needs the drive ID.
    pub site_id: Option<String>,
    /// The folder inside the drive the files are uploaded into.
    pub folder_path: String,
    /// The origins allowed by CORS; an empty list allows every origin.
    pub allowed_origins: Vec<String>,
    pub port: u16,
    /// The base URL of the identity provider.
    pub login_endpoint: String,
    /// The base URL of the Graph API.
    pub graph_endpoint: String,
}

impl BackendConfiguration {
    /// Read the configuration from the process environment. The four credential-related
    /// variables are required and their absence fails the startup; everything else defaults.
    pub fn from_environment() -> Result<Self, ContextError> {
        let configuration = BackendConfiguration {
            tenant_id: required_variable("TENANT_ID")?,
            client_id: required_variable("CLIENT_ID")?,
            client_secret: required_variable("CLIENT_SECRET")?,
            drive_id: required_variable("DRIVE_ID")?,
            site_id: std::env::var("SITE_ID").ok(),
            folder_path: std::env::var("FOLDER_PATH")
                .unwrap_or_else(|_| DEFAULT_FOLDER_PATH.into()),
            allowed_origins: std::env::var("ALLOWED_ORIGIN")
                .unwrap_or_default()
                .split(',')
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect(),
            port: match std::env::var("PORT") {
                Ok(port) => port.parse().map_err(|error| {
                    ContextError::with_error(
                        format!("Unable to parse the PORT variable {:?}", port),
                        &error,
                    )
                })?,
                Err(_) => DEFAULT_PORT,
            },
            login_endpoint: DEFAULT_LOGIN_ENDPOINT.into(),
            graph_endpoint: DEFAULT_GRAPH_ENDPOINT.into(),
        };

        Ok(configuration)
    }
}

/// Read a single environment variable which the backend cannot run without.
fn required_variable(name: &str) -> Result<String, ContextError> {
    std::env::var(name).map_err(|_| {
        ContextError::with_context(format!(
            "The required environment variable {} is not set",
            name
        ))
    })
}
