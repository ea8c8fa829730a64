use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::{SheetsError, SheetsResult};
use crate::store::{CellValue, LogColumn, RowStore};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets/";
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Tokens are refreshed this long before they expire
const TOKEN_SLACK_SECS: i64 = 60;

/// The parts of a Google service-account JSON key we need
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> SheetsResult<Self> {
        let mut key: Self = serde_json::from_str(json)?;
        // Keys pasted through env vars or TOML secrets often carry literal "\n"
        key.private_key = key.private_key.replace("\\n", "\n");
        Ok(key)
    }

    pub fn from_file(path: &Path) -> SheetsResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// RowStore backed by one worksheet of a Google spreadsheet
pub struct GoogleSheetsStore {
    client: Client,
    spreadsheet_id: String,
    worksheet: String,
    key: ServiceAccountKey,
    token: Mutex<Option<CachedToken>>,
}

impl fmt::Debug for GoogleSheetsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleSheetsStore")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("worksheet", &self.worksheet)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl GoogleSheetsStore {
    pub fn new(
        spreadsheet_id: impl Into<String>,
        worksheet: impl Into<String>,
        key: ServiceAccountKey,
    ) -> SheetsResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            spreadsheet_id: spreadsheet_id.into(),
            worksheet: worksheet.into(),
            key,
            token: Mutex::new(None),
        })
    }

    /// A1 range with the worksheet name quoted, e.g. `'Simulator'!C:C`
    fn range(&self, cells: &str) -> String {
        format!("'{}'!{}", self.worksheet.replace('\'', "''"), cells)
    }

    /// `values/{range}{suffix}` under this spreadsheet, percent-encoded
    fn values_url(&self, range: &str, suffix: &str) -> SheetsResult<Url> {
        let mut url = Url::parse(SHEETS_API)
            .map_err(|e| SheetsError::Config(format!("Invalid Sheets API URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| SheetsError::Config("Sheets API URL cannot be a base".to_string()))?
            .pop_if_empty()
            .push(&self.spreadsheet_id)
            .push("values")
            .push(&format!("{}{}", range, suffix));
        Ok(url)
    }

    async fn access_token(&self) -> SheetsResult<String> {
        let mut cached = self.token.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref() {
            if token.expires_at.timestamp() - now.timestamp() > TOKEN_SLACK_SECS {
                return Ok(token.value.clone());
            }
        }

        let iat = now.timestamp();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat,
            exp: iat + 3600,
        };
        let signing_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| SheetsError::Auth(format!("Invalid service account key: {}", e)))?;
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &signing_key)?;

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SheetsError::Auth(format!(
                "Token exchange failed ({}): {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = response.json().await?;
        info!(account = %self.key.client_email, "Obtained Sheets access token");
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: now + chrono::Duration::seconds(token.expires_in),
        });
        Ok(token.access_token)
    }

    async fn check(response: reqwest::Response) -> SheetsResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(SheetsError::Http {
            status_code: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl RowStore for GoogleSheetsStore {
    async fn read_column(&self, column: LogColumn) -> SheetsResult<Vec<String>> {
        let letter = column.letter();
        let url = self.values_url(&self.range(&format!("{letter}:{letter}")), "")?;
        let token = self.access_token().await?;

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(&[("majorDimension", "COLUMNS")])
            .send()
            .await?;
        let body: ValueRange = Self::check(response).await?.json().await?;

        let values = body
            .values
            .into_iter()
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect::<Vec<_>>();

        debug!(column = %letter, rows = values.len(), "Read column");
        Ok(values)
    }

    async fn append_row(&self, row: Vec<CellValue>) -> SheetsResult<()> {
        let url = self.values_url(&self.range("A:F"), ":append")?;
        let token = self.access_token().await?;

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({ "values": [row] }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn overwrite_row(&self, row_number: usize, row: Vec<CellValue>) -> SheetsResult<()> {
        if row_number == 0 {
            return Err(SheetsError::Storage("Row numbers start at 1".to_string()));
        }
        let range = self.range(&format!("A{row_number}:F{row_number}"));
        let url = self.values_url(&range, "")?;
        let token = self.access_token().await?;

        let response = self
            .client
            .put(url)
            .bearer_auth(token)
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({ "range": range, "majorDimension": "ROWS", "values": [row] }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
