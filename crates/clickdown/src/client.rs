use async_trait::async_trait;
use clickdown_api::{FetchError, Folder, Space, TaskList, TaskPageResponse, Team};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};

use crate::api::{ClickUpApi, FetchResult};

const ERROR_BODY_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
struct TeamsResponse {
    #[serde(default)]
    teams: Vec<Team>,
}

#[derive(Debug, Deserialize)]
struct SpacesResponse {
    #[serde(default)]
    spaces: Vec<Space>,
}

#[derive(Debug, Deserialize)]
struct FoldersResponse {
    #[serde(default)]
    folders: Vec<Folder>,
}

#[derive(Debug, Deserialize)]
struct ListsResponse {
    #[serde(default)]
    lists: Vec<TaskList>,
}

pub struct ClickUpClient {
    base_url: String,
    default_headers: HeaderMap,
    client: reqwest::Client,
}

impl ClickUpClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> FetchResult<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(api_key.trim()).map_err(|e| FetchError::InvalidRequest {
            message: format!("API key is not a valid header value: {}", e),
        })?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::InvalidRequest {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            default_headers: headers,
            client,
        })
    }

    /// Turn a reqwest error into a message that says what to check
    fn format_reqwest_error(e: &reqwest::Error, url: &str) -> String {
        if e.is_timeout() {
            format!("timeout calling {} (check network or raise request_timeout_secs)", url)
        } else if e.is_connect() {
            format!(
                "connection error calling {} - check network connectivity, DNS and proxy settings: {}",
                url, e
            )
        } else if e.is_request() {
            format!("request error calling {}: {}", url, e)
        } else {
            format!("failed calling {}: {}", url, e)
        }
    }

    /// The API reports failures as `{"err": "...", "ECODE": "..."}`
    fn error_message(body: &str) -> String {
        let from_json = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("err").and_then(|e| e.as_str()).map(str::to_string));

        match from_json {
            Some(message) => message,
            None if body.len() > ERROR_BODY_LIMIT => {
                let cut = (0..=ERROR_BODY_LIMIT)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                format!("{}... (truncated)", &body[..cut])
            }
            None => body.to_string(),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> FetchResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("[ClickUpClient] GET {} {:?}", url, query);

        let response = self
            .client
            .get(&url)
            .headers(self.default_headers.clone())
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::Network {
                message: Self::format_reqwest_error(&e, &url),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| FetchError::Network {
            message: format!("Failed to read response body from {}: {}", url, e),
        })?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            debug!("[ClickUpClient] Rate limited on {}", url);
            return Err(FetchError::RateLimited);
        }

        if !status.is_success() {
            let message = Self::error_message(&body);
            error!("[ClickUpClient] HTTP {} from {}: {}", status.as_u16(), url, message);
            return Err(FetchError::Http {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            let message = format!(
                "{} - response (first 200 chars): {}",
                e,
                body.chars().take(200).collect::<String>()
            );
            error!("[ClickUpClient] Failed to decode {}: {}", url, message);
            FetchError::Decode { message }
        })
    }
}

#[async_trait]
impl ClickUpApi for ClickUpClient {
    async fn teams(&self) -> FetchResult<Vec<Team>> {
        let resp: TeamsResponse = self.get_json("/team", &[]).await?;
        Ok(resp.teams)
    }

    async fn spaces(&self, team_id: &str) -> FetchResult<Vec<Space>> {
        let path = format!("/team/{}/space", team_id);
        let resp: SpacesResponse = self
            .get_json(&path, &[("archived", "false".to_string())])
            .await?;
        Ok(resp.spaces)
    }

    async fn folders(&self, space_id: &str) -> FetchResult<Vec<Folder>> {
        let path = format!("/space/{}/folder", space_id);
        let resp: FoldersResponse = self.get_json(&path, &[]).await?;
        Ok(resp.folders)
    }

    async fn folder_lists(&self, folder_id: &str) -> FetchResult<Vec<TaskList>> {
        let path = format!("/folder/{}/list", folder_id);
        let resp: ListsResponse = self.get_json(&path, &[]).await?;
        Ok(resp.lists)
    }

    async fn folderless_lists(&self, space_id: &str) -> FetchResult<Vec<TaskList>> {
        let path = format!("/space/{}/list", space_id);
        let resp: ListsResponse = self.get_json(&path, &[]).await?;
        Ok(resp.lists)
    }

    async fn list(&self, list_id: &str) -> FetchResult<TaskList> {
        self.get_json(&format!("/list/{}", list_id), &[]).await
    }

    async fn task_page(
        &self,
        list_id: &str,
        archived: bool,
        page: u32,
    ) -> FetchResult<TaskPageResponse> {
        if list_id.trim().is_empty() {
            return Err(FetchError::InvalidRequest {
                message: "list id is empty".to_string(),
            });
        }
        let path = format!("/list/{}/task", list_id);
        let query = [
            ("page", page.to_string()),
            ("archived", archived.to_string()),
            ("include_closed", "true".to_string()),
            ("subtasks", "true".to_string()),
            ("include_markdown_description", "true".to_string()),
        ];
        self.get_json(&path, &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client =
            ClickUpClient::new("pk_test_12345", "https://example.test/api/v2/", Duration::from_secs(5))
                .unwrap();
        assert_eq!(
            client.default_headers.get(AUTHORIZATION).unwrap(),
            "pk_test_12345"
        );
        assert_eq!(client.base_url, "https://example.test/api/v2");
    }

    #[test]
    fn test_rejects_unprintable_key() {
        let result = ClickUpClient::new("pk\nbad", "https://example.test", Duration::from_secs(5));
        assert!(matches!(result, Err(FetchError::InvalidRequest { .. })));
    }

    #[test]
    fn test_error_message_prefers_err_field() {
        assert_eq!(
            ClickUpClient::error_message(r#"{"err":"Team not authorized","ECODE":"OAUTH_027"}"#),
            "Team not authorized"
        );
        let long = "x".repeat(600);
        assert!(ClickUpClient::error_message(&long).ends_with("... (truncated)"));
    }
}
