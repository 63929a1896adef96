use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use serde::Deserialize;

use diary_core::models::{AuthSession, Credentials, ProgramState, StoredState, UserProfile};
use diary_core::remote::RemoteStore;

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(format!(
            "fighter-reset-diary/{} (habit diary)",
            env!("CARGO_PKG_VERSION")
        ))
        .timeout(std::time::Duration::from_secs(10))
        .connect_timeout(std::time::Duration::from_secs(5))
        .build()
        .context("Failed to build HTTP client")
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Turn a non-success response into an error carrying the server's message verbatim.
async fn response_error(resp: reqwest::Response) -> anyhow::Error {
    let status = resp.status();
    match resp.json::<ErrorBody>().await {
        Ok(body) => anyhow!(body.error),
        Err(_) => anyhow!("Server responded with {status}"),
    }
}

async fn authenticate(server: &str, path: &str, credentials: &Credentials) -> Result<AuthSession> {
    let client = http_client()?;
    let url = format!("{}{path}", server.trim_end_matches('/'));
    let resp = client
        .post(&url)
        .json(credentials)
        .send()
        .await
        .with_context(|| format!("Failed to reach server at {server}"))?;
    if !resp.status().is_success() {
        return Err(response_error(resp).await);
    }
    resp.json()
        .await
        .context("Failed to parse authentication response")
}

pub async fn signup(server: &str, credentials: &Credentials) -> Result<AuthSession> {
    authenticate(server, "/auth/signup", credentials).await
}

pub async fn login(server: &str, credentials: &Credentials) -> Result<AuthSession> {
    authenticate(server, "/auth/login", credentials).await
}

/// Client for the diary backend, acting with one bearer token.
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpRemote {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("Failed to reach server at {}", self.base_url))
    }

    /// Revoke this client's token on the server.
    pub async fn logout(&self) -> Result<()> {
        let resp = self.send(self.client.post(self.url("/auth/logout"))).await?;
        if !resp.status().is_success() {
            return Err(response_error(resp).await);
        }
        Ok(())
    }
}

impl RemoteStore for HttpRemote {
    async fn load_user_state(&self, user_id: &str) -> Result<Option<StoredState>> {
        let resp = self
            .send(self.client.get(self.url(&format!("/api/state/{user_id}"))))
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(response_error(resp).await);
        }
        let stored = resp.json().await.context("Failed to parse saved state")?;
        Ok(Some(stored))
    }

    async fn save_user_state(&self, user_id: &str, state: &ProgramState) -> Result<StoredState> {
        let resp = self
            .send(
                self.client
                    .put(self.url(&format!("/api/state/{user_id}")))
                    .json(state),
            )
            .await?;
        if !resp.status().is_success() {
            return Err(response_error(resp).await);
        }
        resp.json().await.context("Failed to parse save response")
    }

    async fn list_clients(&self) -> Result<Vec<UserProfile>> {
        let resp = self.send(self.client.get(self.url("/api/clients"))).await?;
        if !resp.status().is_success() {
            return Err(response_error(resp).await);
        }
        resp.json().await.context("Failed to parse client list")
    }

    async fn fetch_profile(&self) -> Result<UserProfile> {
        let resp = self.send(self.client.get(self.url("/api/profile"))).await?;
        if !resp.status().is_success() {
            return Err(response_error(resp).await);
        }
        resp.json().await.context("Failed to parse profile")
    }
}
