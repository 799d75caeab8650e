//! Kiln Frontend Client
//!
//! A small, type-safe HTTP client for reporting build results to the Kiln frontend.
//!
//! The backend only ever tells the frontend how a build ended; everything else
//! (job submission, authentication) happens on the frontend side.
//!
//! # Example
//!
//! ```no_run
//! use kiln_client::FrontendClient;
//!
//! #[tokio::main]
//! async fn main() -> kiln_client::Result<()> {
//!     let client = FrontendClient::new("http://frontend.example.org");
//!     client.health().await?;
//!     Ok(())
//! }
//! ```

mod builds;
pub mod error;

pub use error::{ClientError, Result};

use reqwest::Client;

/// HTTP client for the frontend's backend-facing API
#[derive(Debug, Clone)]
pub struct FrontendClient {
    /// Base URL of the frontend (e.g., "http://frontend.example.org")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl FrontendClient {
    /// Create a new frontend client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the frontend
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new frontend client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the frontend
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Handle a response that carries no content we need
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}
