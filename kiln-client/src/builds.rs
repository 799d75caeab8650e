//! Build status endpoints

use kiln_core::dto::status::BuildStatusEvent;
use tracing::debug;

use crate::FrontendClient;
use crate::error::Result;

impl FrontendClient {
    // =============================================================================
    // Build Reporting
    // =============================================================================

    /// Report the final status of a build
    ///
    /// # Arguments
    /// * `event` - The status event of a completed job
    ///
    /// # Example
    /// ```no_run
    /// # use kiln_client::FrontendClient;
    /// # use kiln_core::dto::status::BuildStatusEvent;
    /// # async fn example(event: BuildStatusEvent) -> kiln_client::Result<()> {
    /// let client = FrontendClient::new("http://frontend.example.org");
    /// client.update_build(&event).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn update_build(&self, event: &BuildStatusEvent) -> Result<()> {
        let url = format!("{}/backend/update/", self.base_url);
        debug!("Reporting build {} as {}", event.build_id, event.status);

        let response = self.client.post(&url).json(event).send().await?;

        self.handle_empty_response(response).await
    }

    /// Check that the frontend is reachable
    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/backend/health", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_empty_response(response).await
    }
}
