pub mod envelope;
pub mod fetch;
pub mod links;
pub mod query;
pub mod rally;
pub mod resolve;
pub mod schema;
pub mod transport;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::iteration::IterationStatus;
use crate::model::story::{StoryList, TaskList};

pub type Result<T, E = ConnectorError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("failed to encode query {query:?}: {reason}")]
    QueryEncoding { query: String, reason: String },

    #[error("request for '{url}' failed: {status} {reason}")]
    Protocol {
        url: String,
        status: u16,
        reason: String,
    },

    #[error("unexpected response type: expected {expected}, got {actual}")]
    UnexpectedResponseType { expected: String, actual: String },

    #[error("failed to decode response from '{url}'")]
    Decoding {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to transform {artifact}: {reason}")]
    Transform { artifact: String, reason: String },

    #[error("transport failure for '{url}'")]
    Transport {
        url: String,
        #[source]
        source: transport::TransportError,
    },

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// A connection to an Agile project-management backend.
///
/// Defects and requirements are both returned as stories, so story lists are
/// heterogeneous. Order across backend result pages carries no meaning.
#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &str;

    async fn list_iterations_for_project(&self, project: &str) -> Result<Vec<IterationStatus>>;

    async fn list_iterations_involving_user(&self, user: &str) -> Result<Vec<IterationStatus>>;

    async fn retrieve_stories_for_iteration(&self, iteration: &str) -> Result<StoryList>;

    async fn retrieve_stories_for_project_iteration(
        &self,
        project: &str,
        iteration: &str,
    ) -> Result<StoryList>;

    /// Fetch stories by their backend identifiers (e.g. `US123`, `DE42`).
    async fn retrieve_stories(&self, ids: &[String]) -> Result<StoryList>;

    /// Fetch the tasks of every story, one story at a time.
    async fn retrieve_tasks(&self, stories: &StoryList) -> Result<TaskList>;
}

#[cfg(test)]
pub mod testing;
