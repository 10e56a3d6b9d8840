use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use tracing::Instrument;

use super::envelope::{ArtifactKind, RallyObject};
use super::fetch::Fetcher;
use super::resolve::{classify, resolve_page, ResultItem, Source};
use super::schema::{self, STORY_MAPPING, TASK_MAPPING};
use super::transport::{Credentials, ReqwestTransportFactory, Session, TransportFactory};
use super::{links, query, Connector, ConnectorError, Result};
use crate::config::RallyConfig;
use crate::model::iteration::IterationStatus;
use crate::model::story::{StoryList, TaskList};

pub const RALLY_BASE_RESOURCE: &str = "slm/webservice";

const STORY_KINDS: [ArtifactKind; 2] = [ArtifactKind::HierarchicalRequirement, ArtifactKind::Defect];

/// Connector for the Rally web services API.
///
/// Every operation opens its own session, issues its requests one after the
/// other and closes the session before returning, on success or failure.
pub struct RallyConnector {
    settings: RallyConfig,
    credentials: Credentials,
    transport: Arc<dyn TransportFactory>,
}

impl RallyConnector {
    pub fn new(
        settings: RallyConfig,
        credentials: Credentials,
        transport: Arc<dyn TransportFactory>,
    ) -> Result<Self> {
        schema::validate_mappings()?;
        Url::parse(&settings.server).map_err(|e| ConnectorError::InvalidUrl {
            url: settings.server.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            settings,
            credentials,
            transport,
        })
    }

    pub fn with_reqwest(settings: RallyConfig, credentials: Credentials) -> Result<Self> {
        Self::new(settings, credentials, Arc::new(ReqwestTransportFactory))
    }

    fn open_session(&self, operation: &'static str) -> Result<Session> {
        Session::open(self.transport.as_ref(), &self.credentials, operation)
    }

    fn query_url(&self, object_type: &str, query: &str, fetch: &[&str], start: u64) -> Result<Url> {
        let mut raw = format!(
            "{}/{}/{}/{}?query={}&start={}&pagesize={}",
            self.settings.server.trim_end_matches('/'),
            RALLY_BASE_RESOURCE,
            self.settings.api_version,
            object_type,
            query,
            start,
            self.settings.page_size,
        );
        if self.settings.inline_fetch && !fetch.is_empty() {
            raw.push_str("&fetch=");
            raw.push_str(&fetch.join(","));
        }
        Url::parse(&raw).map_err(|e| ConnectorError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })
    }

    /// Run one query across all of its result pages.
    ///
    /// Errors reported by Rally inside a successful response end the query
    /// without failing it: whatever earlier pages returned is kept.
    async fn run_query(
        &self,
        fetcher: &Fetcher<'_>,
        object_type: &str,
        query: &str,
        fetch: &[&str],
    ) -> Result<Vec<RallyObject>> {
        let mut objects = Vec::new();
        let mut start: u64 = 1;
        loop {
            let url = self.query_url(object_type, query, fetch, start)?;
            let page = fetcher.fetch_query(&url).await?;
            if !page.errors.is_empty() {
                for error in &page.errors {
                    tracing::error!(object_type, "{error}");
                }
                return Ok(objects);
            }
            for warning in &page.warnings {
                tracing::warn!(object_type, "{warning}");
            }

            // Rally echoes the 1-based index of the page it actually served.
            let first = if page.start_index > 0 { page.start_index } else { start };
            let received = page.results.len() as u64;
            tracing::debug!(
                object_type,
                start = first,
                page_size = page.page_size,
                received,
                total = page.total_result_count,
                "query page"
            );
            objects.extend(page.results);
            if received == 0 || first - 1 + received >= page.total_result_count {
                break;
            }
            start = first + received;
        }
        Ok(objects)
    }

    async fn query_iterations(
        &self,
        operation: &'static str,
        attribute: &str,
        value: &str,
    ) -> Result<Vec<IterationStatus>> {
        let session = self.open_session(operation)?;
        let fetcher = Fetcher::new(session.transport());
        let query = query::build(&[attribute, "=", value])?;
        let objects = self
            .run_query(&fetcher, ArtifactKind::Iteration.object_type(), &query, &["Name"])
            .await?;

        let mut iterations = Vec::with_capacity(objects.len());
        for object in objects {
            let object = match classify(object) {
                ResultItem::Iteration(Source::Inline(object)) => object,
                ResultItem::Iteration(Source::Reference { stub, .. }) => stub,
                other => {
                    tracing::debug!(kind = ?other.kind(), "ignoring non-iteration result");
                    continue;
                }
            };
            if let Some(iteration) = iteration_status(&object) {
                iterations.push(iteration);
            }
        }
        Ok(iterations)
    }

    async fn query_stories(&self, operation: &'static str, query: &str) -> Result<StoryList> {
        let session = self.open_session(operation)?;
        let fetcher = Fetcher::new(session.transport());
        let fetch = schema::fetch_fields(STORY_MAPPING);

        let mut stories = StoryList::new();
        for kind in STORY_KINDS {
            let span = tracing::info_span!("query", object_type = kind.object_type());
            async {
                let objects = self
                    .run_query(&fetcher, kind.object_type(), query, &fetch)
                    .await?;
                let page = resolve_page(&fetcher, objects, &[kind]).await;
                if !page.failures.is_empty() {
                    tracing::warn!(skipped = page.failures.len(), "some references could not be resolved");
                }
                for resolved in page.artifacts {
                    let mut story = schema::transform_story(&resolved.object)?;
                    links::link_story(&mut story, resolved.object.reference());
                    tracing::info!("{} - {}", story.identifier, story.full_name);
                    stories.push(story);
                }
                Ok::<(), ConnectorError>(())
            }
            .instrument(span)
            .await?;
        }
        Ok(stories)
    }
}

fn iteration_status(object: &RallyObject) -> Option<IterationStatus> {
    let name = object
        .lookup("Name")
        .and_then(|v| v.as_str())
        .or_else(|| object.ref_object_name())
        .unwrap_or_default()
        .to_string();
    let reference = object.reference().unwrap_or_default();
    match Url::parse(reference) {
        Ok(location) => Some(IterationStatus { name, location }),
        Err(e) => {
            tracing::error!(iteration = %name, reference, error = %e, "iteration has invalid URI");
            None
        }
    }
}

#[async_trait]
impl Connector for RallyConnector {
    fn name(&self) -> &str {
        "Rally"
    }

    async fn list_iterations_for_project(&self, project: &str) -> Result<Vec<IterationStatus>> {
        let span = tracing::info_span!("list_iterations", project);
        self.query_iterations("list_iterations_for_project", "Project.Name", project)
            .instrument(span)
            .await
    }

    async fn list_iterations_involving_user(&self, user: &str) -> Result<Vec<IterationStatus>> {
        let span = tracing::info_span!("list_iterations", user);
        self.query_iterations(
            "list_iterations_involving_user",
            "UserIterationCapacities.User.Name",
            user,
        )
        .instrument(span)
        .await
    }

    async fn retrieve_stories_for_iteration(&self, iteration: &str) -> Result<StoryList> {
        let span = tracing::info_span!("retrieve_stories", iteration);
        async {
            let query = query::build(&["Iteration.Name", "=", iteration])?;
            self.query_stories("retrieve_stories_for_iteration", &query)
                .await
        }
        .instrument(span)
        .await
    }

    async fn retrieve_stories_for_project_iteration(
        &self,
        project: &str,
        iteration: &str,
    ) -> Result<StoryList> {
        let span = tracing::info_span!("retrieve_stories", project, iteration);
        async {
            let query = query::build(&[
                "Project.Name",
                "=",
                project,
                "Iteration.Name",
                "=",
                iteration,
            ])?;
            self.query_stories("retrieve_stories_for_project_iteration", &query)
                .await
        }
        .instrument(span)
        .await
    }

    async fn retrieve_stories(&self, ids: &[String]) -> Result<StoryList> {
        if ids.is_empty() {
            return Ok(StoryList::new());
        }
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        let query = query::build_or("FormattedID", "=", &ids)?;
        self.query_stories("retrieve_stories", &query)
            .instrument(tracing::info_span!("retrieve_stories", count = ids.len()))
            .await
    }

    async fn retrieve_tasks(&self, stories: &StoryList) -> Result<TaskList> {
        let session = self.open_session("retrieve_tasks")?;
        let fetcher = Fetcher::new(session.transport());
        let fetch = schema::fetch_fields(TASK_MAPPING);

        let mut tasks = TaskList::new();
        for story in stories {
            let span = tracing::info_span!("retrieve_tasks", story = %story.identifier);
            async {
                let query = query::build(&["WorkProduct.FormattedID", "=", story.identifier.as_str()])?;
                let objects = self
                    .run_query(&fetcher, ArtifactKind::Task.object_type(), &query, &fetch)
                    .await?;
                let page = resolve_page(&fetcher, objects, &[ArtifactKind::Task]).await;
                if !page.failures.is_empty() {
                    tracing::warn!(skipped = page.failures.len(), "some task references could not be resolved");
                }
                for resolved in page.artifacts {
                    let mut task = schema::transform_task(&resolved.object)?;
                    task.parent_identifier = story.identifier.clone();
                    links::link_task(&mut task, resolved.object.reference(), story);
                    tasks.push(task);
                }
                Ok::<(), ConnectorError>(())
            }
            .instrument(span)
            .await?;
        }
        Ok(tasks)
    }
}
