use reqwest::Url;
use serde_json::{Map, Value};

use super::envelope::{ArtifactKind, Envelope, EnvelopeKind, QueryResult, RallyObject};
use super::transport::Transport;
use super::{ConnectorError, Result};

/// Issues GET requests through a session's transport and decodes typed envelopes.
pub struct Fetcher<'a> {
    transport: &'a dyn Transport,
}

impl<'a> Fetcher<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    pub async fn fetch(&self, kind: EnvelopeKind, url: &Url) -> Result<Envelope> {
        tracing::debug!(kind = kind.type_name(), %url, "retrieving");
        let resp = self
            .transport
            .get(url)
            .await
            .map_err(|source| ConnectorError::Transport {
                url: url.to_string(),
                source,
            })?;

        if resp.status != 200 {
            return Err(ConnectorError::Protocol {
                url: url.to_string(),
                status: resp.status,
                reason: resp.reason,
            });
        }

        let decoding = |source| ConnectorError::Decoding {
            url: url.to_string(),
            source,
        };
        let body: Map<String, Value> = serde_json::from_str(&resp.body).map_err(decoding)?;
        let (declared, payload) = single_entry(body)?;
        if !declared.eq_ignore_ascii_case(kind.type_name()) {
            return Err(ConnectorError::UnexpectedResponseType {
                expected: kind.type_name().to_string(),
                actual: declared,
            });
        }

        match kind {
            EnvelopeKind::QueryResult => Ok(Envelope::QueryResult(
                serde_json::from_value(payload).map_err(decoding)?,
            )),
            EnvelopeKind::Artifact(artifact) => Ok(Envelope::Artifact(
                artifact,
                serde_json::from_value(payload).map_err(decoding)?,
            )),
        }
    }

    pub async fn fetch_query(&self, url: &Url) -> Result<QueryResult> {
        match self.fetch(EnvelopeKind::QueryResult, url).await? {
            Envelope::QueryResult(result) => Ok(result),
            Envelope::Artifact(kind, _) => Err(unexpected(EnvelopeKind::QueryResult, kind)),
        }
    }

    pub async fn fetch_artifact(&self, kind: ArtifactKind, url: &Url) -> Result<RallyObject> {
        let expected = EnvelopeKind::Artifact(kind);
        match self.fetch(expected, url).await? {
            Envelope::Artifact(_, object) => Ok(object),
            Envelope::QueryResult(_) => Err(ConnectorError::UnexpectedResponseType {
                expected: expected.type_name().to_string(),
                actual: EnvelopeKind::QueryResult.type_name().to_string(),
            }),
        }
    }
}

fn unexpected(expected: EnvelopeKind, actual: ArtifactKind) -> ConnectorError {
    ConnectorError::UnexpectedResponseType {
        expected: expected.type_name().to_string(),
        actual: actual.type_name().to_string(),
    }
}

fn single_entry(body: Map<String, Value>) -> Result<(String, Value)> {
    if body.len() != 1 {
        let keys: Vec<&str> = body.keys().map(String::as_str).collect();
        return Err(ConnectorError::UnexpectedResponseType {
            expected: "a single-key envelope".to_string(),
            actual: format!("keys [{}]", keys.join(", ")),
        });
    }
    body.into_iter()
        .next()
        .ok_or_else(|| ConnectorError::UnexpectedResponseType {
            expected: "a single-key envelope".to_string(),
            actual: "an empty object".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::testing::MockTransport;
    use serde_json::json;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn decodes_query_result() {
        let transport = MockTransport::new().route(
            "/task",
            json!({"QueryResult": {"TotalResultCount": 0, "Results": []}}),
        );
        let fetcher = Fetcher::new(&transport);
        let result = fetcher
            .fetch_query(&url("https://rally.test/slm/webservice/v2.0/task?query=x"))
            .await
            .unwrap();
        assert_eq!(result.total_result_count, 0);
        assert!(result.results.is_empty());
    }

    #[tokio::test]
    async fn decodes_single_artifact() {
        let transport = MockTransport::new().route(
            "/defect/7",
            json!({"Defect": {"FormattedID": "DE7", "_type": "Defect"}}),
        );
        let fetcher = Fetcher::new(&transport);
        let obj = fetcher
            .fetch_artifact(ArtifactKind::Defect, &url("https://rally.test/defect/7"))
            .await
            .unwrap();
        assert_eq!(obj.lookup("FormattedID"), Some(&json!("DE7")));
    }

    #[tokio::test]
    async fn non_200_is_protocol_error() {
        let transport = MockTransport::new().route_status("/task", 401, "Unauthorized");
        let fetcher = Fetcher::new(&transport);
        let err = fetcher
            .fetch_query(&url("https://rally.test/task"))
            .await
            .unwrap_err();
        match err {
            ConnectorError::Protocol { status, reason, .. } => {
                assert_eq!(status, 401);
                assert_eq!(reason, "Unauthorized");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn mismatched_declared_type_is_rejected() {
        let transport = MockTransport::new().route(
            "/defect/7",
            json!({"Task": {"FormattedID": "TA7"}}),
        );
        let fetcher = Fetcher::new(&transport);
        let err = fetcher
            .fetch_artifact(ArtifactKind::Defect, &url("https://rally.test/defect/7"))
            .await
            .unwrap_err();
        match err {
            ConnectorError::UnexpectedResponseType { expected, actual } => {
                assert_eq!(expected, "Defect");
                assert_eq!(actual, "Task");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_decoding_error() {
        let transport = MockTransport::new().route_raw("/task", 200, "OK", "<html>oops</html>");
        let fetcher = Fetcher::new(&transport);
        let err = fetcher
            .fetch_query(&url("https://rally.test/task"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Decoding { .. }));
    }

    #[tokio::test]
    async fn malformed_query_payload_is_decoding_error() {
        let transport = MockTransport::new().route(
            "/task",
            json!({"QueryResult": {"TotalResultCount": "many"}}),
        );
        let fetcher = Fetcher::new(&transport);
        let err = fetcher
            .fetch_query(&url("https://rally.test/task"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Decoding { .. }));
    }

    #[tokio::test]
    async fn transport_failure_is_reported_with_url() {
        let transport = MockTransport::new();
        let fetcher = Fetcher::new(&transport);
        let err = fetcher
            .fetch_query(&url("https://rally.test/nowhere"))
            .await
            .unwrap_err();
        match err {
            ConnectorError::Transport { url, .. } => assert!(url.contains("/nowhere")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
