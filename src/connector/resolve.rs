use reqwest::Url;

use super::envelope::{ArtifactKind, RallyObject};
use super::fetch::Fetcher;
use super::ConnectorError;

/// Where the fields of a result entry come from.
#[derive(Debug, Clone)]
pub enum Source {
    Inline(RallyObject),
    /// Only a locator was returned; the stub keeps `_ref` and `_refObjectName`.
    Reference { url: String, stub: RallyObject },
}

#[derive(Debug, Clone)]
pub enum ResultItem {
    Requirement(Source),
    Defect(Source),
    Task(Source),
    Iteration(Source),
    Unknown { discriminator: String },
}

impl ResultItem {
    pub fn kind(&self) -> Option<ArtifactKind> {
        match self {
            ResultItem::Requirement(_) => Some(ArtifactKind::HierarchicalRequirement),
            ResultItem::Defect(_) => Some(ArtifactKind::Defect),
            ResultItem::Task(_) => Some(ArtifactKind::Task),
            ResultItem::Iteration(_) => Some(ArtifactKind::Iteration),
            ResultItem::Unknown { .. } => None,
        }
    }

    fn into_source(self) -> Option<Source> {
        match self {
            ResultItem::Requirement(s)
            | ResultItem::Defect(s)
            | ResultItem::Task(s)
            | ResultItem::Iteration(s) => Some(s),
            ResultItem::Unknown { .. } => None,
        }
    }
}

/// An artifact whose fields are all available locally.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub kind: ArtifactKind,
    pub object: RallyObject,
}

#[derive(Debug)]
pub struct ResolveFailure {
    pub reference: String,
    pub error: ConnectorError,
}

#[derive(Debug, Default)]
pub struct ResolvedPage {
    pub artifacts: Vec<Resolved>,
    pub failures: Vec<ResolveFailure>,
}

pub fn classify(object: RallyObject) -> ResultItem {
    let discriminator = object.discriminator().unwrap_or_default().to_string();
    let Some(kind) = ArtifactKind::from_type_name(&discriminator) else {
        return ResultItem::Unknown { discriminator };
    };

    let source = if object.is_reference_only() {
        Source::Reference {
            url: object.reference().unwrap_or_default().to_string(),
            stub: object,
        }
    } else {
        Source::Inline(object)
    };

    match kind {
        ArtifactKind::HierarchicalRequirement => ResultItem::Requirement(source),
        ArtifactKind::Defect => ResultItem::Defect(source),
        ArtifactKind::Task => ResultItem::Task(source),
        ArtifactKind::Iteration => ResultItem::Iteration(source),
    }
}

/// Resolve every entry of `kinds`, fetching reference-only entries one at a time.
///
/// Entries of other kinds are skipped. A failed follow-up fetch is recorded in
/// [`ResolvedPage::failures`] and does not stop the remaining entries.
pub async fn resolve_page(
    fetcher: &Fetcher<'_>,
    objects: Vec<RallyObject>,
    kinds: &[ArtifactKind],
) -> ResolvedPage {
    let mut page = ResolvedPage::default();
    for object in objects {
        let item = classify(object);
        let Some(kind) = item.kind().filter(|k| kinds.contains(k)) else {
            if let ResultItem::Unknown { discriminator } = &item {
                tracing::debug!(discriminator = %discriminator, "ignoring object of unknown type");
            } else {
                tracing::debug!(kind = ?item.kind(), "ignoring object of unrequested type");
            }
            continue;
        };
        let Some(source) = item.into_source() else {
            continue;
        };

        match source {
            Source::Inline(object) => page.artifacts.push(Resolved { kind, object }),
            Source::Reference { url, .. } => match fetch_reference(fetcher, kind, &url).await {
                Ok(object) => page.artifacts.push(Resolved { kind, object }),
                Err(error) => {
                    tracing::warn!(reference = %url, error = %error, "failed to resolve reference");
                    page.failures.push(ResolveFailure {
                        reference: url,
                        error,
                    });
                }
            },
        }
    }
    page
}

async fn fetch_reference(
    fetcher: &Fetcher<'_>,
    kind: ArtifactKind,
    reference: &str,
) -> Result<RallyObject, ConnectorError> {
    let url = Url::parse(reference).map_err(|e| ConnectorError::InvalidUrl {
        url: reference.to_string(),
        reason: e.to_string(),
    })?;
    fetcher.fetch_artifact(kind, &url).await
}
