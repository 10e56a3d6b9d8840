use serde::{Deserialize, Serialize};

pub const OBJECT_URL_REL: &str = "Object URL";
pub const PARENT_URL_REL: &str = "Parent URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub rel: String,
    /// Opaque locator of the linked resource, never dereferenced by the model.
    pub target: String,
    pub owner: String,
}

impl Link {
    pub fn new(rel: &str, target: impl Into<String>, owner: &str) -> Self {
        Self {
            rel: rel.to_string(),
            target: target.into(),
            owner: owner.to_string(),
        }
    }
}

/// Anything that carries an append-only collection of links.
pub trait Linked {
    fn links(&self) -> &[Link];
    fn push_link(&mut self, link: Link);
}
