use serde::{Deserialize, Serialize};

use super::description::Description;
use super::link::{Link, Linked};

/// Number of characters of the full name kept in the short name.
pub const SHORT_NAME_LEN: usize = 30;

/// A requirement or a defect, unified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Story {
    /// Vendor-assigned id; the prefix tells requirements (`US`) from defects (`DE`).
    pub identifier: String,
    pub full_name: String,
    pub short_name: String,
    pub owner: String,
    pub estimate: f64,
    pub description: Description,
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub identifier: String,
    /// Identifier of the owning story, used as a lookup key.
    pub parent_identifier: String,
    pub full_name: String,
    pub short_name: String,
    pub owner: String,
    pub detailed_estimate: f64,
    pub todo_remaining: f64,
    pub effort_applied: f64,
    pub description: Description,
    #[serde(default)]
    pub links: Vec<Link>,
}

pub type StoryList = Vec<Story>;
pub type TaskList = Vec<Task>;

pub fn short_name(full_name: &str) -> String {
    full_name.chars().take(SHORT_NAME_LEN).collect()
}

impl Linked for Story {
    fn links(&self) -> &[Link] {
        &self.links
    }

    fn push_link(&mut self, link: Link) {
        self.links.push(link);
    }
}

impl Linked for Task {
    fn links(&self) -> &[Link] {
        &self.links
    }

    fn push_link(&mut self, link: Link) {
        self.links.push(link);
    }
}
