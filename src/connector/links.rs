use crate::model::link::{Link, Linked, OBJECT_URL_REL, PARENT_URL_REL};
use crate::model::story::{Story, Task};

/// Owner recorded on links created by the Rally connector.
pub const LINK_OWNER: &str = "standup::rally";

/// Find the first link whose relation matches `rel`, ignoring case.
///
/// Returns a copy so callers cannot alter the object's own links.
pub fn find_link_by_rel<T: Linked + ?Sized>(obj: &T, rel: &str) -> Option<Link> {
    obj.links()
        .iter()
        .find(|l| l.rel.eq_ignore_ascii_case(rel))
        .cloned()
}

pub fn add_link<T: Linked + ?Sized>(obj: &mut T, target: &str, rel: &str) {
    obj.push_link(Link::new(rel, target, LINK_OWNER));
}

/// Attach the story's own resource URI.
pub fn link_story(story: &mut Story, object_url: Option<&str>) {
    match object_url {
        Some(url) => add_link(story, url, OBJECT_URL_REL),
        None => tracing::warn!(story = %story.identifier, "story has no resource URI"),
    }
}

/// Attach the task's resource URI and a parent link copied from the story.
pub fn link_task(task: &mut Task, object_url: Option<&str>, story: &Story) {
    match object_url {
        Some(url) => add_link(task, url, OBJECT_URL_REL),
        None => tracing::warn!(task = %task.identifier, "task has no resource URI"),
    }
    match find_link_by_rel(story, OBJECT_URL_REL) {
        Some(mut parent) => {
            parent.rel = PARENT_URL_REL.to_string();
            task.push_link(parent);
        }
        None => tracing::warn!(
            story = %story.identifier,
            task = %task.identifier,
            "story has no object link; task left without parent link"
        ),
    }
}
