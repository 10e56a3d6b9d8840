pub mod description;
pub mod iteration;
pub mod link;
pub mod story;
