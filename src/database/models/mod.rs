pub mod cover;
pub mod hit;
pub mod insight;
pub mod topic;
pub mod user;

pub use topic::{Topic, TopicRef};
