//! Business rules sitting between the HTTP handlers and the [`Repository`].
//!
//! Services take the repository and whatever configuration they need as plain
//! arguments and return views ready to be wrapped in a response envelope.
//!
//! [`Repository`]: crate::repository::Repository

pub mod articles;
pub mod comments;
pub mod profiles;
pub mod users;
