//! Discussions API boundary.
//!
//! The automoderator only talks to the remote forum through the
//! [`DiscussionService`] trait. [`DiscussionsClient`] is the HTTP
//! implementation used by the binary.

mod client;
mod models;

use async_trait::async_trait;
use thiserror::Error;

pub use client::DiscussionsClient;
pub use models::{Author, Post, PostsPage, ThreadEdit};

/// Errors returned by discussions API operations.
#[derive(Debug, Error)]
pub enum DiscussionsError {
    #[error("client not initialized, call DiscussionsClient::init first")]
    NotInitialized,
    #[error("login is currently disabled, please use an access token")]
    LoginDisabled,
    #[error("request failed: {status} {reason}")]
    Http { status: u16, reason: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("invalid request url: {0}")]
    Url(#[from] url::ParseError),
}

/// Operations the automoderator performs against the discussions API.
///
/// Implementations own authentication and request sequencing.
#[async_trait]
pub trait DiscussionService: Send + Sync {
    /// Fetch the newest posts, most recent first.
    async fn get_latest_posts(
        &self,
        limit: usize,
        viewable_only: bool,
    ) -> Result<PostsPage, DiscussionsError>;

    async fn delete_post(&self, post_id: u64) -> Result<(), DiscussionsError>;

    async fn delete_thread(&self, thread_id: u64) -> Result<(), DiscussionsError>;

    /// Move a thread into another category (forum).
    async fn change_thread_category(
        &self,
        thread_id: u64,
        category_id: u64,
    ) -> Result<(), DiscussionsError>;

    /// Create a reply in a thread.
    async fn create_post(&self, thread_id: u64, body: &str) -> Result<(), DiscussionsError>;

    async fn edit_post(&self, post_id: u64, body: &str) -> Result<(), DiscussionsError>;

    async fn edit_thread(&self, thread_id: u64, edit: &ThreadEdit)
        -> Result<(), DiscussionsError>;
}
