use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Author of a post, as embedded in the post payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: u64,
    pub name: String,
    pub avatar_url: Option<String>,
    /// Whether the author holds a discussions rights badge (moderator, admin, staff).
    pub has_bypass_badge: bool,
}

/// A discussions post snapshot taken at fetch time.
///
/// Thread openers are posts too: `is_reply` is false for them and `title`
/// holds the thread title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: u64,
    pub thread_id: u64,
    /// Category the post's thread lives in.
    pub forum_id: u64,
    pub title: String,
    pub raw_content: String,
    pub is_reply: bool,
    pub is_deleted: bool,
    /// Thread funnel, e.g. `TEXT` or `POLL`.
    pub post_type: String,
    pub author: Author,
    pub created_at: Option<DateTime<Utc>>,
}

/// One page of posts, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostsPage {
    pub posts: Vec<Post>,
}

impl PostsPage {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Id of the most recent post on the page.
    #[must_use]
    pub fn newest_id(&self) -> Option<u64> {
        self.posts.first().map(|p| p.id)
    }
}

/// Fields sent when updating a thread opener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadEdit {
    pub body: String,
    pub title: String,
    pub post_type: String,
    pub forum_id: u64,
}

// Wire format of `DiscussionPost/getPosts`.

#[derive(Debug, Deserialize)]
pub(crate) struct PostsResponse {
    #[serde(rename = "_embedded", default)]
    embedded: Option<EmbeddedPosts>,
}

#[derive(Debug, Deserialize)]
struct EmbeddedPosts {
    #[serde(rename = "doc:posts", default)]
    posts: Option<Vec<WirePost>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePost {
    #[serde(deserialize_with = "de_id")]
    id: u64,
    #[serde(deserialize_with = "de_id")]
    thread_id: u64,
    #[serde(deserialize_with = "de_id")]
    forum_id: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    raw_content: Option<String>,
    #[serde(default)]
    is_reply: bool,
    #[serde(default)]
    is_deleted: bool,
    #[serde(default)]
    funnel: Option<String>,
    created_by: WireAuthor,
    #[serde(default)]
    creation_date: Option<WireDate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAuthor {
    #[serde(deserialize_with = "de_id")]
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default)]
    badge_permission: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDate {
    epoch_second: i64,
}

impl PostsResponse {
    pub(crate) fn into_page(self) -> PostsPage {
        let posts = self
            .embedded
            .and_then(|e| e.posts)
            .unwrap_or_default()
            .into_iter()
            .map(WirePost::into_post)
            .collect();
        PostsPage { posts }
    }
}

impl WirePost {
    fn into_post(self) -> Post {
        Post {
            id: self.id,
            thread_id: self.thread_id,
            forum_id: self.forum_id,
            title: self.title.unwrap_or_default(),
            raw_content: self.raw_content.unwrap_or_default(),
            is_reply: self.is_reply,
            is_deleted: self.is_deleted,
            post_type: self.funnel.unwrap_or_else(|| "TEXT".to_string()),
            author: Author {
                id: self.created_by.id,
                name: self.created_by.name.unwrap_or_default(),
                avatar_url: self.created_by.avatar_url.filter(|u| !u.is_empty()),
                has_bypass_badge: self
                    .created_by
                    .badge_permission
                    .is_some_and(|b| !b.is_empty()),
            },
            created_at: self
                .creation_date
                .and_then(|d| DateTime::from_timestamp(d.epoch_second, 0)),
        }
    }
}

/// Ids are decimal strings on the wire, but accept plain numbers too.
fn de_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(n) => Ok(n),
        RawId::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

// Request bodies.

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Attachments {
    at_mentions: Vec<serde_json::Value>,
    content_images: Vec<serde_json::Value>,
    open_graphs: Vec<serde_json::Value>,
}

impl Attachments {
    pub(crate) fn empty() -> Self {
        Self {
            at_mentions: Vec::new(),
            content_images: Vec::new(),
            open_graphs: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreatePostBody<'a> {
    pub attachments: Attachments,
    pub body: &'a str,
    pub thread_id: String,
    pub source: &'static str,
    pub site_id: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EditPostBody<'a> {
    pub attachments: Attachments,
    pub body: &'a str,
    pub source: &'static str,
    pub site_id: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EditThreadBody<'a> {
    pub article_ids: Vec<String>,
    pub attachments: Attachments,
    pub body: &'a str,
    pub forum_id: String,
    pub funnel: &'a str,
    pub source: &'static str,
    pub title: &'a str,
    pub site_id: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MoveThreadsBody {
    pub thread_ids: Vec<String>,
}
