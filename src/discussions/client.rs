use std::time::Instant;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, trace};

use super::models::{
    Attachments, CreatePostBody, EditPostBody, EditThreadBody, MoveThreadsBody, PostsResponse,
};
use super::{DiscussionService, DiscussionsError, PostsPage, ThreadEdit};
use crate::config::{Authentication, Config};
use crate::constants::{AUTOMOD_USER_AGENT, POST_SOURCE};

/// One `wikia.php` controller call.
struct ApiCall {
    http_method: Method,
    controller: &'static str,
    method: &'static str,
    params: Vec<(&'static str, String)>,
    authenticated: bool,
}

impl ApiCall {
    fn get(controller: &'static str, method: &'static str) -> Self {
        Self {
            http_method: Method::GET,
            controller,
            method,
            params: Vec::new(),
            authenticated: false,
        }
    }

    fn post(controller: &'static str, method: &'static str) -> Self {
        Self {
            http_method: Method::POST,
            authenticated: true,
            ..Self::get(controller, method)
        }
    }

    fn param(mut self, name: &'static str, value: impl ToString) -> Self {
        self.params.push((name, value.to_string()));
        self
    }
}

#[derive(Debug, Deserialize)]
struct WikiVariables {
    data: WikiVariablesData,
}

#[derive(Debug, Deserialize)]
struct WikiVariablesData {
    id: u64,
}

/// HTTP client for the Fandom discussions API.
///
/// Requests go through a single queue: only one is in flight at a time and
/// consecutive requests are spaced by the configured delay.
pub struct DiscussionsClient {
    http: Client,
    base_url: String,
    token: String,
    wiki_id: OnceCell<u64>,
    /// Time the previous request was sent; the lock is the request queue.
    queue: Mutex<Option<Instant>>,
    request_delay: std::time::Duration,
}

impl DiscussionsClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DiscussionsError::LoginDisabled`] when only username/password
    /// authentication is configured.
    pub fn new(config: &Config) -> Result<Self, DiscussionsError> {
        let token = match &config.authentication {
            Authentication::Token(token) => token.clone(),
            Authentication::Credentials { username, password } => {
                login(username.as_deref(), password.as_deref())?
            }
        };

        let http = Client::builder()
            .timeout(config.http_timeout)
            .user_agent(AUTOMOD_USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            token,
            wiki_id: OnceCell::new(),
            queue: Mutex::new(None),
            request_delay: config.request_delay,
        })
    }

    /// Look up the wiki id. Must be called before any other request.
    ///
    /// # Errors
    ///
    /// Returns an error if the wiki variables cannot be fetched.
    pub async fn init(&self) -> Result<u64, DiscussionsError> {
        if let Some(id) = self.wiki_id.get() {
            return Ok(*id);
        }

        let url = format!("{}/api/v1/Mercury/WikiVariables", self.base_url);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(http_error(status));
        }

        let vars: WikiVariables = response
            .json()
            .await
            .map_err(|e| DiscussionsError::Decode(e.to_string()))?;
        let id = *self.wiki_id.get_or_init(|| vars.data.id);
        info!(wiki_id = id, base_url = %self.base_url, "Discussions client initialized");
        Ok(id)
    }

    /// Wiki (site) id, once [`init`](Self::init) has succeeded.
    pub fn wiki_id(&self) -> Result<u64, DiscussionsError> {
        self.wiki_id
            .get()
            .copied()
            .ok_or(DiscussionsError::NotInitialized)
    }

    /// Send a queued request and return the response body (empty for 204).
    async fn request<B: Serialize + Sync>(
        &self,
        call: ApiCall,
        body: Option<&B>,
    ) -> Result<String, DiscussionsError> {
        self.wiki_id()?;

        let mut url = url::Url::parse(&format!("{}/wikia.php", self.base_url))?;
        url.query_pairs_mut()
            .append_pair("controller", call.controller)
            .append_pair("method", call.method)
            .extend_pairs(call.params.iter().map(|(k, v)| (*k, v.as_str())));

        let mut last_sent = self.queue.lock().await;
        if let Some(last) = *last_sent {
            let elapsed = last.elapsed();
            if elapsed < self.request_delay {
                sleep(self.request_delay - elapsed).await;
            }
        }
        *last_sent = Some(Instant::now());

        debug!(
            controller = call.controller,
            method = call.method,
            "Sending discussions request"
        );

        let mut builder = self.http.request(call.http_method, url);
        if call.authenticated {
            builder = builder.header("Cookie", format!("access_token={}", self.token));
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        drop(last_sent);

        let status = response.status();
        trace!(status = %status, "Discussions response");
        if !status.is_success() {
            return Err(http_error(status));
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(String::new());
        }
        Ok(response.text().await?)
    }
}

/// Exchange username/password for an access token.
///
/// The login endpoint does not accept bot logins at the moment, so this always
/// fails and an access token has to be configured instead.
fn login(_username: Option<&str>, _password: Option<&str>) -> Result<String, DiscussionsError> {
    Err(DiscussionsError::LoginDisabled)
}

fn http_error(status: StatusCode) -> DiscussionsError {
    DiscussionsError::Http {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
    }
}

#[async_trait]
impl DiscussionService for DiscussionsClient {
    async fn get_latest_posts(
        &self,
        limit: usize,
        viewable_only: bool,
    ) -> Result<PostsPage, DiscussionsError> {
        let call = ApiCall::get("DiscussionPost", "getPosts")
            .param("sortKey", "creation_date")
            .param("limit", limit)
            .param("viewableOnly", viewable_only);
        let body = self.request::<()>(call, None).await?;

        let response: PostsResponse =
            serde_json::from_str(&body).map_err(|e| DiscussionsError::Decode(e.to_string()))?;
        Ok(response.into_page())
    }

    async fn delete_post(&self, post_id: u64) -> Result<(), DiscussionsError> {
        let call = ApiCall::post("DiscussionPost", "delete").param("postId", post_id);
        self.request::<()>(call, None).await?;
        Ok(())
    }

    async fn delete_thread(&self, thread_id: u64) -> Result<(), DiscussionsError> {
        let call = ApiCall::post("DiscussionThread", "delete").param("threadId", thread_id);
        self.request::<()>(call, None).await?;
        Ok(())
    }

    async fn change_thread_category(
        &self,
        thread_id: u64,
        category_id: u64,
    ) -> Result<(), DiscussionsError> {
        let call =
            ApiCall::post("DiscussionForum", "moveThreadsIntoForum").param("forumId", category_id);
        let body = MoveThreadsBody {
            thread_ids: vec![thread_id.to_string()],
        };
        self.request(call, Some(&body)).await?;
        Ok(())
    }

    async fn create_post(&self, thread_id: u64, body: &str) -> Result<(), DiscussionsError> {
        let call = ApiCall::post("DiscussionPost", "create");
        let body = CreatePostBody {
            attachments: Attachments::empty(),
            body,
            thread_id: thread_id.to_string(),
            source: POST_SOURCE,
            site_id: self.wiki_id()?,
        };
        self.request(call, Some(&body)).await?;
        Ok(())
    }

    async fn edit_post(&self, post_id: u64, body: &str) -> Result<(), DiscussionsError> {
        let call = ApiCall::post("DiscussionPost", "update").param("postId", post_id);
        let body = EditPostBody {
            attachments: Attachments::empty(),
            body,
            source: POST_SOURCE,
            site_id: self.wiki_id()?,
        };
        self.request(call, Some(&body)).await?;
        Ok(())
    }

    async fn edit_thread(
        &self,
        thread_id: u64,
        edit: &ThreadEdit,
    ) -> Result<(), DiscussionsError> {
        let call = ApiCall::post("DiscussionThread", "update").param("threadId", thread_id);
        let body = EditThreadBody {
            article_ids: Vec::new(),
            attachments: Attachments::empty(),
            body: &edit.body,
            forum_id: edit.forum_id.to_string(),
            funnel: &edit.post_type,
            source: POST_SOURCE,
            title: &edit.title,
            site_id: self.wiki_id()?,
        };
        self.request(call, Some(&body)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_are_rejected() {
        let config = Config {
            authentication: Authentication::Credentials {
                username: Some("bot".to_string()),
                password: Some("hunter2".to_string()),
            },
            ..Config::for_testing()
        };
        assert!(matches!(
            DiscussionsClient::new(&config),
            Err(DiscussionsError::LoginDisabled)
        ));
    }

    #[tokio::test]
    async fn test_requests_require_init() {
        let client = DiscussionsClient::new(&Config::for_testing()).unwrap();
        assert!(matches!(
            client.wiki_id(),
            Err(DiscussionsError::NotInitialized)
        ));
        let err = client.delete_post(1).await.unwrap_err();
        assert!(matches!(err, DiscussionsError::NotInitialized));
    }

    #[test]
    fn test_http_error_reason() {
        let err = http_error(StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), "request failed: 403 Forbidden");
    }
}
