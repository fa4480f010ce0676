//! Discord webhook notifications for filter matches.

use reqwest::Client;
use serde::Serialize;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use super::dispatch::ActionOutcome;
use super::filter::{ActionKind, Filter, Rule};
use crate::config::Config;
use crate::constants::{
    embed_colour, AUTOMOD_USER_AGENT, EMPTY_CONTENT_PLACEHOLDER, NOTIFICATION_CONTENT_LIMIT,
};
use crate::discussions::Post;

/// Webhook request body.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    pub title: String,
    pub url: String,
    pub color: u32,
    pub author: EmbedAuthor,
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline: Option<bool>,
}

impl EmbedField {
    fn inline(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
            inline: Some(true),
        }
    }

    fn block(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
            inline: None,
        }
    }
}

/// Posts match reports to the filter's webhook, or the default one.
#[derive(Clone)]
pub struct Notifier {
    http: Client,
    base_url: String,
    default_webhook_url: Option<String>,
    tracker: TaskTracker,
}

impl Notifier {
    /// Create a notifier that spawns deliveries on `tracker`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config, tracker: TaskTracker) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(config.http_timeout)
            .user_agent(AUTOMOD_USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            default_webhook_url: config.default_webhook_url.clone(),
            tracker,
        })
    }

    /// Webhook a filter reports to, if any.
    fn webhook_for<'a>(&'a self, filter: &'a Filter) -> Option<&'a str> {
        filter
            .webhook_url
            .as_deref()
            .or(self.default_webhook_url.as_deref())
    }

    /// Report a performed action. Returns whether a delivery was queued.
    ///
    /// Delivery runs in the background; failures are only logged.
    pub fn notify(
        &self,
        post: &Post,
        filter: &Filter,
        rule: &Rule,
        outcome: &ActionOutcome,
    ) -> bool {
        if !outcome.performed {
            return false;
        }
        let Some(webhook_url) = self.webhook_for(filter) else {
            return false;
        };

        let payload = WebhookPayload {
            embeds: vec![build_embed(&self.base_url, post, filter, rule)],
        };
        let http = self.http.clone();
        let webhook_url = webhook_url.to_string();
        let post_id = post.id;

        self.tracker.spawn(async move {
            deliver(&http, &webhook_url, &payload, post_id).await;
        });
        true
    }
}

async fn deliver(http: &Client, webhook_url: &str, payload: &WebhookPayload, post_id: u64) {
    match http.post(webhook_url).json(payload).send().await {
        Ok(response) if response.status().is_success() => {
            debug!(post_id, "Webhook notification sent");
        }
        Ok(response) => {
            warn!(post_id, status = %response.status(), "Webhook failed to send");
        }
        Err(e) => {
            warn!(post_id, "Webhook failed to send: {e}");
        }
    }
}

/// Link to a post: the thread, or the reply within it.
#[must_use]
pub fn post_url(base_url: &str, post: &Post) -> String {
    if post.is_reply {
        format!("{base_url}/f/p/{}/r/{}", post.thread_id, post.id)
    } else {
        format!("{base_url}/f/p/{}", post.thread_id)
    }
}

#[must_use]
pub fn action_colour(kind: ActionKind) -> u32 {
    match kind {
        ActionKind::Log => embed_colour::LOG,
        ActionKind::Delete => embed_colour::DELETE,
        ActionKind::Recategorize => embed_colour::RECATEGORIZE,
        ActionKind::Reply => embed_colour::REPLY,
        ActionKind::Edit => embed_colour::EDIT,
    }
}

/// Build the "Filter Matched" embed.
#[must_use]
pub fn build_embed(base_url: &str, post: &Post, filter: &Filter, rule: &Rule) -> Embed {
    let kind = filter.action.kind();

    let content: String = post
        .raw_content
        .chars()
        .take(NOTIFICATION_CONTENT_LIMIT)
        .collect();
    let content = if content.is_empty() {
        EMPTY_CONTENT_PLACEHOLDER.to_string()
    } else {
        content
    };

    Embed {
        title: "Filter Matched".to_string(),
        url: post_url(base_url, post),
        color: action_colour(kind),
        author: EmbedAuthor {
            name: post.author.name.clone(),
            url: format!("{base_url}/f/u/{}", post.author.id),
            icon_url: post.author.avatar_url.clone(),
        },
        fields: vec![
            EmbedField::inline("Filter Name", filter.name.clone()),
            EmbedField::inline("Check Failed", format!("`{rule}`")),
            EmbedField::inline("Action", kind.as_str()),
            EmbedField::block("Post Content", content),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automod::filter::Action;
    use crate::discussions::test_support::{reply_post, thread_post};

    const BASE: &str = "https://community.fandom.com";

    fn filter() -> (Filter, Rule) {
        let rule = Rule::parse("/spam/i").unwrap();
        (Filter::new("Spam", Action::Delete, vec![rule.clone()]), rule)
    }

    #[test]
    fn test_post_url() {
        assert_eq!(
            post_url(BASE, &thread_post(1)),
            "https://community.fandom.com/f/p/1001"
        );
        assert_eq!(
            post_url(BASE, &reply_post(2)),
            "https://community.fandom.com/f/p/1002/r/2"
        );
    }

    #[test]
    fn test_embed_shape() {
        let (filter, rule) = filter();
        let embed = build_embed(BASE, &thread_post(1), &filter, &rule);
        let json = serde_json::to_value(WebhookPayload {
            embeds: vec![embed],
        })
        .unwrap();

        let embed = &json["embeds"][0];
        assert_eq!(embed["title"], "Filter Matched");
        assert_eq!(embed["color"], embed_colour::DELETE);
        assert_eq!(embed["author"]["name"], "Someone");
        assert_eq!(embed["author"]["url"], "https://community.fandom.com/f/u/77");
        assert_eq!(embed["author"]["icon_url"], "https://img.example/avatar.png");
        assert_eq!(embed["fields"][0]["value"], "Spam");
        assert_eq!(embed["fields"][0]["inline"], true);
        assert_eq!(embed["fields"][1]["value"], "`/spam/i`");
        assert_eq!(embed["fields"][2]["value"], "delete");
        assert_eq!(embed["fields"][3]["name"], "Post Content");
        assert!(embed["fields"][3].get("inline").is_none());
    }

    #[test]
    fn test_content_truncated_and_placeholder() {
        let (filter, rule) = filter();
        let mut post = thread_post(1);
        post.raw_content = "é".repeat(2500);
        let embed = build_embed(BASE, &post, &filter, &rule);
        assert_eq!(embed.fields[3].value.chars().count(), 2000);

        post.raw_content = String::new();
        let embed = build_embed(BASE, &post, &filter, &rule);
        assert_eq!(embed.fields[3].value, "No Body Content");
    }

    #[tokio::test]
    async fn test_notify_requires_webhook_and_performed() {
        let tracker = TaskTracker::new();
        let notifier = Notifier::new(&Config::for_testing(), tracker.clone()).unwrap();
        let (mut filter, rule) = filter();
        let post = thread_post(1);
        let performed = ActionOutcome {
            performed: true,
            error: None,
        };
        let skipped = ActionOutcome {
            performed: false,
            error: None,
        };

        // No filter webhook and no default.
        assert!(!notifier.notify(&post, &filter, &rule, &performed));

        filter.webhook_url = Some("http://127.0.0.1:1/hook".to_string());
        assert!(!notifier.notify(&post, &filter, &rule, &skipped));
        // Unreachable webhook: queued, and the failure is only logged.
        assert!(notifier.notify(&post, &filter, &rule, &performed));

        tracker.close();
        tracker.wait().await;
    }

    #[tokio::test]
    async fn test_slow_webhook_times_out() {
        use std::time::Duration;
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_secs(30)))
            .expect(1)
            .mount(&server)
            .await;

        let config = Config {
            http_timeout: Duration::from_millis(200),
            default_webhook_url: Some(format!("{}/hook", server.uri())),
            ..Config::for_testing()
        };
        let tracker = TaskTracker::new();
        let notifier = Notifier::new(&config, tracker.clone()).unwrap();
        let (filter, rule) = filter();
        let performed = ActionOutcome {
            performed: true,
            error: None,
        };

        assert!(notifier.notify(&thread_post(1), &filter, &rule, &performed));

        tracker.close();
        let finished = tokio::time::timeout(Duration::from_secs(5), tracker.wait()).await;
        assert!(finished.is_ok(), "delivery outlived the configured timeout");
    }

    #[test]
    fn test_filter_webhook_overrides_default() {
        let config = Config {
            default_webhook_url: Some("https://default.example/hook".to_string()),
            ..Config::for_testing()
        };
        let notifier = Notifier::new(&config, TaskTracker::new()).unwrap();
        let (mut filter, _) = filter();

        assert_eq!(
            notifier.webhook_for(&filter),
            Some("https://default.example/hook")
        );
        filter.webhook_url = Some("https://filter.example/hook".to_string());
        assert_eq!(
            notifier.webhook_for(&filter),
            Some("https://filter.example/hook")
        );
    }

    #[test]
    fn test_action_colours_are_distinct() {
        let kinds = [
            ActionKind::Log,
            ActionKind::Delete,
            ActionKind::Recategorize,
            ActionKind::Reply,
            ActionKind::Edit,
        ];
        let colours: std::collections::HashSet<u32> =
            kinds.iter().map(|k| action_colour(*k)).collect();
        assert_eq!(colours.len(), kinds.len());
    }
}
