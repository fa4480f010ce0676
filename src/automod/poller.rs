//! Poll cycles and the watermark of processed posts.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::dispatch::ActionDispatcher;
use super::engine::evaluate;
use super::filter::Filter;
use super::notify::Notifier;
use super::report::ErrorSink;
use crate::config::Config;
use crate::discussions::{DiscussionService, Post};

/// Highest post id already processed. Never decreases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark(u64);

impl Watermark {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub fn new(post_id: u64) -> Self {
        Self(post_id)
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    /// Whether `post_id` has already been processed.
    #[must_use]
    pub fn covers(self, post_id: u64) -> bool {
        post_id <= self.0
    }

    /// Move up to `newest`; a lower id leaves the watermark where it is.
    #[must_use]
    pub fn advance(self, newest: u64) -> Self {
        Self(self.0.max(newest))
    }
}

/// The automoderator: filters plus everything needed to act on matches.
pub struct Automod {
    service: Arc<dyn DiscussionService>,
    filters: Vec<Filter>,
    dispatcher: ActionDispatcher,
    notifier: Notifier,
    page_limit: usize,
    tracker: TaskTracker,
}

impl Automod {
    /// Build an automoderator. Remote failures are reported to `errors`.
    ///
    /// # Errors
    ///
    /// Returns an error if the webhook HTTP client cannot be built.
    pub fn new(
        config: &Config,
        service: Arc<dyn DiscussionService>,
        filters: Vec<Filter>,
        errors: ErrorSink,
    ) -> Result<Self, reqwest::Error> {
        let tracker = TaskTracker::new();
        let dispatcher = ActionDispatcher::new(Arc::clone(&service), tracker.clone(), errors);
        let notifier = Notifier::new(config, tracker.clone())?;

        Ok(Self {
            service,
            filters,
            dispatcher,
            notifier,
            page_limit: config.page_limit,
            tracker,
        })
    }

    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Run one poll cycle and return the updated watermark.
    ///
    /// Fetch failures are logged and leave the watermark unchanged.
    pub async fn run_cycle(&self, watermark: Watermark) -> Watermark {
        let page = match self.service.get_latest_posts(self.page_limit, true).await {
            Ok(page) => page,
            Err(e) => {
                error!("Failed to fetch latest posts: {e}");
                return watermark;
            }
        };

        let Some(newest) = page.newest_id() else {
            debug!("No posts returned");
            return watermark;
        };

        let mut evaluated = 0usize;
        let mut matched = 0usize;
        for post in &page.posts {
            if watermark.covers(post.id) || post.is_deleted {
                continue;
            }
            evaluated += 1;
            matched += self.process_post(post);
        }

        let next = watermark.advance(newest);
        if newest < watermark.get() {
            warn!(
                newest,
                watermark = watermark.get(),
                "Newest post is older than the watermark"
            );
        }
        if evaluated > 0 {
            info!(
                evaluated,
                matched,
                watermark = next.get(),
                "Processed new posts"
            );
        }
        next
    }

    /// Evaluate every filter against one post. Returns the number of matches.
    fn process_post(&self, post: &Post) -> usize {
        let mut matched = 0;
        for filter in &self.filters {
            let Some(rule) = evaluate(post, filter) else {
                continue;
            };
            matched += 1;
            let outcome = self.dispatcher.apply(post, filter, rule);
            self.notifier.notify(post, filter, rule, &outcome);
        }
        matched
    }

    /// Wait for in-flight actions and notifications, up to `grace`.
    ///
    /// Returns false if some were still running when the grace period ended.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.tracker.close();
        tokio::time::timeout(grace, self.tracker.wait())
            .await
            .is_ok()
    }
}

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Run poll cycles every `interval` until `shutdown` resolves.
///
/// Cycles never overlap: a cycle that outlasts the interval makes the loop
/// skip the missed ticks. An interval below one millisecond is raised to one
/// millisecond. Returns the final watermark.
pub async fn poll_loop<F>(automod: &Automod, interval: Duration, shutdown: F) -> Watermark
where
    F: Future<Output = ()>,
{
    let interval = interval.max(MIN_POLL_INTERVAL);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    info!(
        filters = automod.filters().len(),
        interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        "Automod polling started"
    );

    let mut watermark = Watermark::ZERO;
    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = ticker.tick() => {
                watermark = automod.run_cycle(watermark).await;
            }
        }
    }

    info!(watermark = watermark.get(), "Automod polling stopped");
    watermark
}
