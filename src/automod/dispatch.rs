//! Executing a matched filter's action against the discussions API.
//!
//! Remote calls are spawned on the shared task tracker and never awaited here,
//! so a slow or failing API does not hold up evaluation of the next post.
//! Failures go to the [`ErrorSink`].

use std::sync::Arc;

use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::filter::{Action, Filter, Rule};
use super::report::{ErrorSink, RemoteFailure};
use crate::discussions::{DiscussionService, DiscussionsError, Post, ThreadEdit};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to resolve edit content: {0:#}")]
    EditContent(anyhow::Error),
}

/// Result of applying a filter's action to a post.
#[derive(Debug)]
pub struct ActionOutcome {
    /// The action was carried out (or, for remote actions, issued).
    pub performed: bool,
    pub error: Option<DispatchError>,
}

impl ActionOutcome {
    fn performed() -> Self {
        Self {
            performed: true,
            error: None,
        }
    }

    fn skipped() -> Self {
        Self {
            performed: false,
            error: None,
        }
    }

    fn failed(error: DispatchError) -> Self {
        Self {
            performed: false,
            error: Some(error),
        }
    }
}

/// A single remote moderation call.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RemoteCall {
    DeletePost(u64),
    DeleteThread(u64),
    ChangeThreadCategory { thread_id: u64, category_id: u64 },
    CreatePost { thread_id: u64, body: String },
    EditPost { post_id: u64, body: String },
    EditThread { thread_id: u64, edit: ThreadEdit },
}

impl RemoteCall {
    fn operation(&self) -> &'static str {
        match self {
            Self::DeletePost(_) => "delete_post",
            Self::DeleteThread(_) => "delete_thread",
            Self::ChangeThreadCategory { .. } => "change_thread_category",
            Self::CreatePost { .. } => "create_post",
            Self::EditPost { .. } => "edit_post",
            Self::EditThread { .. } => "edit_thread",
        }
    }

    fn target_id(&self) -> u64 {
        match self {
            Self::DeletePost(id)
            | Self::EditPost { post_id: id, .. }
            | Self::DeleteThread(id)
            | Self::ChangeThreadCategory { thread_id: id, .. }
            | Self::CreatePost { thread_id: id, .. }
            | Self::EditThread { thread_id: id, .. } => *id,
        }
    }

    async fn execute(&self, service: &dyn DiscussionService) -> Result<(), DiscussionsError> {
        match self {
            Self::DeletePost(id) => service.delete_post(*id).await,
            Self::DeleteThread(id) => service.delete_thread(*id).await,
            Self::ChangeThreadCategory {
                thread_id,
                category_id,
            } => {
                service
                    .change_thread_category(*thread_id, *category_id)
                    .await
            }
            Self::CreatePost { thread_id, body } => service.create_post(*thread_id, body).await,
            Self::EditPost { post_id, body } => service.edit_post(*post_id, body).await,
            Self::EditThread { thread_id, edit } => service.edit_thread(*thread_id, edit).await,
        }
    }
}

/// Turns filter matches into moderation calls.
#[derive(Clone)]
pub struct ActionDispatcher {
    service: Arc<dyn DiscussionService>,
    tracker: TaskTracker,
    errors: ErrorSink,
}

impl ActionDispatcher {
    #[must_use]
    pub fn new(
        service: Arc<dyn DiscussionService>,
        tracker: TaskTracker,
        errors: ErrorSink,
    ) -> Self {
        Self {
            service,
            tracker,
            errors,
        }
    }

    /// Apply `filter`'s action to `post`, which matched `rule`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn apply(&self, post: &Post, filter: &Filter, rule: &Rule) -> ActionOutcome {
        info!(
            post_id = post.id,
            thread_id = post.thread_id,
            filter = %filter.name,
            rule = %rule,
            action = %filter.action.kind(),
            "Filter matched"
        );

        let call = match &filter.action {
            Action::Log => return ActionOutcome::performed(),
            Action::Delete => {
                if post.is_reply {
                    RemoteCall::DeletePost(post.id)
                } else {
                    RemoteCall::DeleteThread(post.thread_id)
                }
            }
            Action::Recategorize { target_category_id } => {
                if post.is_reply || post.forum_id == *target_category_id {
                    debug!(post_id = post.id, "Nothing to recategorize");
                    return ActionOutcome::skipped();
                }
                RemoteCall::ChangeThreadCategory {
                    thread_id: post.thread_id,
                    category_id: *target_category_id,
                }
            }
            Action::Reply { message } => {
                if post.is_reply {
                    debug!(post_id = post.id, "Not replying to a reply");
                    return ActionOutcome::skipped();
                }
                RemoteCall::CreatePost {
                    thread_id: post.thread_id,
                    body: message.clone(),
                }
            }
            Action::Edit { content } => {
                let body = match content.resolve(post, &filter.rules) {
                    Ok(body) => body,
                    Err(e) => {
                        warn!(
                            post_id = post.id,
                            filter = %filter.name,
                            "Edit content failed: {e:#}"
                        );
                        return ActionOutcome::failed(DispatchError::EditContent(e));
                    }
                };
                if post.is_reply {
                    RemoteCall::EditPost {
                        post_id: post.id,
                        body,
                    }
                } else {
                    RemoteCall::EditThread {
                        thread_id: post.thread_id,
                        edit: ThreadEdit {
                            body,
                            title: post.title.clone(),
                            post_type: post.post_type.clone(),
                            forum_id: post.forum_id,
                        },
                    }
                }
            }
        };

        self.spawn(call, &filter.name);
        ActionOutcome::performed()
    }

    fn spawn(&self, call: RemoteCall, filter: &str) {
        let service = Arc::clone(&self.service);
        let errors = self.errors.clone();
        let filter = filter.to_string();

        self.tracker.spawn(async move {
            let operation = call.operation();
            let target_id = call.target_id();
            match call.execute(service.as_ref()).await {
                Ok(()) => debug!(operation, target_id, "Moderation action completed"),
                Err(error) => errors.report(RemoteFailure {
                    operation,
                    target_id,
                    filter,
                    error,
                }),
            }
        });
    }
}
