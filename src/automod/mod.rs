//! Filter evaluation, moderation actions and the polling loop.

mod dispatch;
mod engine;
mod filter;
mod notify;
mod poller;
mod report;

pub use dispatch::{ActionDispatcher, ActionOutcome, DispatchError};
pub use engine::evaluate;
pub use filter::{parse_filters, Action, ActionKind, ContentFn, EditContent, Filter, Rule};
pub use notify::{build_embed, post_url, Embed, Notifier, WebhookPayload};
pub use poller::{poll_loop, Automod, Watermark};
pub use report::{log_failures, ErrorSink, RemoteFailure};
