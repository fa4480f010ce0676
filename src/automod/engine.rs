//! Matching a post against a filter.

use super::filter::{Filter, Rule};
use crate::discussions::Post;

/// Find the rule of `filter` that `post` triggers, if any.
///
/// Rules are tried in order. For each rule the thread title is tested first
/// (only for thread openers, and only when the filter checks titles), then the
/// content; the first hit wins. So rule 0 matching the content beats rule 1
/// matching the title.
#[must_use]
pub fn evaluate<'f>(post: &Post, filter: &'f Filter) -> Option<&'f Rule> {
    if filter.rights_bypass && post.author.has_bypass_badge {
        return None;
    }

    if let Some(origins) = &filter.origin_category_ids {
        if !origins.contains(&post.forum_id) {
            return None;
        }
    }

    let check_title = filter.check_title && !post.is_reply;

    filter.rules.iter().find(|rule| {
        (check_title && rule.is_match(&post.title)) || rule.is_match(&post.raw_content)
    })
}
