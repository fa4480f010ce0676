//! Filter definitions and loading from TOML.

use std::fmt;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::config::ConfigError;
use crate::discussions::Post;

/// Action kind, without the data each action carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Log,
    Delete,
    Recategorize,
    Reply,
    Edit,
}

impl ActionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Delete => "delete",
            Self::Recategorize => "recategorize",
            Self::Reply => "reply",
            Self::Edit => "edit",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computes replacement content for a post.
pub type ContentFn = dyn Fn(&Post) -> anyhow::Result<String> + Send + Sync;

/// New body for an `edit` action.
#[derive(Clone)]
pub enum EditContent {
    /// Replace the body with a fixed string.
    Static(String),
    /// Replace every match of the filter's rules in the body.
    Redact { replacement: String },
    /// Compute the body from the post.
    Computed(Arc<ContentFn>),
}

impl EditContent {
    /// Build the new body for `post`.
    ///
    /// # Errors
    ///
    /// Returns the computation's error for [`EditContent::Computed`].
    pub fn resolve(&self, post: &Post, rules: &[Rule]) -> anyhow::Result<String> {
        match self {
            Self::Static(content) => Ok(content.clone()),
            Self::Redact { replacement } => Ok(rules.iter().fold(
                post.raw_content.clone(),
                |content, rule| {
                    rule.regex()
                        .replace_all(&content, regex::NoExpand(replacement))
                        .into_owned()
                },
            )),
            Self::Computed(compute) => compute(post),
        }
    }
}

impl fmt::Debug for EditContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(content) => f.debug_tuple("Static").field(content).finish(),
            Self::Redact { replacement } => f
                .debug_struct("Redact")
                .field("replacement", replacement)
                .finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// What to do when a filter matches. Each variant carries the data it needs.
#[derive(Debug, Clone)]
pub enum Action {
    Log,
    Delete,
    Recategorize { target_category_id: u64 },
    Reply { message: String },
    Edit { content: EditContent },
}

impl Action {
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Log => ActionKind::Log,
            Self::Delete => ActionKind::Delete,
            Self::Recategorize { .. } => ActionKind::Recategorize,
            Self::Reply { .. } => ActionKind::Reply,
            Self::Edit { .. } => ActionKind::Edit,
        }
    }
}

/// A pattern tested against post titles and content.
///
/// Accepts either a bare regex or the slash form `/pattern/flags`, where the
/// flags are any of `i`, `m`, `s`, `x` (`g` and `u` are accepted and ignored).
#[derive(Debug, Clone)]
pub struct Rule {
    regex: Regex,
    source: String,
    flags: String,
}

impl Rule {
    /// Compile a rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is not a valid regex.
    pub fn parse(raw: &str) -> Result<Self, regex::Error> {
        let (source, flags) = split_slash_form(raw).unwrap_or((raw, ""));

        let regex = RegexBuilder::new(source)
            .case_insensitive(flags.contains('i'))
            .multi_line(flags.contains('m'))
            .dot_matches_new_line(flags.contains('s'))
            .ignore_whitespace(flags.contains('x'))
            .build()?;

        Ok(Self {
            regex,
            source: source.to_string(),
            flags: flags.to_string(),
        })
    }

    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    #[must_use]
    pub fn regex(&self) -> &Regex {
        &self.regex
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.source, self.flags)
    }
}

fn split_slash_form(raw: &str) -> Option<(&str, &str)> {
    let body = raw.strip_prefix('/')?;
    let end = body.rfind('/')?;
    let (source, flags) = (&body[..end], &body[end + 1..]);
    if source.is_empty() || !flags.chars().all(|c| "gimsux".contains(c)) {
        return None;
    }
    Some((source, flags))
}

/// A named set of rules bound to one action.
#[derive(Debug, Clone)]
pub struct Filter {
    pub name: String,
    pub action: Action,
    /// Tested in order; the first match wins.
    pub rules: Vec<Rule>,
    /// Only posts in these categories are checked, when set.
    pub origin_category_ids: Option<Vec<u64>>,
    /// Authors with a discussions rights badge are exempt.
    pub rights_bypass: bool,
    /// Overrides the default webhook for this filter's notifications.
    pub webhook_url: Option<String>,
    /// Also test thread titles, not just content.
    pub check_title: bool,
}

impl Filter {
    /// Filter with default options: every category, no bypass, titles checked.
    #[must_use]
    pub fn new(name: impl Into<String>, action: Action, rules: Vec<Rule>) -> Self {
        Self {
            name: name.into(),
            action,
            rules,
            origin_category_ids: None,
            rights_bypass: false,
            webhook_url: None,
            check_title: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FiltersFile {
    #[serde(default)]
    filters: Vec<FilterSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FilterSpec {
    name: String,
    action: ActionKind,
    rules: Vec<String>,
    origin_category_ids: Option<Vec<u64>>,
    #[serde(default)]
    rights_bypass: bool,
    webhook_url: Option<String>,
    check_title: Option<bool>,
    target_category_id: Option<u64>,
    reply_message: Option<String>,
    edit_content: Option<String>,
    edit_redact_with: Option<String>,
}

impl TryFrom<FilterSpec> for Filter {
    type Error = ConfigError;

    fn try_from(spec: FilterSpec) -> Result<Self, Self::Error> {
        let missing = |field: &'static str| ConfigError::MissingFilterField {
            filter: spec.name.clone(),
            field,
            action: spec.action.to_string(),
        };

        let action = match spec.action {
            ActionKind::Log => Action::Log,
            ActionKind::Delete => Action::Delete,
            ActionKind::Recategorize => Action::Recategorize {
                target_category_id: spec
                    .target_category_id
                    .ok_or_else(|| missing("target_category_id"))?,
            },
            ActionKind::Reply => Action::Reply {
                message: spec
                    .reply_message
                    .clone()
                    .filter(|m| !m.is_empty())
                    .ok_or_else(|| missing("reply_message"))?,
            },
            ActionKind::Edit => {
                let content = match (&spec.edit_content, &spec.edit_redact_with) {
                    (Some(_), Some(_)) => {
                        return Err(ConfigError::InvalidFilter {
                            filter: spec.name.clone(),
                            message: "set only one of edit_content and edit_redact_with"
                                .to_string(),
                        })
                    }
                    (Some(content), None) => EditContent::Static(content.clone()),
                    (None, Some(replacement)) => EditContent::Redact {
                        replacement: replacement.clone(),
                    },
                    (None, None) => return Err(missing("edit_content")),
                };
                Action::Edit { content }
            }
        };

        if spec.rules.is_empty() {
            return Err(ConfigError::InvalidFilter {
                filter: spec.name.clone(),
                message: "at least one rule is required".to_string(),
            });
        }

        let rules = spec
            .rules
            .iter()
            .map(|raw| {
                Rule::parse(raw).map_err(|e| ConfigError::InvalidRule {
                    filter: spec.name.clone(),
                    rule: raw.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: spec.name,
            action,
            rules,
            origin_category_ids: spec.origin_category_ids,
            rights_bypass: spec.rights_bypass,
            webhook_url: spec.webhook_url.filter(|u| !u.is_empty()),
            check_title: spec.check_title.unwrap_or(true),
        })
    }
}

/// Parse a filters file.
///
/// # Errors
///
/// Returns an error if the TOML is malformed, an action is missing its
/// required field, or a rule does not compile.
pub fn parse_filters(raw: &str) -> Result<Vec<Filter>, ConfigError> {
    let file: FiltersFile = toml::from_str(raw)?;
    file.filters.into_iter().map(Filter::try_from).collect()
}
