//! Shared constants used across the application.

/// User agent sent with every discussions API request.
pub const AUTOMOD_USER_AGENT: &str = "Automoderator(discussions-automod)";

/// `source` value the discussions front end sends with create/update calls.
pub const POST_SOURCE: &str = "DESKTOP_WEB_FEPO";

/// Default number of posts fetched per poll cycle.
pub const DEFAULT_PAGE_LIMIT: usize = 20;

/// Maximum number of characters of post content included in a notification.
pub const NOTIFICATION_CONTENT_LIMIT: usize = 2000;

/// Placeholder shown in notifications for posts without a body.
pub const EMPTY_CONTENT_PLACEHOLDER: &str = "No Body Content";

/// Embed colours keyed by action kind.
pub mod embed_colour {
    pub const LOG: u32 = 0x0034_98DB;
    pub const DELETE: u32 = 0x00E7_4C3C;
    pub const RECATEGORIZE: u32 = 0x00E6_7E22;
    pub const REPLY: u32 = 0x002E_CC71;
    pub const EDIT: u32 = 0x00F1_C40F;
}
