//! Discussions automoderator library.
//!
//! Polls a Fandom wiki's discussions for new posts, checks them against
//! configured regex filters and deletes, moves, replies to or edits the ones
//! that match, reporting each action to a Discord webhook.

pub mod automod;
pub mod config;
pub mod constants;
pub mod discussions;
