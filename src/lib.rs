//! Subreddit-to-chat joke relay.
//!
//! [`feed`] turns a syndication feed into emoji-decorated messages,
//! [`delivery`] sends them to a chat backend, and [`poller`] ties the two
//! together on a schedule while keeping the "last delivered" watermark honest.

pub mod config;
pub mod delivery;
pub mod feed;
pub mod poller;
