/*!
Core modules of the assembly announcer
*/

pub mod announcer;
pub mod config;
pub mod feed;
pub mod mastodon;
pub mod notifications;
pub mod status;
pub mod tracker;
