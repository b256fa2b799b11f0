//! External feeds polled on a schedule and submitted as query events.

mod poller;
mod source;
mod types;

pub use poller::{FeedPoller, PollReport, SEEN_ID_CAPACITY};
pub use source::{build_source, FeedSource, FileFeed, HttpJsonFeed};
pub use types::{FeedConfig, FeedError, FeedItem, FeedRetry, FeedSourceConfig, FEED_SOURCE_TYPE};
