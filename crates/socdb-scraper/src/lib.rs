pub mod apify;
pub mod collector;
pub mod error;
pub mod media;
pub mod notify;
mod payload;
mod rate_limit;

pub use apify::ApifyClient;
pub use collector::{retain_in_interval, Collect, CollectorRegistry};
pub use error::ScraperError;
pub use media::{media_extension, DownloadReport, MediaDownloader};
pub use notify::{notifier_from_url, DiscordNotifier, NoopNotifier, Notify};
