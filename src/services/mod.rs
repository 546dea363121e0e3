//! Service layer for the harvester.
//!
//! - Upstream access (`AuctionClient` behind the `AuctionSource` trait)
//! - Dropdown discovery (`RegionCatalog`)
//! - Statistics and bid page parsing (`StatisticsExtractor`)
//! - Retry policy for network calls (`RetryPolicy`)
//! - Run notices (`Notifier`)

mod catalog;
mod client;
mod extract;
mod notify;
mod retry;

pub use catalog::RegionCatalog;
pub use client::{AuctionClient, AuctionSource, Credentials, LOGIN_ID_VAR, LOGIN_PW_VAR};
pub use extract::{StatisticsExtractor, sanitize_statistics_page};
pub use notify::{LogNotifier, Notifier, WebhookNotifier, notifier_from_config};
pub use retry::RetryPolicy;

#[cfg(test)]
pub(crate) use notify::tests::RecordingNotifier;
