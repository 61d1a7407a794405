pub mod client;
pub mod error;
pub mod fetcher;
pub mod formats;
mod html;
pub mod locator;
mod retry;

pub use client::HttpClient;
pub use error::ScraperError;
pub use fetcher::{FetchFailureReason, FlyerFetcher, PageFetchFailure, PageFetchResult};
pub use formats::{parser_for, FlyerLink, ListingParser};
pub use locator::{FlyerLocator, LocatorError};
