use thiserror::Error;

use prospekt_scraper::LocatorError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Locator(#[from] LocatorError),

    #[error("confidence threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f32),

    /// Every page of the flyer failed; a partial success is never reported this way.
    #[error("no page of {retailer} flyer {ordinal} could be processed ({pages} attempted)")]
    FlyerUnprocessable {
        retailer: String,
        ordinal: usize,
        pages: usize,
    },

    #[error("flyer lookup did not finish within {0}s")]
    Timeout(u64),
}
