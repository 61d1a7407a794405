use thiserror::Error;

use prospekt_scraper::ScraperError;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("extraction request failed: {0}")]
    Request(#[from] ScraperError),

    #[error("extraction response carried no text")]
    EmptyResponse,

    #[error("could not parse extraction response: {0}")]
    Parse(String),

    #[error("could not crop page image: {0}")]
    Crop(String),
}
