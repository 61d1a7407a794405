pub mod app_config;
pub mod config;
pub mod detection;
pub mod flyer;
pub mod retailers;

pub use app_config::{AppConfig, Device, Environment, ExtractorSettings, RuntimeKind};
pub use config::{load_app_config, load_app_config_from_env};
pub use detection::{
    BoundingBox, DetectionBox, ExtractedProduct, FailureStage, FlyerResult, FlyerSummary,
    PageFailure, PageOutcome, PageResult, ProductExtraction, ProductGroup,
};
pub use flyer::{FlyerListing, FlyerPage, FlyerReference, PageLocator, ValidityWindow};
pub use retailers::{load_retailers, ListingFormat, RetailerRegistry, RetailerSource};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for environment variable {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read retailers file {path}: {source}")]
    RetailersFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse retailers file: {0}")]
    RetailersFileParse(#[source] serde_yaml::Error),

    #[error("retailer configuration invalid: {0}")]
    Validation(String),
}
