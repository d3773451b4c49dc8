//! wordscan - WordPress security scanner
//!
//! Fingerprints a target as WordPress, probes it for common exposures,
//! enumerates installed plugins and themes from a slug catalog, and
//! correlates the versions found with the WPScan vulnerability database.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wordscan::{AssetCatalog, MemoryStore, ScanConfig, Scanner};
//!
//! #[tokio::main]
//! async fn main() -> wordscan::Result<()> {
//!     let catalog = AssetCatalog::new(vec!["akismet".into()], vec!["astra".into()]);
//!     let scanner = Scanner::new(ScanConfig::default(), catalog, Arc::new(MemoryStore::new()));
//!     if let Some(job) = scanner.scan("https://example.com").await? {
//!         println!("{}: {} vulnerabilities", job.url, job.vulnerability_count());
//!     }
//!     Ok(())
//! }
//! ```

pub mod assets;
pub mod catalog;
pub mod config;
pub mod detector;
pub mod error;
pub mod http;
pub mod model;
pub mod output;
pub mod pool;
pub mod probes;
pub mod scan;
pub mod store;
pub mod version;
pub mod vulndb;

pub use assets::AssetVersionProber;
pub use catalog::{AssetCatalog, CatalogSources, SyncOutcome};
pub use config::ScanConfig;
pub use detector::{Detector, Fingerprint};
pub use error::{Error, Result};
pub use model::{
    AssetFinding, Exposure, ExposureFlags, JobField, JobSummary, ScanJob, ScanStatus,
    VulnerabilityRecord,
};
pub use output::{OutputConfig, OutputFormat, OutputSort, output_job, output_jobs};
pub use probes::ProbeSuite;
pub use scan::{ScanRun, Scanner, StageOutcome, StartOutcome};
pub use store::{FileStore, JobStore, MemoryStore};
pub use version::{Version, is_still_vulnerable};
pub use vulndb::VulnerabilityClient;
