//! Personal birding record-keeping on top of eBird and BirdReport.
//!
//! * [`EBirdClient`] keeps an eBird web session alive (cached cookies, CAS
//!   login when they expire) and scrapes checklist pages.
//! * [`ledger`] mirrors the checklist history into a local CSV and notes file.
//! * [`media`] bulk-uploads photos to a checklist.
//! * [`birdreport`] copies a checklist into a BirdReport report.
//! * [`merge`] folds the Avibase regional checklist into the species table.

pub mod birdreport;
pub mod client;
pub mod config;
pub mod convert;
pub mod error;
pub mod headers;
pub mod http;
pub mod ledger;
pub mod login;
pub mod media;
pub mod merge;
pub mod multipart;
pub mod parsing;
pub mod request;
pub mod retry;
pub mod session;
pub mod species;
pub mod types;
pub mod web_session;

pub use birdreport::{BirdReportSync, SyncOutcome};
pub use client::EBirdClient;
pub use config::{BirdReportConfig, BirdReportCredentials, CredentialStore, Credentials, EBirdConfig};
pub use convert::ConvertedChecklist;
pub use error::SyncError;
pub use http::HttpSession;
pub use ledger::{ChecklistLedger, LedgerRow};
pub use media::{MediaUploader, UploadSummary};
pub use request::{PageResponse, RequestSpec};
pub use retry::RetryPolicy;
pub use session::{CookieJar, SessionState};
pub use species::SpeciesLibrary;
pub use types::{
    AvibaseSpecies, ChecklistDetail, ChecklistSummary, Observation, SpeciesRecord, UploadPolicy,
};
pub use web_session::WebSession;

#[cfg(feature = "mock")]
pub use web_session::MockWebSession;

// Re-export scraper types for testing
pub use scraper::Html;

pub type Result<T> = std::result::Result<T, SyncError>;
