// Core structs: Offer, Seller, error taxonomy
use chrono::DateTime;
use chrono_tz::Tz;

/// Civil timezone all timestamps are normalized to before comparison or display.
pub const STORE_TZ: Tz = chrono_tz::Europe::Warsaw;

/// Sentinel for listing parameters absent from the source data.
pub const UNKNOWN: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seller {
    Company,
    Private,
}

impl Seller {
    pub fn from_business_flag(business: bool) -> Self {
        if business { Seller::Company } else { Seller::Private }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Seller::Company => "company",
            Seller::Private => "private",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "company" => Seller::Company,
            _ => Seller::Private,
        }
    }
}

/// One normalized classified listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Offer {
    pub id: i64,
    pub url: String,
    pub title: String,
    /// HTML-stripped, whitespace-collapsed.
    pub description: String,
    pub promoted: bool,
    /// Comma-joined promotion labels, or `UNKNOWN` when none are active.
    pub promotion_option: String,
    pub created_time: DateTime<Tz>,
    pub last_refresh_time: DateTime<Tz>,
    pub mark: String,
    /// Kept as raw text; the price filter coerces it to a number.
    pub price: String,
    pub previous_price: String,
    pub currency: String,
    pub negotiable: String,
    pub condition: String,
    pub city: String,
    pub district: Option<String>,
    pub region: String,
    pub latitude: f64,
    pub longitude: f64,
    pub seller: Seller,
    pub photo_url: Option<String>,
    pub delivery: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {name}: {reason}")]
    InvalidVar { name: &'static str, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("page {page} returned status {status}")]
    Status { page: u32, status: u16 },
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Permanent rejection by the SMTP server (bad credentials, policy).
    /// Never retried; aborts the remaining sends of the run.
    #[error("smtp rejected the send permanently: {0}")]
    Auth(String),
    /// Transport-level failure worth retrying.
    #[error("transient smtp failure: {0}")]
    Transient(String),
    #[error("could not build message: {0}")]
    Message(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}
