//! CSV backups: a rolling snapshot of each run's filtered batch and a dated
//! file of newly inserted rows. Both are best-effort; failures are logged by
//! the caller and never abort the pipeline.

use crate::model::{BackupError, Offer};
use chrono::DateTime;
use chrono_tz::Tz;
use std::fs;
use std::path::{Path, PathBuf};

const SNAPSHOT_FILE: &str = "olx_offers.csv";

const HEADER: [&str; 22] = [
    "id",
    "url",
    "title",
    "description",
    "promoted",
    "promotion_option",
    "created_time",
    "last_refresh_time",
    "mark",
    "price",
    "previous_price",
    "currency",
    "negotiable",
    "condition",
    "city",
    "district",
    "region",
    "latitude",
    "longitude",
    "seller",
    "photo_url",
    "delivery",
];

/// Overwrites the rolling snapshot of the current run's filtered batch.
pub fn write_snapshot(data_dir: &Path, offers: &[Offer]) -> Result<PathBuf, BackupError> {
    fs::create_dir_all(data_dir)?;
    let path = data_dir.join(SNAPSHOT_FILE);
    write_csv(&path, offers)?;
    Ok(path)
}

/// Writes the newly inserted rows under `YYYY/MM/DD/new_offers_<timestamp>.csv`.
pub fn write_new_offers(
    data_dir: &Path,
    offers: &[Offer],
    now: DateTime<Tz>,
) -> Result<PathBuf, BackupError> {
    let folder = data_dir.join(now.format("%Y/%m/%d").to_string());
    fs::create_dir_all(&folder)?;
    let path = folder.join(format!("new_offers_{}.csv", now.format("%Y-%m-%d_%H-%M-%S")));
    write_csv(&path, offers)?;
    Ok(path)
}

fn write_csv(path: &Path, offers: &[Offer]) -> Result<(), BackupError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(HEADER)?;
    for offer in offers {
        writer.write_record([
            offer.id.to_string(),
            offer.url.clone(),
            offer.title.clone(),
            offer.description.clone(),
            offer.promoted.to_string(),
            offer.promotion_option.clone(),
            offer.created_time.to_rfc3339(),
            offer.last_refresh_time.to_rfc3339(),
            offer.mark.clone(),
            offer.price.clone(),
            offer.previous_price.clone(),
            offer.currency.clone(),
            offer.negotiable.clone(),
            offer.condition.clone(),
            offer.city.clone(),
            offer.district.clone().unwrap_or_default(),
            offer.region.clone(),
            offer.latitude.to_string(),
            offer.longitude.to_string(),
            offer.seller.as_str().to_string(),
            offer.photo_url.clone().unwrap_or_default(),
            offer.delivery.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
