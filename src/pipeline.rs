//! Sequences one full ingestion run: fetch, normalize, filter, reconcile
//! against the store, back up, maintain, notify.

use crate::backup;
use crate::config::AppConfig;
use crate::fetcher::{Fetcher, OlxFetcher};
use crate::filter::{self, FilterCriteria};
use crate::model::{FetchError, NotifyError, Offer, STORE_TZ, StorageError};
use crate::normalizer;
use crate::notifier::{EmailNotifier, LettreMailer, RetryPolicy};
use crate::storage::SqliteStorage;
use chrono::Utc;
use tracing::{error, info, warn};

/// Errors that abort the run. Everything else is logged and recovered
/// from in place.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub pages_fetched: u32,
    pub pages_failed: u32,
    pub fetched: usize,
    pub filtered: usize,
    pub new_offers: usize,
    pub notified: usize,
}

pub async fn run(config: &AppConfig) -> Result<RunReport, PipelineError> {
    let fetcher = OlxFetcher::new(config)?;
    let mailer = LettreMailer::new(
        &config.smtp_host,
        &config.sender_email,
        &config.sender_password,
    )?;
    let notifier = EmailNotifier::new(
        Box::new(mailer),
        config.recipient_emails.clone(),
        RetryPolicy::default(),
    );
    run_with(config, &fetcher, &notifier).await
}

pub(crate) async fn run_with(
    config: &AppConfig,
    fetcher: &dyn Fetcher,
    notifier: &EmailNotifier,
) -> Result<RunReport, PipelineError> {
    let mut report = RunReport::default();
    let mut batch: Vec<Offer> = Vec::new();

    // Highest offset first: newest listings come back last in the loop
    // but the sort stage fixes the final order anyway.
    for page in (0..config.iterations).rev() {
        match fetcher.fetch(page).await {
            Ok(raw) => {
                report.pages_fetched += 1;
                batch.extend(normalizer::normalize_page(raw));
            }
            Err(e) => {
                warn!(page, error = %e, "page fetch failed, continuing without it");
                report.pages_failed += 1;
            }
        }
    }
    report.fetched = batch.len();
    info!(
        offers = report.fetched,
        failed_pages = report.pages_failed,
        "fetch stage done"
    );

    let now = Utc::now().with_timezone(&STORE_TZ);
    let criteria = FilterCriteria::new(
        &config.include_keywords,
        &config.exclude_keywords,
        config.max_price,
    );
    let filtered = filter::apply(batch, &criteria, now);
    report.filtered = filtered.len();

    match backup::write_snapshot(&config.data_dir, &filtered) {
        Ok(path) => info!(path = %path.display(), "snapshot written"),
        Err(e) => warn!(error = %e, "snapshot write failed"),
    }

    let storage = SqliteStorage::new(config.database_path.clone());
    let new_offers = match reconcile(&storage, filtered) {
        Ok(new_offers) => new_offers,
        Err(e) => {
            error!(error = %e, "store reconciliation failed, skipping insert");
            Vec::new()
        }
    };
    report.new_offers = new_offers.len();

    if !new_offers.is_empty() {
        match backup::write_new_offers(&config.data_dir, &new_offers, now) {
            Ok(path) => info!(path = %path.display(), "new offers exported"),
            Err(e) => warn!(error = %e, "new offers export failed"),
        }
    }

    match storage.purge_duplicates() {
        Ok(0) => {}
        Ok(removed) => warn!(removed, "purged duplicated ids from the store"),
        Err(e) => error!(error = %e, "duplicate purge failed, skipping"),
    }
    if let Err(e) = storage.resort_by_created_time() {
        error!(error = %e, "store re-sort failed, skipping");
    }

    if new_offers.is_empty() {
        info!("no new offers, no emails sent");
    } else {
        report.notified = notifier.notify_all(&new_offers).await?;
    }

    Ok(report)
}

/// Computes the set difference against the persisted ids and appends only
/// previously-unseen rows. On the very first run the table is created from
/// the whole batch and nothing is reported as new, so nothing is notified.
fn reconcile(storage: &SqliteStorage, filtered: Vec<Offer>) -> Result<Vec<Offer>, StorageError> {
    if !storage.table_exists()? {
        storage.insert_all(&filtered)?;
        info!(rows = filtered.len(), "offers table created on first run");
        return Ok(Vec::new());
    }

    let existing = storage.existing_ids()?;
    let new_offers: Vec<Offer> = filtered
        .into_iter()
        .filter(|o| !existing.contains(&o.id))
        .collect();
    if !new_offers.is_empty() {
        storage.append_new(&new_offers)?;
    }
    Ok(new_offers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Seller, UNKNOWN};
    use crate::normalizer::RawPage;
    use crate::notifier::{MailSender, OutgoingMail};
    use chrono::{DateTime, Duration};
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn offer(id: i64) -> Offer {
        let created = (Utc::now() - Duration::days(1)).with_timezone(&STORE_TZ);
        Offer {
            id,
            url: format!("https://www.olx.pl/d/oferta/{id}"),
            title: format!("Ekspres {id}"),
            description: "Opis".to_string(),
            promoted: false,
            promotion_option: UNKNOWN.to_string(),
            created_time: created,
            last_refresh_time: created,
            mark: UNKNOWN.to_string(),
            price: "300".to_string(),
            previous_price: UNKNOWN.to_string(),
            currency: "PLN".to_string(),
            negotiable: UNKNOWN.to_string(),
            condition: "used".to_string(),
            city: "Warszawa".to_string(),
            district: None,
            region: "Mazowieckie".to_string(),
            latitude: 52.23,
            longitude: 21.01,
            seller: Seller::Private,
            photo_url: None,
            delivery: false,
        }
    }

    #[test]
    fn first_run_creates_table_and_reports_nothing_new() {
        let dir = TempDir::new().unwrap();
        let storage = SqliteStorage::new(dir.path().join("offers.db"));

        let new_offers = reconcile(&storage, vec![offer(1), offer(2)]).unwrap();

        assert!(new_offers.is_empty());
        assert_eq!(storage.select_all().unwrap().len(), 2);
    }

    #[test]
    fn reconcile_appends_only_unseen_ids() {
        let dir = TempDir::new().unwrap();
        let storage = SqliteStorage::new(dir.path().join("offers.db"));
        storage.insert_all(&[offer(1), offer(2)]).unwrap();

        let new_offers = reconcile(&storage, vec![offer(2), offer(3)]).unwrap();

        assert_eq!(new_offers.iter().map(|o| o.id).collect::<Vec<_>>(), vec![3]);
        let ids: Vec<i64> = storage.select_all().unwrap().iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    struct PageFetcher {
        page: Value,
    }

    #[async_trait::async_trait]
    impl Fetcher for PageFetcher {
        async fn fetch(&self, _page_index: u32) -> Result<RawPage, FetchError> {
            Ok(serde_json::from_value(self.page.clone()).unwrap())
        }
    }

    struct RecordingSender {
        sent: Arc<Mutex<Vec<OutgoingMail>>>,
    }

    #[async_trait::async_trait]
    impl MailSender for RecordingSender {
        async fn send(&self, mail: &OutgoingMail) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(mail.clone());
            Ok(())
        }
    }

    fn raw_listing(id: i64, title: &str, created: DateTime<chrono_tz::Tz>) -> Value {
        json!({
            "id": id,
            "url": format!("https://www.olx.pl/d/oferta/{id}"),
            "title": title,
            "description": "Opis",
            "params": [
                {"key": "price", "value": {"value": 300, "currency": "PLN", "negotiable": false}}
            ],
            "business": false,
            "created_time": created.to_rfc3339(),
            "last_refresh_time": created.to_rfc3339(),
            "location": {"city": {"name": "Warszawa"}, "region": {"name": "Mazowieckie"}},
            "map": {"lat": 52.23, "lon": 21.01}
        })
    }

    fn test_config(dir: &TempDir) -> AppConfig {
        AppConfig {
            iterations: 1,
            url: "http://unused.invalid".to_string(),
            user_agent: "test".to_string(),
            category_id: "2225".to_string(),
            filter_refiners: None,
            sl: None,
            include_keywords: vec![],
            exclude_keywords: vec![],
            max_price: 500.0,
            sender_email: "nadawca@example.com".to_string(),
            sender_password: "secret".to_string(),
            recipient_emails: vec!["odbiorca@example.com".to_string()],
            smtp_host: "unused.invalid".to_string(),
            data_dir: dir.path().join("data"),
            database_path: dir.path().join("database/offers.db"),
        }
    }

    /// Store already holds {1,2}; the fetched batch is {2,3,4,4} where 4
    /// appears twice with conflicting titles. Exactly offer 3 is persisted
    /// and exactly one notification goes out.
    #[tokio::test]
    async fn run_persists_and_notifies_only_genuinely_new_offers() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        let storage = SqliteStorage::new(config.database_path.clone());
        storage.insert_all(&[offer(1), offer(2)]).unwrap();

        let created = (Utc::now() - Duration::days(1)).with_timezone(&STORE_TZ);
        let fetcher = PageFetcher {
            page: json!({"data": [
                raw_listing(2, "Ekspres 2", created),
                raw_listing(3, "Ekspres 3", created),
                raw_listing(4, "Ekspres 4", created),
                raw_listing(4, "Ekspres 4 inny tytuł", created),
            ]}),
        };
        let sent = Arc::new(Mutex::new(Vec::new()));
        let notifier = EmailNotifier::new(
            Box::new(RecordingSender { sent: sent.clone() }),
            config.recipient_emails.clone(),
            RetryPolicy::default(),
        );

        let report = run_with(&config, &fetcher, &notifier).await.unwrap();

        assert_eq!(report.fetched, 4);
        assert_eq!(report.filtered, 2); // both copies of 4 dropped
        assert_eq!(report.new_offers, 1);
        assert_eq!(report.notified, 1);

        // The maintenance re-sort reorders by created_time, so compare ids
        // order-independently.
        let mut ids: Vec<i64> = storage.select_all().unwrap().iter().map(|o| o.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3]);

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "New Offer: Ekspres 3");
    }
}
