//! Durable dedup store of previously seen offers.
//!
//! Every operation opens and closes its own connection. The maintenance
//! passes are idempotent full-table read-rewrites, so a crash between
//! operations leaves the store consistent and re-runnable. `id` is the
//! logical key but deliberately not a SQL primary key: the store-wide
//! purge pass has to be able to see historical duplicates.

use crate::model::{Offer, STORE_TZ, Seller, StorageError};
use chrono::DateTime;
use rusqlite::{Connection, Row, params};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

const CREATE_TABLE_SQL: &str = "
    CREATE TABLE offers (
        id INTEGER NOT NULL,
        url TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        promoted INTEGER NOT NULL,
        promotion_option TEXT NOT NULL,
        created_time TEXT NOT NULL,
        last_refresh_time TEXT NOT NULL,
        mark TEXT NOT NULL,
        price TEXT NOT NULL,
        previous_price TEXT NOT NULL,
        currency TEXT NOT NULL,
        negotiable TEXT NOT NULL,
        condition TEXT NOT NULL,
        city TEXT NOT NULL,
        district TEXT,
        region TEXT NOT NULL,
        latitude REAL NOT NULL,
        longitude REAL NOT NULL,
        seller TEXT NOT NULL,
        photo_url TEXT,
        delivery INTEGER NOT NULL
    );
";

const SELECT_COLUMNS: &str = "id, url, title, description, promoted, promotion_option, \
    created_time, last_refresh_time, mark, price, previous_price, currency, negotiable, \
    condition, city, district, region, latitude, longitude, seller, photo_url, delivery";

pub struct SqliteStorage {
    path: PathBuf,
}

impl SqliteStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn open(&self) -> Result<Connection, StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(Connection::open(&self.path)?)
    }

    pub fn table_exists(&self) -> Result<bool, StorageError> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'offers'")?;
        Ok(stmt.exists([])?)
    }

    /// First-run path: creates the table and writes the whole batch.
    pub fn insert_all(&self, offers: &[Offer]) -> Result<(), StorageError> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        tx.execute_batch(CREATE_TABLE_SQL)?;
        insert_offers(&tx, offers)?;
        tx.commit()?;
        Ok(())
    }

    pub fn existing_ids(&self) -> Result<HashSet<i64>, StorageError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare("SELECT id FROM offers")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    /// Appends rows without touching existing ones.
    pub fn append_new(&self, offers: &[Offer]) -> Result<(), StorageError> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        insert_offers(&tx, offers)?;
        tx.commit()?;
        Ok(())
    }

    pub fn select_all(&self) -> Result<Vec<Offer>, StorageError> {
        let conn = self.open()?;
        read_all(&conn)
    }

    /// Maintenance pass: removes ALL rows of any id that occurs more than
    /// once across the table's history, mirroring the intra-batch policy.
    /// Returns the number of rows removed.
    pub fn purge_duplicates(&self) -> Result<usize, StorageError> {
        let mut conn = self.open()?;
        let offers = read_all(&conn)?;

        let mut counts: HashMap<i64, usize> = HashMap::new();
        for offer in &offers {
            *counts.entry(offer.id).or_insert(0) += 1;
        }
        let unique: Vec<Offer> = offers
            .iter()
            .filter(|o| counts[&o.id] == 1)
            .cloned()
            .collect();
        let removed = offers.len() - unique.len();

        if removed > 0 {
            rewrite(&mut conn, &unique)?;
        }
        Ok(removed)
    }

    /// Maintenance pass: rewrites the table sorted by created_time
    /// descending. Runs on every invocation after the purge.
    pub fn resort_by_created_time(&self) -> Result<(), StorageError> {
        let mut conn = self.open()?;
        let mut offers = read_all(&conn)?;
        offers.sort_by(|a, b| b.created_time.cmp(&a.created_time));
        rewrite(&mut conn, &offers)?;
        Ok(())
    }
}

fn read_all(conn: &Connection) -> Result<Vec<Offer>, StorageError> {
    let mut stmt = conn.prepare(&format!("SELECT {SELECT_COLUMNS} FROM offers"))?;
    let offers = stmt
        .query_map([], map_offer)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(offers)
}

fn rewrite(conn: &mut Connection, offers: &[Offer]) -> Result<(), StorageError> {
    let tx = conn.transaction()?;
    tx.execute("DROP TABLE offers", [])?;
    tx.execute_batch(CREATE_TABLE_SQL)?;
    insert_offers(&tx, offers)?;
    tx.commit()?;
    Ok(())
}

fn insert_offers(conn: &Connection, offers: &[Offer]) -> Result<(), rusqlite::Error> {
    let mut stmt = conn.prepare(
        "INSERT INTO offers (id, url, title, description, promoted, promotion_option, \
         created_time, last_refresh_time, mark, price, previous_price, currency, negotiable, \
         condition, city, district, region, latitude, longitude, seller, photo_url, delivery) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, \
         ?18, ?19, ?20, ?21, ?22)",
    )?;
    for offer in offers {
        stmt.execute(params![
            offer.id,
            offer.url,
            offer.title,
            offer.description,
            offer.promoted,
            offer.promotion_option,
            offer.created_time.to_rfc3339(),
            offer.last_refresh_time.to_rfc3339(),
            offer.mark,
            offer.price,
            offer.previous_price,
            offer.currency,
            offer.negotiable,
            offer.condition,
            offer.city,
            offer.district,
            offer.region,
            offer.latitude,
            offer.longitude,
            offer.seller.as_str(),
            offer.photo_url,
            offer.delivery,
        ])?;
    }
    Ok(())
}

fn map_offer(row: &Row) -> Result<Offer, rusqlite::Error> {
    let created_time = parse_time_column(row, 6)?;
    let last_refresh_time = parse_time_column(row, 7)?;
    let seller: String = row.get(19)?;

    Ok(Offer {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        promoted: row.get(4)?,
        promotion_option: row.get(5)?,
        created_time,
        last_refresh_time,
        mark: row.get(8)?,
        price: row.get(9)?,
        previous_price: row.get(10)?,
        currency: row.get(11)?,
        negotiable: row.get(12)?,
        condition: row.get(13)?,
        city: row.get(14)?,
        district: row.get(15)?,
        region: row.get(16)?,
        latitude: row.get(17)?,
        longitude: row.get(18)?,
        seller: Seller::parse(&seller),
        photo_url: row.get(20)?,
        delivery: row.get(21)?,
    })
}

fn parse_time_column(
    row: &Row,
    index: usize,
) -> Result<chrono::DateTime<chrono_tz::Tz>, rusqlite::Error> {
    let raw: String = row.get(index)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&STORE_TZ))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                index,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UNKNOWN;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn offer(id: i64, age_days: i64) -> Offer {
        let created = (Utc::now() - Duration::days(age_days)).with_timezone(&STORE_TZ);
        Offer {
            id,
            url: format!("https://www.olx.pl/d/oferta/{id}"),
            title: format!("Ekspres {id}"),
            description: "Sprawny ekspres".to_string(),
            promoted: false,
            promotion_option: UNKNOWN.to_string(),
            created_time: created,
            last_refresh_time: created,
            mark: "delonghi".to_string(),
            price: "300".to_string(),
            previous_price: UNKNOWN.to_string(),
            currency: "PLN".to_string(),
            negotiable: "false".to_string(),
            condition: "used".to_string(),
            city: "Gdańsk".to_string(),
            district: Some("Wrzeszcz".to_string()),
            region: "Pomorskie".to_string(),
            latitude: 54.37,
            longitude: 18.61,
            seller: Seller::Private,
            photo_url: Some("https://example.com/img.jpg".to_string()),
            delivery: true,
        }
    }

    fn store(dir: &TempDir) -> SqliteStorage {
        SqliteStorage::new(dir.path().join("offers.db"))
    }

    fn ids(offers: &[Offer]) -> Vec<i64> {
        offers.iter().map(|o| o.id).collect()
    }

    #[test]
    fn table_exists_only_after_first_insert() {
        let dir = TempDir::new().unwrap();
        let storage = store(&dir);
        assert!(!storage.table_exists().unwrap());
        storage.insert_all(&[offer(1, 1)]).unwrap();
        assert!(storage.table_exists().unwrap());
    }

    #[test]
    fn roundtrip_preserves_every_field() {
        let dir = TempDir::new().unwrap();
        let storage = store(&dir);
        let original = offer(42, 2);
        storage.insert_all(std::slice::from_ref(&original)).unwrap();

        let restored = storage.select_all().unwrap();
        assert_eq!(restored, vec![original]);
    }

    #[test]
    fn append_does_not_touch_existing_rows() {
        let dir = TempDir::new().unwrap();
        let storage = store(&dir);
        storage.insert_all(&[offer(1, 3)]).unwrap();
        storage.append_new(&[offer(2, 1)]).unwrap();

        assert_eq!(storage.existing_ids().unwrap(), HashSet::from([1, 2]));
        assert_eq!(ids(&storage.select_all().unwrap()), vec![1, 2]);
    }

    #[test]
    fn purge_removes_all_rows_of_a_duplicated_id() {
        let dir = TempDir::new().unwrap();
        let storage = store(&dir);
        storage.insert_all(&[offer(1, 1), offer(2, 2)]).unwrap();
        // Simulates historical duplication: append bypasses reconciliation.
        storage.append_new(&[offer(2, 2), offer(3, 3)]).unwrap();

        let removed = storage.purge_duplicates().unwrap();
        assert_eq!(removed, 2);
        assert_eq!(ids(&storage.select_all().unwrap()), vec![1, 3]);
    }

    #[test]
    fn resort_orders_by_created_time_descending() {
        let dir = TempDir::new().unwrap();
        let storage = store(&dir);
        storage
            .insert_all(&[offer(1, 5), offer(2, 1), offer(3, 3)])
            .unwrap();

        storage.resort_by_created_time().unwrap();
        assert_eq!(ids(&storage.select_all().unwrap()), vec![2, 3, 1]);
    }

    #[test]
    fn maintenance_passes_are_idempotent_on_a_clean_table() {
        let dir = TempDir::new().unwrap();
        let storage = store(&dir);
        storage
            .insert_all(&[offer(1, 1), offer(2, 2), offer(3, 3)])
            .unwrap();

        storage.purge_duplicates().unwrap();
        storage.resort_by_created_time().unwrap();
        let first = storage.select_all().unwrap();

        assert_eq!(storage.purge_duplicates().unwrap(), 0);
        storage.resort_by_created_time().unwrap();
        let second = storage.select_all().unwrap();

        assert_eq!(first, second);
    }
}
