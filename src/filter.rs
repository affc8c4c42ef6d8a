//! Fixed, ordered filter chain applied to the concatenated batch of one run.
//!
//! Every stage is a pure batch-to-batch transformation; each operates on the
//! survivors of the previous one.

use crate::model::Offer;
use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct FilterCriteria {
    pub include_keywords: Vec<String>,
    pub exclude_keywords: Vec<String>,
    pub max_price: f64,
    pub max_age: Duration,
}

impl FilterCriteria {
    pub fn new(include: &[String], exclude: &[String], max_price: f64) -> Self {
        Self {
            include_keywords: include.iter().map(|k| k.to_lowercase()).collect(),
            exclude_keywords: exclude.iter().map(|k| k.to_lowercase()).collect(),
            max_price,
            max_age: Duration::days(7),
        }
    }
}

pub fn apply(batch: Vec<Offer>, criteria: &FilterCriteria, now: DateTime<Tz>) -> Vec<Offer> {
    let batch = drop_intra_batch_duplicates(batch);
    let batch = retain_matching_keywords(batch, &criteria.include_keywords);
    let batch = drop_matching_keywords(batch, &criteria.exclude_keywords);
    let batch = retain_within_price(batch, criteria.max_price);
    let batch = retain_recent(batch, now, criteria.max_age);
    sort_newest_first(batch)
}

/// Removes every row whose id occurs more than once in the batch.
/// Ambiguous duplicates are dropped entirely, never merged down to one.
pub fn drop_intra_batch_duplicates(batch: Vec<Offer>) -> Vec<Offer> {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for offer in &batch {
        *counts.entry(offer.id).or_insert(0) += 1;
    }
    batch.into_iter().filter(|o| counts[&o.id] == 1).collect()
}

/// Keeps rows whose title or description contains at least one keyword,
/// case-insensitively. An empty keyword set keeps everything.
pub fn retain_matching_keywords(batch: Vec<Offer>, keywords: &[String]) -> Vec<Offer> {
    if keywords.is_empty() {
        return batch;
    }
    batch
        .into_iter()
        .filter(|o| matches_any(o, keywords))
        .collect()
}

/// Drops rows whose title or description contains any keyword. An empty
/// keyword set drops nothing.
pub fn drop_matching_keywords(batch: Vec<Offer>, keywords: &[String]) -> Vec<Offer> {
    if keywords.is_empty() {
        return batch;
    }
    batch
        .into_iter()
        .filter(|o| !matches_any(o, keywords))
        .collect()
}

/// Keeps rows whose price coerces to a non-negative number not above the
/// ceiling; rows with an unparseable price are dropped.
pub fn retain_within_price(batch: Vec<Offer>, max_price: f64) -> Vec<Offer> {
    batch
        .into_iter()
        .filter(|o| match o.price.parse::<f64>() {
            Ok(value) => (0.0..=max_price).contains(&value),
            Err(_) => false,
        })
        .collect()
}

pub fn retain_recent(batch: Vec<Offer>, now: DateTime<Tz>, max_age: Duration) -> Vec<Offer> {
    let cutoff = now - max_age;
    batch
        .into_iter()
        .filter(|o| o.created_time >= cutoff)
        .collect()
}

pub fn sort_newest_first(mut batch: Vec<Offer>) -> Vec<Offer> {
    batch.sort_by(|a, b| b.created_time.cmp(&a.created_time));
    batch
}

fn matches_any(offer: &Offer, lowercase_keywords: &[String]) -> bool {
    let title = offer.title.to_lowercase();
    let description = offer.description.to_lowercase();
    lowercase_keywords
        .iter()
        .any(|k| title.contains(k) || description.contains(k))
}
