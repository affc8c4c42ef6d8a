//! Maps raw OLX API listings into [`Offer`] records.
//!
//! Normalization is pure and total: missing optional fields fall back to
//! sentinels or `None`, never to an error.

use crate::model::{Offer, STORE_TZ, Seller, UNKNOWN};
use chrono::DateTime;
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::Value;

/// Pattern OLX appends to photo links so clients can pick a size.
const PHOTO_SIZE_TEMPLATE: &str = ";s={width}x{height}";

#[derive(Debug, Deserialize)]
pub struct RawPage {
    #[serde(default)]
    pub data: Vec<RawOffer>,
}

#[derive(Debug, Deserialize)]
pub struct RawOffer {
    pub id: i64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub promotion: Option<RawPromotion>,
    #[serde(default)]
    pub partner: Option<RawPartner>,
    #[serde(default)]
    pub params: Vec<RawParam>,
    #[serde(default)]
    pub business: bool,
    #[serde(default)]
    pub created_time: String,
    #[serde(default)]
    pub last_refresh_time: String,
    pub location: RawLocation,
    pub map: RawMapPoint,
    #[serde(default)]
    pub photos: Vec<RawPhoto>,
    #[serde(default)]
    pub delivery: Option<RawDelivery>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawPromotion {
    #[serde(default)]
    pub highlighted: bool,
    #[serde(default)]
    pub urgent: bool,
    #[serde(default)]
    pub top_ad: bool,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawPartner {
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawParam {
    pub key: String,
    #[serde(default)]
    pub value: RawParamValue,
}

/// Parameter values are polymorphic on the wire: `brand`/`state` carry a
/// `key`, `price` carries value/previous_value/currency/negotiable.
#[derive(Debug, Default, Deserialize)]
pub struct RawParamValue {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub previous_value: Option<Value>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub negotiable: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct RawLocation {
    pub city: RawNamed,
    #[serde(default)]
    pub district: Option<RawNamed>,
    pub region: RawNamed,
}

#[derive(Debug, Deserialize)]
pub struct RawNamed {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RawMapPoint {
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lon: f64,
}

#[derive(Debug, Deserialize)]
pub struct RawPhoto {
    #[serde(default)]
    pub link: String,
}

#[derive(Debug, Deserialize)]
pub struct RawDelivery {
    #[serde(default)]
    pub rock: Option<RawRock>,
}

#[derive(Debug, Deserialize)]
pub struct RawRock {
    #[serde(default)]
    pub active: bool,
}

pub fn normalize_page(page: RawPage) -> Vec<Offer> {
    page.data.into_iter().map(normalize).collect()
}

pub fn normalize(raw: RawOffer) -> Offer {
    let mut mark = UNKNOWN.to_string();
    let mut price = UNKNOWN.to_string();
    let mut previous_price = UNKNOWN.to_string();
    let mut currency = UNKNOWN.to_string();
    let mut negotiable = UNKNOWN.to_string();
    let mut condition = UNKNOWN.to_string();

    for param in &raw.params {
        match param.key.as_str() {
            "brand" => {
                if let Some(key) = &param.value.key {
                    mark = key.clone();
                }
            }
            "price" => {
                if let Some(v) = &param.value.value {
                    price = scalar_to_string(v);
                }
                if let Some(v) = &param.value.previous_value {
                    previous_price = scalar_to_string(v);
                }
                if let Some(c) = &param.value.currency {
                    currency = c.clone();
                }
                if let Some(n) = param.value.negotiable {
                    negotiable = n.to_string();
                }
            }
            "state" => {
                if let Some(key) = &param.value.key {
                    condition = key.clone();
                }
            }
            _ => {}
        }
    }

    let mut promoted = false;
    let mut promotion_labels: Vec<String> = Vec::new();
    if let Some(promotion) = &raw.promotion {
        promoted = promotion.highlighted || promotion.urgent || promotion.top_ad;
        promotion_labels = promotion.options.clone();
    }
    if raw.partner.as_ref().and_then(|p| p.code.as_deref()) == Some("otomoto_pl_form") {
        promotion_labels.push("otomoto".to_string());
    }
    let promotion_option = if promotion_labels.is_empty() {
        UNKNOWN.to_string()
    } else {
        promotion_labels.join(",")
    };

    let photo_url = raw.photos.first().map(|p| strip_size_template(&p.link));
    let delivery = raw
        .delivery
        .and_then(|d| d.rock)
        .map(|r| r.active)
        .unwrap_or(false);

    Offer {
        id: raw.id,
        url: raw.url,
        title: raw.title,
        description: clean_text(&raw.description),
        promoted,
        promotion_option,
        created_time: parse_time(&raw.created_time),
        last_refresh_time: parse_time(&raw.last_refresh_time),
        mark,
        price,
        previous_price,
        currency,
        negotiable,
        condition,
        city: raw.location.city.name,
        district: raw.location.district.map(|d| d.name),
        region: raw.location.region.name,
        latitude: raw.map.lat,
        longitude: raw.map.lon,
        seller: Seller::from_business_flag(raw.business),
        photo_url,
        delivery,
    }
}

/// Strips HTML tags and collapses all whitespace runs to single spaces.
pub fn clean_text(text: &str) -> String {
    let fragment = scraper::Html::parse_fragment(text);
    let stripped: String = fragment
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_size_template(link: &str) -> String {
    link.strip_suffix(PHOTO_SIZE_TEMPLATE).unwrap_or(link).to_string()
}

/// Unparseable timestamps normalize to the epoch and age out in the
/// recency filter instead of failing the whole page.
fn parse_time(raw: &str) -> DateTime<Tz> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&STORE_TZ))
        .unwrap_or_else(|_| DateTime::<chrono::Utc>::UNIX_EPOCH.with_timezone(&STORE_TZ))
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => UNKNOWN.to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
