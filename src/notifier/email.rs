//! Subject/body rendering for offer notifications.

use crate::model::{Offer, Seller, UNKNOWN};

pub fn render_subject(offer: &Offer) -> String {
    format!("New Offer: {}", offer.title)
}

pub fn render_body(offer: &Offer) -> String {
    let previous_price = if offer.previous_price == UNKNOWN {
        String::new()
    } else {
        format!(" | Wcześniej: {} {}", offer.previous_price, offer.currency)
    };
    let district_info = offer
        .district
        .as_deref()
        .map(|d| format!(" {d}"))
        .unwrap_or_default();

    format!(
        "Tytuł: {title}\n\
         Opis: {description}\n\
         \n\
         Cena: {price} {currency}{previous_price}\n\
         Lokalizacja: {city}{district_info}, {region}\n\
         Stan: {condition}\n\
         URL: {url}\n\
         Wysyłka OLX: {delivery}\n\
         Sprzedawca: {seller}\n\
         Data dodania: {created_time}\n",
        title = offer.title,
        description = offer.description,
        price = offer.price,
        currency = offer.currency,
        city = offer.city,
        region = offer.region,
        condition = condition_label(&offer.condition),
        url = offer.url,
        delivery = if offer.delivery { "Tak" } else { "Nie" },
        seller = seller_label(offer.seller),
        created_time = offer.created_time.format("%Y-%m-%d %H:%M:%S"),
    )
}

fn condition_label(condition: &str) -> &'static str {
    match condition {
        "new" => "Nowy",
        "used" => "Używany",
        _ => "Uszkodzony",
    }
}

fn seller_label(seller: Seller) -> &'static str {
    match seller {
        Seller::Company => "Firma",
        Seller::Private => "Prywatny",
    }
}
