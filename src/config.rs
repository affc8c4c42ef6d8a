use crate::model::ConfigError;
use std::env;
use std::path::PathBuf;

const DEFAULT_URL: &str = "https://www.olx.pl/api/v1/offers/";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Number of listing pages fetched per run.
    pub iterations: u32,
    pub url: String,
    pub user_agent: String,
    pub category_id: String,
    pub filter_refiners: Option<String>,
    pub sl: Option<String>,
    pub include_keywords: Vec<String>,
    pub exclude_keywords: Vec<String>,
    pub max_price: f64,
    pub sender_email: String,
    pub sender_password: String,
    pub recipient_emails: Vec<String>,
    pub smtp_host: String,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
}

impl AppConfig {
    /// Reads and validates the whole configuration once, at startup.
    pub fn load() -> Result<AppConfig, ConfigError> {
        let iterations: u32 = parse_var("CONFIG_ITERATIONS", 5)?;
        if iterations == 0 {
            return Err(ConfigError::InvalidVar {
                name: "CONFIG_ITERATIONS",
                reason: "must be at least 1".into(),
            });
        }

        let max_price: f64 = parse_var("CONFIG_MAX_PRICE", 500.0)?;
        if !max_price.is_finite() || max_price < 0.0 {
            return Err(ConfigError::InvalidVar {
                name: "CONFIG_MAX_PRICE",
                reason: "must be a non-negative number".into(),
            });
        }

        let sender_email = require_var("SENDER_EMAIL")?;
        if !is_valid_email(&sender_email) {
            return Err(ConfigError::InvalidVar {
                name: "SENDER_EMAIL",
                reason: "not a valid email address".into(),
            });
        }

        let sender_password = require_var("SENDER_PASSWORD")?;

        let recipient_emails = parse_keywords(&require_var("RECIPIENT_EMAIL")?);
        if recipient_emails.is_empty() {
            return Err(ConfigError::InvalidVar {
                name: "RECIPIENT_EMAIL",
                reason: "at least one recipient is required".into(),
            });
        }
        for recipient in &recipient_emails {
            if !is_valid_email(recipient) {
                return Err(ConfigError::InvalidVar {
                    name: "RECIPIENT_EMAIL",
                    reason: format!("{recipient:?} is not a valid email address"),
                });
            }
        }

        Ok(AppConfig {
            iterations,
            url: var_or("CONFIG_URL", DEFAULT_URL),
            user_agent: var_or("CONFIG_HEADERS_USER_AGENT", DEFAULT_USER_AGENT),
            category_id: var_or("CONFIG_QUERY_PARAMS_CATEGORY_ID", "2225"),
            filter_refiners: env::var("CONFIG_QUERY_PARAMS_FILTER_REFINERS").ok(),
            sl: env::var("CONFIG_QUERY_PARAMS_SL").ok(),
            include_keywords: parse_keywords(&var_or("CONFIG_FILTER_INCLUDE_KEYWORDS", "")),
            exclude_keywords: parse_keywords(&var_or("CONFIG_FILTER_EXCLUDE_KEYWORDS", "")),
            max_price,
            sender_email,
            sender_password,
            recipient_emails,
            smtp_host: var_or("SMTP_HOST", "smtp.gmail.com"),
            data_dir: PathBuf::from(var_or("DATA_DIR", "data")),
            database_path: PathBuf::from(var_or("DATABASE_PATH", "database/offers.db")),
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn require_var(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(name)),
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidVar {
            name,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Splits a comma-separated list, dropping empty entries so that an unset
/// variable yields an empty set rather than a set containing "".
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn is_valid_email(addr: &str) -> bool {
    let Some((local, domain)) = addr.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !addr.contains(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_split_and_trim() {
        assert_eq!(parse_keywords("ekspres, kawa ,młynek"), vec!["ekspres", "kawa", "młynek"]);
    }

    #[test]
    fn empty_keyword_list_stays_empty() {
        assert!(parse_keywords("").is_empty());
        assert!(parse_keywords(" , ,").is_empty());
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("user.name+tag@example.com"));
        assert!(!is_valid_email("no-at-sign.example.com"));
        assert!(!is_valid_email("user@nodot"));
        assert!(!is_valid_email("user@.example.com"));
        assert!(!is_valid_email("user name@example.com"));
    }
}
