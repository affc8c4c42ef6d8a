use super::{Fetcher, PAGE_SIZE};
use crate::config::AppConfig;
use crate::model::FetchError;
use crate::normalizer::RawPage;
use reqwest::Client;

pub struct OlxFetcher {
    client: Client,
    url: String,
    category_id: String,
    filter_refiners: Option<String>,
    sl: Option<String>,
}

impl OlxFetcher {
    pub fn new(config: &AppConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            category_id: config.category_id.clone(),
            filter_refiners: config.filter_refiners.clone(),
            sl: config.sl.clone(),
        })
    }

    fn query_params(&self, page_index: u32) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("offset", (page_index * PAGE_SIZE).to_string()),
            ("limit", PAGE_SIZE.to_string()),
            ("category_id", self.category_id.clone()),
            ("sort_by", "created_at:desc".to_string()),
        ];
        if let Some(refiners) = &self.filter_refiners {
            params.push(("filter_refiners", refiners.clone()));
        }
        if let Some(sl) = &self.sl {
            params.push(("sl", sl.clone()));
        }
        params
    }
}

#[async_trait::async_trait]
impl Fetcher for OlxFetcher {
    async fn fetch(&self, page_index: u32) -> Result<RawPage, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .query(&self.query_params(page_index))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                page: page_index,
                status: status.as_u16(),
            });
        }

        Ok(response.json::<RawPage>().await?)
    }
}
