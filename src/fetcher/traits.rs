use crate::model::FetchError;
use crate::normalizer::RawPage;

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Retrieves one page of raw listings. No retry: a failed page is
    /// simply missing data for this run.
    async fn fetch(&self, page_index: u32) -> Result<RawPage, FetchError>;
}
