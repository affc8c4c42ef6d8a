pub mod olx;
pub mod traits;

pub use olx::OlxFetcher;
pub use traits::Fetcher;

/// Fixed page size of the listing API; offsets are multiples of this.
pub const PAGE_SIZE: u32 = 40;
