pub mod aggregate;
pub mod batch;
pub mod cli;
pub mod context;
pub mod error;
pub mod export;
pub mod extract;
pub mod fetch;
pub mod harvest;
pub mod progress;
pub mod record;
pub mod report;
pub mod roll;

pub use aggregate::{aggregate, AggregateOptions, AggregateReport, BucketScheme, UnknownStatus};
pub use batch::{BatchOptions, BatchOutcome, BatchScraper, DiscardReason};
pub use context::{PipelineContext, RollSource, ScrapeRequest};
pub use error::{Result, ScrapeError};
pub use extract::{extract, HtmlTree, MarkupTree};
pub use fetch::{FetchConfig, HttpFetcher, PageFetcher, UrlStyle};
pub use record::{StudentRecord, SubjectRecord};
