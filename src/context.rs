use tracing::info;

use crate::aggregate::{aggregate, AggregateOptions, AggregateReport};
use crate::batch::{BatchOptionsBuilder, BatchOutcome, BatchScraper};
use crate::error::{Result, ScrapeError};
use crate::fetch::{PageFetcher, DEFAULT_SESSION, DEFAULT_YEAR};
use crate::progress::Progress;
use crate::record::StudentRecord;
use crate::roll;

/// Where the roll numbers of a scrape come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollSource {
    /// A specification such as `100001-100005,103683`.
    Spec(String),
    /// Ids already known, e.g. read from an uploaded table.
    Ids(Vec<u64>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeRequest {
    pub rolls: RollSource,
    pub session: u32,
    pub year: u32,
    pub workers: usize,
}

impl ScrapeRequest {
    pub fn new(rolls: RollSource) -> Self {
        Self {
            rolls,
            session: DEFAULT_SESSION,
            year: DEFAULT_YEAR,
            workers: 1,
        }
    }
}

/// State carried between the steps of a run. The caller owns it; each step
/// reads what it needs and replaces what it produces.
#[derive(Debug, Default)]
pub struct PipelineContext {
    pub options: AggregateOptions,
    pub request: Option<ScrapeRequest>,
    pub outcome: Option<BatchOutcome>,
    pub report: Option<AggregateReport>,
}

impl PipelineContext {
    pub fn new(options: AggregateOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    /// Scrape the request's roll numbers. A malformed specification fails
    /// here and leaves the previous outcome untouched.
    pub async fn scrape<F>(
        &mut self,
        fetcher: F,
        request: ScrapeRequest,
        progress: &mut dyn Progress,
    ) -> Result<&BatchOutcome>
    where
        F: PageFetcher + Send + Sync + 'static,
    {
        let rolls = match &request.rolls {
            RollSource::Spec(spec) => roll::expand(spec)?,
            RollSource::Ids(ids) => ids.clone(),
        };
        let options = BatchOptionsBuilder::default()
            .session(request.session)
            .year(request.year)
            .workers(request.workers)
            .build()
            .map_err(|e| ScrapeError::Config(e.to_string()))?;

        info!(
            rolls = rolls.len(),
            session = request.session,
            year = request.year,
            "starting scrape"
        );
        let outcome = BatchScraper::new(fetcher, options)
            .scrape_rolls(&rolls, progress)
            .await;

        self.request = Some(request);
        self.report = None;
        Ok(self.outcome.insert(outcome))
    }

    /// Replace the working set with previously exported records.
    pub fn load(&mut self, records: Vec<StudentRecord>) {
        self.request = None;
        self.report = None;
        self.outcome = Some(BatchOutcome {
            attempted: records.len(),
            records,
            ..Default::default()
        });
    }

    pub fn records(&self) -> &[StudentRecord] {
        self.outcome
            .as_ref()
            .map(|o| o.records.as_slice())
            .unwrap_or_default()
    }

    /// Recompute the report from the current records.
    pub fn analyze(&mut self) -> &AggregateReport {
        let report = aggregate(self.records(), self.options);
        self.report.insert(report)
    }
}
