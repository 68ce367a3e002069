use std::sync::Arc;

use derive_builder::Builder;
use serde::Serialize;
use strum::Display;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::{Result, ScrapeError};
use crate::extract::extract;
use crate::fetch::{PageFetcher, DEFAULT_SESSION, DEFAULT_YEAR};
use crate::progress::Progress;
use crate::record::StudentRecord;
use crate::roll;

#[derive(Debug, Clone, Builder)]
pub struct BatchOptions {
    #[builder(default = "DEFAULT_SESSION")]
    session: u32,
    #[builder(default = "DEFAULT_YEAR")]
    year: u32,
    /// Concurrent fetches. 1 keeps the strictly sequential behavior.
    #[builder(default = "1")]
    workers: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            session: DEFAULT_SESSION,
            year: DEFAULT_YEAR,
            workers: 1,
        }
    }
}

/// Why a page that was fetched and parsed still produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DiscardReason {
    /// Nothing on the page looked like a result; usually "no such student".
    NoStudent,
    /// Some result fields were found but not the roll number; the page
    /// layout probably changed.
    MissingRollNo,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub roll: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Discarded {
    pub roll: u64,
    pub reason: DiscardReason,
}

/// Everything a batch produced, in fetch order.
#[derive(Debug, Default, Clone, Serialize)]
pub struct BatchOutcome {
    pub attempted: usize,
    pub records: Vec<StudentRecord>,
    pub failures: Vec<ItemFailure>,
    pub discarded: Vec<Discarded>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> usize {
        self.records.len()
    }
}

enum Item {
    Record(StudentRecord),
    Discarded(DiscardReason),
    Failed(ScrapeError),
}

#[derive(Debug)]
pub struct BatchScraper<F> {
    fetcher: Arc<F>,
    options: BatchOptions,
}

impl<F> BatchScraper<F>
where
    F: PageFetcher + Send + Sync + 'static,
{
    pub fn new(fetcher: F, options: BatchOptions) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            options,
        }
    }

    /// Expand `spec` and scrape every roll number in it. A malformed spec
    /// fails before anything is fetched; failures of single roll numbers
    /// are collected in the outcome instead.
    pub async fn scrape_all(
        &self,
        spec: &str,
        progress: &mut dyn Progress,
    ) -> Result<BatchOutcome> {
        let rolls = roll::expand(spec)?;
        Ok(self.scrape_rolls(&rolls, progress).await)
    }

    pub async fn scrape_rolls(&self, rolls: &[u64], progress: &mut dyn Progress) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            attempted: rolls.len(),
            ..Default::default()
        };
        progress.begin(rolls.len());

        if self.options.workers <= 1 {
            for (idx, &roll) in rolls.iter().enumerate() {
                let item = scrape_one(self.fetcher.as_ref(), roll, &self.options).await;
                record_item(&mut outcome, progress, roll, item, idx + 1);
            }
        } else {
            let permits = Arc::new(Semaphore::new(self.options.workers));
            let mut handles = vec![];
            for &roll in rolls {
                let fetcher = Arc::clone(&self.fetcher);
                let permits = Arc::clone(&permits);
                let options = self.options.clone();
                let handle = tokio::spawn(async move {
                    let _permit = permits.acquire_owned().await.ok();
                    scrape_one(fetcher.as_ref(), roll, &options).await
                });
                handles.push((roll, handle));
            }

            // Awaiting in spawn order keeps the output in roll order.
            for (idx, (roll, handle)) in handles.into_iter().enumerate() {
                let item = handle
                    .await
                    .unwrap_or_else(|e| Item::Failed(ScrapeError::transport(roll, e)));
                record_item(&mut outcome, progress, roll, item, idx + 1);
            }
        }

        progress.finish();
        info!(
            succeeded = outcome.succeeded(),
            attempted = outcome.attempted,
            failed = outcome.failures.len(),
            discarded = outcome.discarded.len(),
            "batch complete"
        );
        outcome
    }
}

async fn scrape_one<F: PageFetcher>(fetcher: &F, roll: u64, options: &BatchOptions) -> Item {
    let page = match fetcher.fetch(roll, options.session, options.year).await {
        Ok(page) => page,
        Err(e) => return Item::Failed(e),
    };
    match extract(&page) {
        Ok(record) if record.is_valid() => Item::Record(record),
        Ok(record) if record.is_blank() => Item::Discarded(DiscardReason::NoStudent),
        Ok(_) => Item::Discarded(DiscardReason::MissingRollNo),
        Err(e) => Item::Failed(e),
    }
}

fn record_item(
    outcome: &mut BatchOutcome,
    progress: &mut dyn Progress,
    roll: u64,
    item: Item,
    processed: usize,
) {
    match item {
        Item::Record(record) => {
            debug!(roll, name = %record.student_name, "parsed result");
            outcome.records.push(record);
        }
        Item::Discarded(reason) => {
            debug!(roll, %reason, "page has no usable result");
            outcome.discarded.push(Discarded { roll, reason });
        }
        Item::Failed(e) => {
            warn!(roll, error = %e, "failed to scrape roll number");
            let reason = e.to_string();
            progress.item_failed(roll, &reason);
            outcome.failures.push(ItemFailure { roll, reason });
        }
    }
    progress.item_done(roll, processed as f64 / outcome.attempted as f64);
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::progress::NullProgress;

    struct StubFetcher {
        pages: HashMap<u64, String>,
        calls: Mutex<Vec<(u64, u32, u32)>>,
    }

    impl StubFetcher {
        fn new() -> Self {
            let mut pages = HashMap::new();
            pages.insert(100, fs::read_to_string("fixtures/result_100.html").unwrap());
            pages.insert(102, fs::read_to_string("fixtures/result_102.html").unwrap());
            pages.insert(103, fs::read_to_string("fixtures/not_found.html").unwrap());
            pages.insert(
                104,
                "<p>Status</p><p>PASS</p><table><tr><th>Subject</th></tr></table>".into(),
            );
            Self {
                pages,
                calls: Mutex::new(vec![]),
            }
        }
    }

    impl PageFetcher for StubFetcher {
        async fn fetch(&self, roll: u64, session: u32, year: u32) -> Result<String> {
            self.calls.lock().unwrap().push((roll, session, year));
            // Earlier rolls answer later so the pool has to reorder.
            tokio::time::sleep(Duration::from_millis(200u64.saturating_sub(roll))).await;
            self.pages
                .get(&roll)
                .cloned()
                .ok_or_else(|| ScrapeError::transport(roll, "HTTP 500 Internal Server Error"))
        }
    }

    #[derive(Default)]
    struct Recorder {
        total: usize,
        fractions: Vec<f64>,
        failed: Vec<u64>,
        finished: bool,
    }

    impl Progress for Recorder {
        fn begin(&mut self, total: usize) {
            self.total = total;
        }
        fn item_done(&mut self, _roll: u64, fraction: f64) {
            self.fractions.push(fraction);
        }
        fn item_failed(&mut self, roll: u64, _reason: &str) {
            self.failed.push(roll);
        }
        fn finish(&mut self) {
            self.finished = true;
        }
    }

    fn rolls_of(outcome: &BatchOutcome) -> Vec<&str> {
        outcome.records.iter().map(|r| r.roll_no.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn scrape_all_should_skip_failures() {
        let scraper = BatchScraper::new(StubFetcher::new(), BatchOptions::default());
        let mut progress = Recorder::default();
        let outcome = scraper.scrape_all("100-102", &mut progress).await.unwrap();

        assert_eq!(rolls_of(&outcome), ["100", "102"]);
        assert_eq!(outcome.attempted, 3);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].roll, 101);
        assert!(outcome.failures[0].reason.contains("HTTP 500"));

        assert_eq!(progress.total, 3);
        assert_eq!(progress.fractions, [1.0 / 3.0, 2.0 / 3.0, 1.0]);
        assert_eq!(progress.failed, [101]);
        assert!(progress.finished);

        let calls = scraper.fetcher.calls.lock().unwrap().clone();
        assert_eq!(calls, [(100, 2, 2025), (101, 2, 2025), (102, 2, 2025)]);
    }

    #[tokio::test(start_paused = true)]
    async fn discards_should_be_typed() {
        let scraper = BatchScraper::new(StubFetcher::new(), BatchOptions::default());
        let outcome = scraper.scrape_all("103,104", &mut NullProgress).await.unwrap();

        assert!(outcome.records.is_empty());
        assert!(outcome.failures.is_empty());
        let reasons: Vec<_> = outcome.discarded.iter().map(|d| (d.roll, d.reason)).collect();
        assert_eq!(
            reasons,
            [(103, DiscardReason::NoStudent), (104, DiscardReason::MissingRollNo)]
        );
        assert_eq!(DiscardReason::MissingRollNo.to_string(), "missing-roll-no");
    }

    #[tokio::test(start_paused = true)]
    async fn worker_pool_should_preserve_order() {
        let options = BatchOptionsBuilder::default()
            .workers(4usize)
            .session(1u32)
            .year(2024u32)
            .build()
            .unwrap();
        let scraper = BatchScraper::new(StubFetcher::new(), options);
        let mut progress = Recorder::default();
        let outcome = scraper
            .scrape_all("102,100-101,100", &mut progress)
            .await
            .unwrap();

        assert_eq!(rolls_of(&outcome), ["102", "100", "100"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(progress.fractions.last(), Some(&1.0));
        assert!(progress.fractions.windows(2).all(|w| w[0] < w[1]));
        assert!(scraper
            .fetcher
            .calls
            .lock()
            .unwrap()
            .iter()
            .all(|&(_, q, r)| q == 1 && r == 2024));
    }

    #[tokio::test]
    async fn malformed_spec_should_fail_before_fetching() {
        let scraper = BatchScraper::new(StubFetcher::new(), BatchOptions::default());
        let err = scraper.scrape_all("100,x-2", &mut NullProgress).await.unwrap_err();
        assert!(matches!(err, ScrapeError::MalformedRange { .. }));
        assert!(scraper.fetcher.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_expansion_should_finish_cleanly() {
        let scraper = BatchScraper::new(StubFetcher::new(), BatchOptions::default());
        let mut progress = Recorder::default();
        let outcome = scraper.scrape_all("9-1", &mut progress).await.unwrap();
        assert_eq!(outcome.attempted, 0);
        assert!(progress.fractions.is_empty());
        assert!(progress.finished);
    }
}
