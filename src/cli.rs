use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::aggregate::{subject_group, AggregateOptions, BucketScheme, UnknownStatus, SUBJECT_GROUPS};
use crate::context::{PipelineContext, RollSource, ScrapeRequest};
use crate::export;
use crate::fetch::{
    FetchConfigBuilder, HttpFetcher, UrlStyle, DEFAULT_ENDPOINT, DEFAULT_SESSION,
    DEFAULT_USER_AGENT, DEFAULT_YEAR,
};
use crate::harvest;
use crate::progress::Progress;
use crate::report::MarkdownReport;
use crate::roll;

#[derive(Debug, Parser)]
#[command(name = "result-scrape", version, about = "Scrape exam result pages and summarise them")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch result pages for a set of roll numbers and export them
    Scrape(ScrapeArgs),
    /// Summarise previously exported results
    Analyze(AnalyzeArgs),
    /// Print the roll numbers found in an OCR result or text file
    Harvest(HarvestArgs),
}

#[derive(Debug, Args)]
pub struct ScrapeArgs {
    /// Roll numbers, e.g. "103683,124861" or "100001-100005"
    #[arg(
        short = 'p',
        long,
        required_unless_present = "from_table",
        conflicts_with = "from_table"
    )]
    pub rolls: Option<String>,
    /// CSV or JSON table with a `roll_number` or `Roll No` column
    #[arg(long, value_name = "FILE")]
    pub from_table: Option<PathBuf>,
    /// Exam session code
    #[arg(short = 'q', long, default_value_t = DEFAULT_SESSION)]
    pub session: u32,
    /// Exam year
    #[arg(short = 'r', long, default_value_t = DEFAULT_YEAR)]
    pub year: u32,
    /// Concurrent fetches; 1 fetches strictly one after another
    #[arg(short, long, default_value_t = 1)]
    pub workers: usize,
    /// JSON export
    #[arg(short, long, default_value = "results.json")]
    pub out: PathBuf,
    /// Also write a CSV table, one student per row
    #[arg(long, value_name = "FILE")]
    pub csv: Option<PathBuf>,
    /// Also write a flat CSV, one subject per row
    #[arg(long, value_name = "FILE")]
    pub flat: Option<PathBuf>,
    /// Also write a markdown summary of the scraped results
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
    #[command(flatten)]
    pub fetch: FetchArgs,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    #[arg(long, env = "RESULT_SCRAPE_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
    /// Send parameters as a query (`query`) or written into the URL (`inline`)
    #[arg(long, default_value_t = UrlStyle::Query)]
    pub url_style: UrlStyle,
    #[arg(long, env = "RESULT_SCRAPE_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,
    #[arg(long)]
    pub referer: Option<String>,
    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// A `.json` export or a `.csv` table
    #[arg(required_unless_present = "list_groups")]
    pub input: Option<PathBuf>,
    /// Score ranges: `fine` (95+, 90-94, ...) or `coarse` (90+, 80-89, ...)
    #[arg(long, default_value_t = BucketScheme::Fine)]
    pub buckets: BucketScheme,
    /// How to tally statuses other than PASS and RE-APPEAR: `count` or `ignore`
    #[arg(long, default_value_t = UnknownStatus::Count)]
    pub unknown_status: UnknownStatus,
    /// Compare the subjects of a predefined group
    #[arg(long)]
    pub group: Option<String>,
    /// List the predefined subject groups and exit
    #[arg(long)]
    pub list_groups: bool,
    /// Write a markdown summary
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
    /// Print the full aggregate as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct HarvestArgs {
    /// OCR result (`.json` with a `markdown` field) or plain text
    pub input: PathBuf,
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Scrape(args) => scrape(args).await,
        Command::Analyze(args) => analyze(args),
        Command::Harvest(args) => harvest(args),
    }
}

async fn scrape(args: ScrapeArgs) -> Result<()> {
    let rolls = match (&args.rolls, &args.from_table) {
        (Some(spec), _) => {
            roll::validate(spec)?;
            RollSource::Spec(spec.clone())
        }
        (None, Some(path)) => RollSource::Ids(
            export::roll_ids_from_table(path)
                .with_context(|| format!("reading roll numbers from {}", path.display()))?,
        ),
        (None, None) => bail!("either --rolls or --from-table is required"),
    };

    let config = FetchConfigBuilder::default()
        .endpoint(args.fetch.endpoint.clone())
        .url_style(args.fetch.url_style)
        .user_agent(args.fetch.user_agent.clone())
        .referer(args.fetch.referer.clone())
        .timeout_secs(args.fetch.timeout)
        .build()?;
    let fetcher = HttpFetcher::new(config)?;

    let request = ScrapeRequest {
        rolls,
        session: args.session,
        year: args.year,
        workers: args.workers,
    };
    let mut ctx = PipelineContext::default();
    let mut progress = ConsoleProgress::default();
    let outcome = ctx.scrape(fetcher, request, &mut progress).await?;

    println!("{} of {} succeeded", outcome.succeeded(), outcome.attempted);
    for failure in &outcome.failures {
        println!("  failed    {}: {}", failure.roll, failure.reason);
    }
    for discarded in &outcome.discarded {
        println!("  discarded {}: {}", discarded.roll, discarded.reason);
    }

    write_exports(ctx.records(), &args)?;
    if let Some(path) = &args.report {
        let report = ctx.analyze();
        write_report(&MarkdownReport::new(report), path)?;
    }
    Ok(())
}

fn write_exports(records: &[crate::record::StudentRecord], args: &ScrapeArgs) -> Result<()> {
    export::write_json(records, &args.out)
        .with_context(|| format!("writing {}", args.out.display()))?;
    info!(path = %args.out.display(), records = records.len(), "saved results");

    if let Some(path) = &args.csv {
        let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
        export::write_table(records, file)?;
    }
    if let Some(path) = &args.flat {
        let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
        export::write_flat(records, file)?;
    }
    Ok(())
}

fn analyze(args: AnalyzeArgs) -> Result<()> {
    if args.list_groups {
        for (name, subjects) in SUBJECT_GROUPS {
            println!("{name}: {}", subjects.join(", "));
        }
        return Ok(());
    }
    let input = args
        .input
        .as_deref()
        .ok_or_else(|| anyhow!("an input file is required"))?;
    let group = match &args.group {
        Some(name) => Some((
            name.as_str(),
            subject_group(name)
                .ok_or_else(|| anyhow!("unknown subject group '{name}', see --list-groups"))?,
        )),
        None => None,
    };

    let records = export::load_records(input)
        .with_context(|| format!("loading {}", input.display()))?;
    let mut ctx = PipelineContext::new(AggregateOptions {
        scheme: args.buckets,
        unknown_status: args.unknown_status,
    });
    ctx.load(records);
    let report = ctx.analyze();

    if args.json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print_summary(report);
    }

    let spreads = group.map(|(name, subjects)| (name, report.group_spread(subjects)));
    if let Some((name, spreads)) = &spreads {
        if spreads.is_empty() {
            println!("No data for subject group '{name}'");
        }
        for s in spreads {
            println!(
                "{:<24} n={:<4} mean={:>6.1} min={:>3} q1={:>6.1} median={:>6.1} q3={:>6.1} max={:>3}",
                s.subject, s.count, s.mean, s.min, s.q1, s.median, s.q3, s.max
            );
        }
    }

    if let Some(path) = &args.report {
        let mut md = MarkdownReport::new(report);
        if let Some((name, spreads)) = &spreads {
            md = md.with_group(name, spreads);
        }
        write_report(&md, path)?;
    }
    Ok(())
}

fn print_summary(report: &crate::aggregate::AggregateReport) {
    let overview = report.overview();
    println!("Total students:   {}", overview.total_students);
    println!("Passed students:  {}", overview.passed);
    println!("Pass percentage:  {:.1}%", overview.pass_percent);
    for status in &report.ignored_statuses {
        println!("Ignored status:   {} ({})", status.label, status.count);
    }
    println!();
    println!("Average scores by subject:");
    for avg in &report.subject_averages {
        println!("  {:<24} {:>6.1}", avg.subject, avg.average);
    }
}

fn harvest(args: HarvestArgs) -> Result<()> {
    let rolls = harvest::harvest_file(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    info!(count = rolls.len(), "harvested roll numbers");
    println!("{}", roll::to_spec(&rolls));
    Ok(())
}

fn write_report(report: &MarkdownReport, path: &Path) -> Result<()> {
    fs::write(path, report.to_markdown()?).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "report generated");
    Ok(())
}

/// Logs every roll number as it completes.
#[derive(Default)]
struct ConsoleProgress {
    total: usize,
    done: usize,
}

impl Progress for ConsoleProgress {
    fn begin(&mut self, total: usize) {
        self.total = total;
    }

    fn item_done(&mut self, roll: u64, fraction: f64) {
        self.done += 1;
        info!(
            "fetched roll number {roll} ({}/{}, {:.0}%)",
            self.done,
            self.total,
            fraction * 100.0
        );
    }

    fn finish(&mut self) {
        info!("scraping complete");
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_should_be_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn scrape_args_should_parse() {
        let cli = Cli::try_parse_from([
            "result-scrape",
            "scrape",
            "-p",
            "100-102",
            "-q",
            "1",
            "--url-style",
            "inline",
            "--workers",
            "4",
        ])
        .unwrap();
        let Command::Scrape(args) = cli.command else {
            panic!("expected scrape");
        };
        assert_eq!(args.rolls.as_deref(), Some("100-102"));
        assert_eq!(args.session, 1);
        assert_eq!(args.year, 2025);
        assert_eq!(args.workers, 4);
        assert_eq!(args.fetch.url_style, UrlStyle::Inline);
        assert_eq!(args.out, PathBuf::from("results.json"));
    }

    #[test]
    fn scrape_needs_a_roll_source() {
        assert!(Cli::try_parse_from(["result-scrape", "scrape"]).is_err());
        assert!(Cli::try_parse_from([
            "result-scrape",
            "scrape",
            "-p",
            "1",
            "--from-table",
            "rolls.csv"
        ])
        .is_err());
    }

    #[test]
    fn analyze_args_should_parse() {
        let cli = Cli::try_parse_from([
            "result-scrape",
            "analyze",
            "results.json",
            "--buckets",
            "coarse",
            "--unknown-status",
            "ignore",
        ])
        .unwrap();
        let Command::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.buckets, BucketScheme::Coarse);
        assert_eq!(args.unknown_status, UnknownStatus::Ignore);
        assert!(Cli::try_parse_from(["result-scrape", "analyze", "--list-groups"]).is_ok());
    }
}
