use crate::config::Config;
use crate::dedup::{self, audit_counts};
use crate::error::Result;
use crate::fetch::{PageResult, PageSource, SodaPageSource};
use crate::join;
use crate::sink::{self, AuditSink};
use crate::transform::{self, TransformRules};
use crate::types::{Dataset, Table};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument, warn};

pub const AUDIT_CSV: &str = "crash_duplicates.csv";
pub const MERGED_CSV: &str = "crash_vehicle_merged.csv";
pub const FINAL_CSV: &str = "final_collision_data.csv";

/// Per-dataset outcome of the fetch/reconcile stage.
#[derive(Debug)]
pub struct DatasetSummary {
    pub dataset: &'static str,
    pub pages: usize,
    pub rows: usize,
    pub duplicates: usize,
    /// Set when a transport failure ended this dataset's fetch loop early;
    /// the rows accumulated up to that point still flow downstream.
    pub transport_error: Option<String>,
}

/// Outcome of a full pipeline run.
#[derive(Debug)]
pub struct RunResult {
    pub datasets: Vec<DatasetSummary>,
    pub joined_rows: usize,
    pub output_file: PathBuf,
}

pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn output_dir(&self) -> &Path {
        Path::new(&self.config.output_dir)
    }

    /// Full run: fetch+reconcile all three datasets, write raw CSVs,
    /// transform, write transformed CSVs, join, write merged and final CSVs.
    pub async fn run(&self) -> Result<RunResult> {
        let client = reqwest::Client::new();
        let sources = Dataset::all().map(|dataset| {
            Box::new(SodaPageSource::new(
                client.clone(),
                self.config.source_url(dataset),
            )) as Box<dyn PageSource>
        });
        self.run_with_sources(sources).await
    }

    /// Same as [`run`](Self::run) but with caller-supplied page sources (in
    /// crash, vehicle, person order), so the whole pipeline can be exercised
    /// without a network.
    pub async fn run_with_sources(&self, sources: [Box<dyn PageSource>; 3]) -> Result<RunResult> {
        let out = self.output_dir();
        fs::create_dir_all(out)?;

        let mut audit = AuditSink::new(out.join(AUDIT_CSV), Dataset::Crash.columns());
        let mut summaries = Vec::new();
        let mut transformed = Vec::new();

        for (dataset, source) in Dataset::all().into_iter().zip(&sources) {
            info!("🎬 Starting scrape for {}...", dataset.name());
            let audit_sink = (dataset == Dataset::Crash).then_some(&mut audit);
            let (table, summary) = self
                .ingest_dataset(dataset, source.as_ref(), audit_sink)
                .await?;
            info!("✅ Completed scrape for {}.", dataset.name());

            sink::write_table_csv(&table, &out.join(dataset.raw_csv_name()))?;

            let normalized = transform::apply(&TransformRules::for_dataset(dataset), &table);
            sink::write_table_csv(&normalized, &out.join(dataset.transformed_csv_name()))?;

            summaries.push(summary);
            transformed.push(normalized);
        }

        let [crash, vehicle, person] = match <[Table; 3]>::try_from(transformed) {
            Ok(tables) => tables,
            Err(_) => unreachable!("one table per dataset"),
        };

        info!("Joining crash and vehicle data...");
        let merged = join::left_join_crash_vehicle(&crash, &vehicle)?;
        sink::write_table_csv(&merged, &out.join(MERGED_CSV))?;

        info!("Joining person data...");
        let joined = join::left_join_person(&merged, &person)?;
        let output_file = out.join(FINAL_CSV);
        sink::write_table_csv(&joined, &output_file)?;

        info!(
            "✅ Pipeline complete: {} joined rows -> {}",
            joined.len(),
            output_file.display()
        );
        Ok(RunResult {
            datasets: summaries,
            joined_rows: joined.len(),
            output_file,
        })
    }

    /// Fetch+reconcile a single dataset and write its raw CSV only. The
    /// crash dataset still streams its duplicate audit.
    pub async fn run_fetch(&self, dataset: Dataset) -> Result<DatasetSummary> {
        let out = self.output_dir();
        fs::create_dir_all(out)?;

        let client = reqwest::Client::new();
        let source = SodaPageSource::new(client, self.config.source_url(dataset));

        let mut audit = AuditSink::new(out.join(AUDIT_CSV), Dataset::Crash.columns());
        let audit_sink = (dataset == Dataset::Crash).then_some(&mut audit);
        let (table, summary) = self.ingest_dataset(dataset, &source, audit_sink).await?;
        sink::write_table_csv(&table, &out.join(dataset.raw_csv_name()))?;
        Ok(summary)
    }

    /// Paginate a source to exhaustion, reconciling each batch into the
    /// accumulation. An empty page terminates normally; a transport failure
    /// ends this dataset only, and partial accumulation is still returned.
    #[instrument(skip(self, source, audit), fields(dataset = dataset.name()))]
    pub async fn ingest_dataset(
        &self,
        dataset: Dataset,
        source: &dyn PageSource,
        mut audit: Option<&mut AuditSink>,
    ) -> Result<(Table, DatasetSummary)> {
        let limit = self.config.page_limit;
        let policy = dataset.policy();

        let mut table = Table::new(dataset.columns());
        let mut offset = 0u64;
        let mut pages = 0usize;
        let mut duplicates = 0usize;
        let mut transport_error = None;

        loop {
            info!("Record range: {} to {}", offset, offset + limit);
            match source.fetch_page(offset, limit).await {
                Ok(PageResult::Empty) => {
                    info!("No more data to fetch.");
                    break;
                }
                Ok(PageResult::Batch(rows)) => {
                    info!("Fetched {} records.", rows.len());
                    let (next, audits) = dedup::reconcile(table, &rows, policy)?;
                    table = next;

                    if !audits.is_empty() {
                        let (within, overlap) = audit_counts(&audits);
                        info!(
                            "Duplicates this batch: {} (within={}, overlap={})",
                            audits.len(),
                            within,
                            overlap
                        );
                        duplicates += audits.len();
                        if let Some(sink) = audit.as_deref_mut() {
                            sink.append(&audits)?;
                        }
                    }

                    pages += 1;
                    offset += limit;
                    tokio::time::sleep(Duration::from_millis(self.config.delay_ms)).await;
                }
                Err(e) => {
                    warn!(
                        "Fetch failed for {}: {}. Keeping {} accumulated rows.",
                        dataset.name(),
                        e,
                        table.len()
                    );
                    transport_error = Some(e.to_string());
                    break;
                }
            }
        }

        let summary = DatasetSummary {
            dataset: dataset.name(),
            pages,
            rows: table.len(),
            duplicates,
            transport_error,
        };
        Ok((table, summary))
    }
}
