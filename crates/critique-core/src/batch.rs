//! CSV batch experiments.
//!
//! Each input row is `case_id, user turn 1, user turn 2, …`. For every row the
//! runner picks a run count and an experiment request from [`BatchConfig`],
//! then replays the user turns through the pipeline once per run. Output rows
//! are `case_id, run, user1, model1, ref1, user2, …`, padded to the longest
//! case.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::BatchConfig;
use crate::domain::{ConversationHistory, RebuttalResult};
use crate::error::{CritiqueError, Result};
use crate::factory::PipelineFactory;
use crate::resolver::ExperimentRequest;

/// One non-blank input row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCase {
    pub case_id: String,
    /// Positional key `row{n}`, counted over every row after the header.
    pub alias: String,
    pub turns: Vec<String>,
}

/// What a finished batch produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub cases: usize,
    pub runs: usize,
    pub output: Option<PathBuf>,
}

pub struct BatchRunner<'a> {
    factory: &'a PipelineFactory,
    config: BatchConfig,
}

impl<'a> BatchRunner<'a> {
    pub fn new(factory: &'a PipelineFactory, config: BatchConfig) -> Self {
        Self { factory, config }
    }

    /// Run every case from `input` and write the results to `output`.
    ///
    /// An input with no usable rows writes nothing and reports zero cases.
    pub async fn run(&self, input: &Path, output: &Path) -> Result<BatchReport> {
        let cases = load_cases(input, self.config.has_header)?;
        if cases.is_empty() {
            warn!(input = %input.display(), "no runnable rows in batch input");
            return Ok(BatchReport::default());
        }

        let max_turns = cases.iter().map(|c| c.turns.len()).max().unwrap_or(0);
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(output)?;
        writer.write_record(header(max_turns))?;

        let total = cases.len();
        let mut runs_done = 0;
        for (index, case) in cases.iter().enumerate() {
            let (runs, request) = self.plan(case);
            for run in 1..=runs {
                info!(
                    row = index + 1,
                    rows = total,
                    case_id = %case.case_id,
                    run,
                    runs,
                    "running batch case"
                );
                let replies = self.play(case, &request).await?;
                writer.write_record(output_row(case, run, &replies, max_turns))?;
                runs_done += 1;
            }
        }
        writer.flush()?;

        Ok(BatchReport {
            cases: total,
            runs: runs_done,
            output: Some(output.to_path_buf()),
        })
    }

    fn plan(&self, case: &BatchCase) -> (u32, ExperimentRequest) {
        let row = self.config.row(&case.case_id, &case.alias);
        let runs = row
            .and_then(|r| r.runs)
            .unwrap_or(self.config.default_runs)
            .max(1);
        let request = row
            .and_then(|r| r.version.clone())
            .unwrap_or_else(|| self.config.default_version.clone());
        (runs, request)
    }

    async fn play(
        &self,
        case: &BatchCase,
        request: &ExperimentRequest,
    ) -> Result<Vec<RebuttalResult>> {
        let pipeline = self.factory.get_or_build(request).await?;
        let mut history = ConversationHistory::new();
        let mut replies = Vec::with_capacity(case.turns.len());
        for turn in &case.turns {
            history.push_user(turn.as_str());
            let reply = pipeline.call(&history).await?;
            history.push_assistant(reply.text.as_str());
            replies.push(reply);
        }
        Ok(replies)
    }
}

/// Read the input CSV. Blank rows are skipped but still advance the `rowN`
/// numbering.
pub fn load_cases(path: &Path, has_header: bool) -> Result<Vec<BatchCase>> {
    if !path.exists() {
        return Err(CritiqueError::Batch(format!(
            "input CSV not found: {}",
            path.display()
        )));
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut cases = Vec::new();
    for (position, record) in reader.records().enumerate().skip(usize::from(has_header)) {
        let record = record?;
        let cells: Vec<&str> = record.iter().map(str::trim).collect();
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        let alias = format!("row{}", position + 1 - usize::from(has_header));
        let case_id = match cells.first() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => alias.clone(),
        };
        let turns = cells
            .iter()
            .skip(1)
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string())
            .collect();
        cases.push(BatchCase {
            case_id,
            alias,
            turns,
        });
    }
    Ok(cases)
}

fn header(max_turns: usize) -> Vec<String> {
    let mut header = vec!["case_id".to_string(), "run".to_string()];
    for i in 1..=max_turns {
        header.push(format!("user{i}"));
        header.push(format!("model{i}"));
        header.push(format!("ref{i}"));
    }
    header
}

fn output_row(
    case: &BatchCase,
    run: u32,
    replies: &[RebuttalResult],
    max_turns: usize,
) -> Vec<String> {
    let mut row = vec![case.case_id.clone(), run.to_string()];
    for i in 0..max_turns {
        row.push(case.turns.get(i).cloned().unwrap_or_default());
        match replies.get(i) {
            Some(reply) => {
                row.push(reply.text.clone());
                row.push(reply.references_line());
            }
            None => {
                row.push(String::new());
                row.push(String::new());
            }
        }
    }
    row
}
