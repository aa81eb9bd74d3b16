use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;

use crate::error::Result;
use crate::model_client::VisionModel;
use crate::models::{DetailRow, ReceiptImage, Roster, Summary};
use crate::pipeline::{pair_receipts, Progress};
use crate::sink::write_text_files;
use crate::workbook::generate_excel;

pub const TEXT_DIR: &str = "텍스트결과";
pub const WORKBOOK_FILE: &str = "교통비_결과.xlsx";

/// Everything a pairing run needs, owned so it can move to a worker thread.
pub struct Job {
    pub model: Arc<dyn VisionModel>,
    pub roster: Roster,
    pub images: Vec<ReceiptImage>,
    pub out_dir: PathBuf,
    pub template: PathBuf,
}

#[derive(Debug)]
pub struct JobOutcome {
    pub rows: Vec<DetailRow>,
    pub details_path: PathBuf,
    pub summary_path: PathBuf,
    pub workbook_path: PathBuf,
    pub summary: Summary,
}

#[derive(Debug)]
pub enum JobEvent {
    Progress(u8),
    Finished(Result<JobOutcome>),
}

/// Pair, write the text files, then build the workbook from them.
pub fn run_job(job: &Job, progress: &mut Progress) -> Result<JobOutcome> {
    let outcome = pair_receipts(job.model.as_ref(), &job.roster, &job.images, progress);

    let text_dir = job.out_dir.join(TEXT_DIR);
    let paths = write_text_files(&text_dir, &outcome.details, &outcome.summary)?;
    log::info!(
        "{} rows written to {}",
        outcome.details.len(),
        paths.details.display()
    );

    let workbook_path = job.out_dir.join(WORKBOOK_FILE);
    generate_excel(&text_dir, &job.template, &workbook_path, progress)?;

    Ok(JobOutcome {
        rows: outcome.details,
        details_path: paths.details,
        summary_path: paths.summary,
        workbook_path,
        summary: outcome.summary,
    })
}

/// Run a job on a background thread. Progress events may skip values; the
/// last event is always `Finished`.
pub fn spawn_run(job: Job) -> Receiver<JobEvent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let progress_tx = tx.clone();
        let mut progress = Progress::new(move |value| {
            let _ = progress_tx.send(JobEvent::Progress(value));
        });
        let result = run_job(&job, &mut progress);
        let _ = tx.send(JobEvent::Finished(result));
    });
    rx
}
