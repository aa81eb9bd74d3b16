use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::extractor::Extractor;
use crate::model_client::VisionModel;
use crate::models::{BackInfo, DetailRow, FrontInfo, ReceiptImage, Roster, Shift, Summary};

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

pub const PROGRESS_START: u8 = 15;
pub const PROGRESS_SCAN_SPAN: u8 = 45;
pub const PROGRESS_SCANNED: u8 = 60;
pub const PROGRESS_WORKBOOK: u8 = 75;
pub const PROGRESS_DONE: u8 = 100;

/// Forwards percentages to a consumer, never going backwards or past 100.
pub struct Progress<'a> {
    sink: Option<Box<dyn FnMut(u8) + Send + 'a>>,
    last: u8,
}

impl<'a> Progress<'a> {
    pub fn new(sink: impl FnMut(u8) + Send + 'a) -> Self {
        Self {
            sink: Some(Box::new(sink)),
            last: 0,
        }
    }

    pub fn silent() -> Self {
        Self { sink: None, last: 0 }
    }

    pub fn report(&mut self, value: u8) {
        let value = value.min(100).max(self.last);
        self.last = value;
        if let Some(sink) = self.sink.as_mut() {
            sink(value);
        }
    }

    #[allow(dead_code)]
    pub fn last(&self) -> u8 {
        self.last
    }
}

// ---------------------------------------------------------------------------
// Field derivations
// ---------------------------------------------------------------------------

/// Day-time receipts (up to and including 17:30) are off-site work, later ones night shift.
pub fn classify_shift(date: &str) -> Option<(String, Shift)> {
    let dt = NaiveDateTime::parse_from_str(date.trim(), "%Y-%m-%d %H:%M").ok()?;
    let shift = if dt.hour() < 17 || (dt.hour() == 17 && dt.minute() <= 30) {
        Shift::OffSite
    } else {
        Shift::NightShift
    };
    Some((format!("{}월 {}일", dt.month(), dt.day()), shift))
}

/// Parse a won amount, tolerating thousands separators and the currency suffix.
pub fn parse_amount(raw: &str) -> Option<i64> {
    raw.replace(',', "").replace('원', "").trim().parse().ok()
}

/// Deterministic processing order: by file name, then by full path.
pub fn sort_images(images: &[ReceiptImage]) -> Vec<ReceiptImage> {
    let mut sorted = images.to_vec();
    sorted.sort_by(|a, b| {
        a.file_name()
            .cmp(&b.file_name())
            .then_with(|| a.path.cmp(&b.path))
    });
    sorted
}

// ---------------------------------------------------------------------------
// Pairing
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct PairingOutcome {
    pub details: Vec<DetailRow>,
    pub summary: Summary,
    /// Every image consumed as a front or a back.
    pub used: BTreeSet<PathBuf>,
}

/// Walk the images in order, pairing each dated front with the first later
/// unused image whose back carries an employee name.
pub fn pair_receipts(
    model: &dyn VisionModel,
    roster: &Roster,
    images: &[ReceiptImage],
    progress: &mut Progress,
) -> PairingOutcome {
    let extractor = Extractor::new(model, roster);
    let files = sort_images(images);
    let total = files.len().max(1);
    let mut outcome = PairingOutcome::default();

    progress.report(PROGRESS_START);

    for (idx, front) in files.iter().enumerate() {
        if outcome.used.contains(&front.path) {
            continue;
        }

        let front_info = extractor.extract_front(front).unwrap_or_else(|e| {
            log::warn!("{}: front read failed, skipping: {e}", front.file_name());
            FrontInfo::default()
        });
        let scanned = ((idx + 1) * PROGRESS_SCAN_SPAN as usize / total) as u8;
        progress.report(PROGRESS_START + scanned);

        // A dateless image is not a front; it stays available as a back.
        if front_info.date.is_empty() {
            log::info!("{}: no date, not a front", front.file_name());
            continue;
        }

        let mut back_info = BackInfo::default();
        for candidate in &files[idx + 1..] {
            if outcome.used.contains(&candidate.path) {
                continue;
            }
            let info = match extractor.extract_back(candidate) {
                Ok(info) => info,
                Err(e) => {
                    log::warn!("{}: back read failed: {e}", candidate.file_name());
                    continue;
                }
            };
            if !info.employee.is_empty() {
                log::info!(
                    "{} paired with {} ({})",
                    front.file_name(),
                    candidate.file_name(),
                    info.employee
                );
                outcome.used.insert(candidate.path.clone());
                back_info = info;
                break;
            }
        }

        let (date_label, shift_label) = match classify_shift(&front_info.date) {
            Some((label, shift)) => (label, shift.label().to_string()),
            None => {
                log::warn!(
                    "{}: unparseable date {:?}",
                    front.file_name(),
                    front_info.date
                );
                (String::new(), String::new())
            }
        };

        if !back_info.employee.is_empty() && !front_info.amount.is_empty() {
            match parse_amount(&front_info.amount) {
                Some(amount) => {
                    if !outcome.summary.add(&back_info.employee, amount) {
                        log::warn!(
                            "{}: total for {} would overflow, amount {} not added",
                            front.file_name(),
                            back_info.employee,
                            amount
                        );
                    }
                }
                None => log::warn!(
                    "{}: amount {:?} is not a number",
                    front.file_name(),
                    front_info.amount
                ),
            }
        }

        outcome.details.push(DetailRow {
            receipt_id: front.stem(),
            date_label,
            employee: back_info.employee,
            shift_label,
            route: back_info.route,
            amount: front_info.amount,
            note: String::new(),
        });

        outcome.used.insert(front.path.clone());
    }

    progress.report(PROGRESS_SCANNED);
    outcome
}
