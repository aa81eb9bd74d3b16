use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use crate::error::Result;
use crate::extractor::{reformat_date, Extractor};
use crate::model_client::VisionModel;
use crate::models::{BatchRow, ReceiptImage, Roster};
use crate::pipeline::sort_images;

pub const DEFAULT_WORKERS: usize = 4;

fn process_one(extractor: &Extractor, image: &ReceiptImage) -> Result<BatchRow> {
    let front = extractor.extract_front(image)?;
    let notes = extractor.extract_purpose_and_employee(image, &front)?;
    Ok(BatchRow {
        filename: image.file_name(),
        date: reformat_date(&front.date),
        purpose: notes.purpose,
        company: front.vendor,
        price: front.amount,
        worker: notes.night_worker,
        note: notes.card_note,
    })
}

/// Read every image independently on a fixed pool of worker threads.
///
/// Workers claim images by index and send `(index, row)` back; the rows are
/// slotted by index, so the output follows the sorted input order whatever
/// order the calls complete in. A receipt that fails at any step comes back
/// as a blank row carrying only its file name.
pub fn process_batch(
    model: &dyn VisionModel,
    roster: &Roster,
    images: &[ReceiptImage],
    workers: usize,
) -> Vec<BatchRow> {
    let files = sort_images(images);
    if files.is_empty() {
        return Vec::new();
    }
    let workers = workers.clamp(1, files.len());
    let extractor = Extractor::new(model, roster);
    let next = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel::<(usize, BatchRow)>();

    log::info!("{} receipts on {} workers", files.len(), workers);

    thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let files = &files;
            let extractor = &extractor;
            let next = &next;
            scope.spawn(move || loop {
                let idx = next.fetch_add(1, Ordering::Relaxed);
                let Some(image) = files.get(idx) else {
                    break;
                };
                log::info!("[{}/{}] {}", idx + 1, files.len(), image.file_name());
                let row = process_one(extractor, image).unwrap_or_else(|e| {
                    log::warn!("{}: {e}", image.file_name());
                    BatchRow::blank(&image.file_name())
                });
                if tx.send((idx, row)).is_err() {
                    break;
                }
            });
        }
    });
    drop(tx);

    let mut slots: Vec<Option<BatchRow>> = vec![None; files.len()];
    for (idx, row) in rx {
        slots[idx] = Some(row);
    }
    slots
        .into_iter()
        .zip(&files)
        .map(|(slot, image)| slot.unwrap_or_else(|| BatchRow::blank(&image.file_name())))
        .collect()
}
