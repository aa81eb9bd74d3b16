use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::fmt::won;
use crate::models::{DetailRow, Summary};

pub const DETAILS_FILE: &str = "교통비내역.txt";
pub const SUMMARY_FILE: &str = "직원별합계.txt";
pub const SUMMARY_HEADER: [&str; 2] = ["직원명", "총액"];

// Fields are written raw: a tab or newline inside a value breaks its line.
fn tsv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    Ok(csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .from_path(path)?)
}

fn tsv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    Ok(csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .has_headers(true)
        .from_path(path)?)
}

pub struct SinkPaths {
    pub details: PathBuf,
    pub summary: PathBuf,
}

/// Write both intermediate files into `dir`, creating it if needed.
pub fn write_text_files(dir: &Path, details: &[DetailRow], summary: &Summary) -> Result<SinkPaths> {
    std::fs::create_dir_all(dir)?;
    let paths = SinkPaths {
        details: dir.join(DETAILS_FILE),
        summary: dir.join(SUMMARY_FILE),
    };
    write_details(&paths.details, details)?;
    write_summary(&paths.summary, summary)?;
    Ok(paths)
}

pub fn write_details(path: &Path, details: &[DetailRow]) -> Result<()> {
    let mut wtr = tsv_writer(path)?;
    wtr.write_record(DetailRow::HEADER)?;
    for row in details {
        wtr.write_record(row.fields())?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_summary(path: &Path, summary: &Summary) -> Result<()> {
    let mut wtr = tsv_writer(path)?;
    wtr.write_record(SUMMARY_HEADER)?;
    for entry in summary.entries() {
        wtr.write_record([entry.employee.clone(), won(entry.total)])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Detail lines as written, header dropped. Trailing empty fields are
/// dropped too, so blank cells leave the template's value in place.
pub fn read_details(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut rdr = tsv_reader(path)?;
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let mut fields: Vec<String> = record.iter().map(|f| f.to_string()).collect();
        while fields.last().is_some_and(|f| f.trim().is_empty()) {
            fields.pop();
        }
        if !fields.is_empty() {
            rows.push(fields);
        }
    }
    Ok(rows)
}

/// `(employee, formatted total)` pairs in file order.
pub fn read_summary(path: &Path) -> Result<Vec<(String, String)>> {
    let mut rdr = tsv_reader(path)?;
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        match (record.get(0), record.get(1)) {
            (Some(name), Some(total)) if !name.trim().is_empty() => {
                rows.push((name.trim().to_string(), total.trim().to_string()))
            }
            _ => log::warn!("{}: skipping malformed line {:?}", path.display(), record),
        }
    }
    Ok(rows)
}
