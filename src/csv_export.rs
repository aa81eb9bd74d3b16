use std::io::Write;
use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::error::Result;
use crate::models::BatchRow;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub fn export_file_name(stamp: chrono::DateTime<chrono::Local>) -> String {
    format!("results_{}.csv", stamp.format("%Y%m%d_%H%M%S"))
}

/// Write rows as CSV with a byte-order mark so spreadsheet apps pick UTF-8.
pub fn write_csv(path: &Path, rows: &[BatchRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;
    file.write_all(UTF8_BOM)?;
    let mut wtr = csv::Writer::from_writer(file);
    wtr.write_record(BatchRow::HEADER)?;
    for row in rows {
        wtr.write_record(row.fields())?;
    }
    wtr.flush()?;
    Ok(())
}

fn print_rows(rows: &[BatchRow]) {
    println!("{}", BatchRow::HEADER.join(","));
    for row in rows {
        println!("{}", row.fields().join(","));
    }
}

/// Write a timestamped export into `dir`. If that fails the rows are printed
/// to stdout instead and `None` is returned.
pub fn export_or_print(dir: &Path, rows: &[BatchRow]) -> Option<PathBuf> {
    let path = dir.join(export_file_name(chrono::Local::now()));
    match write_csv(&path, rows) {
        Ok(()) => Some(path),
        Err(e) => {
            eprintln!("{} could not write {}: {e}", "Error:".red().bold(), path.display());
            println!("\nResults:");
            print_rows(rows);
            None
        }
    }
}
