use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Printed fields read off the front of a receipt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontInfo {
    /// `YYYY-MM-DD HH:MM`, or empty when the receipt has no readable time.
    pub date: String,
    /// Digits only, or empty.
    pub amount: String,
    pub vendor: String,
    pub purpose: String,
    pub card_note: String,
    pub address: String,
}

/// Handwritten fields read off the back of a receipt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackInfo {
    pub employee: String,
    pub route: String,
}

/// Handwritten annotations from the second call of the multi-field variant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotation {
    pub purpose: String,
    pub night_worker: String,
    pub card_note: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    OffSite,
    NightShift,
}

impl Shift {
    pub fn label(&self) -> &'static str {
        match self {
            Self::OffSite => "외근",
            Self::NightShift => "야근",
        }
    }
}

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One line of the transport-expense detail sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailRow {
    pub receipt_id: String,
    pub date_label: String,
    pub employee: String,
    pub shift_label: String,
    pub route: String,
    pub amount: String,
    pub note: String,
}

impl DetailRow {
    pub const HEADER: [&'static str; 7] = [
        "영수증번호",
        "사용일자",
        "직원명",
        "업무내용",
        "출발-도착",
        "사용요금",
        "비고",
    ];

    pub fn fields(&self) -> [&str; 7] {
        [
            self.receipt_id.as_str(),
            self.date_label.as_str(),
            self.employee.as_str(),
            self.shift_label.as_str(),
            self.route.as_str(),
            self.amount.as_str(),
            self.note.as_str(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryEntry {
    pub employee: String,
    pub total: i64,
}

/// Per-employee totals, kept in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    entries: Vec<SummaryEntry>,
}

impl Summary {
    /// Add `amount` to the employee's total. Returns false, leaving the
    /// total unchanged, when the sum would overflow.
    pub fn add(&mut self, employee: &str, amount: i64) -> bool {
        match self.entries.iter_mut().find(|e| e.employee == employee) {
            Some(entry) => match entry.total.checked_add(amount) {
                Some(total) => {
                    entry.total = total;
                    true
                }
                None => false,
            },
            None => {
                self.entries.push(SummaryEntry {
                    employee: employee.to_string(),
                    total: amount,
                });
                true
            }
        }
    }

    #[allow(dead_code)]
    pub fn get(&self, employee: &str) -> Option<i64> {
        self.entries
            .iter()
            .find(|e| e.employee == employee)
            .map(|e| e.total)
    }

    pub fn entries(&self) -> &[SummaryEntry] {
        &self.entries
    }

    pub fn total(&self) -> i64 {
        self.entries
            .iter()
            .fold(0i64, |acc, e| acc.saturating_add(e.total))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Row of the single-pass CSV export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchRow {
    pub filename: String,
    pub date: String,
    pub purpose: String,
    pub company: String,
    pub price: String,
    pub worker: String,
    pub note: String,
}

impl BatchRow {
    pub const HEADER: [&'static str; 7] =
        ["filename", "date", "purpose", "company", "price", "worker", "note"];

    /// The all-blank record written when a receipt could not be read.
    pub fn blank(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            ..Self::default()
        }
    }

    pub fn fields(&self) -> [&str; 7] {
        [
            self.filename.as_str(),
            self.date.as_str(),
            self.purpose.as_str(),
            self.company.as_str(),
            self.price.as_str(),
            self.worker.as_str(),
            self.note.as_str(),
        ]
    }
}

/// Known employee names plus the two-letter initials used on handwritten notes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    names: Vec<String>,
    initials: BTreeMap<String, String>,
}

impl Roster {
    pub fn new(names: Vec<String>, initials: BTreeMap<String, String>) -> Self {
        let initials = initials
            .into_iter()
            .map(|(k, v)| (k.trim().to_uppercase(), v))
            .collect();
        Self { names, initials }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn initials(&self) -> &BTreeMap<String, String> {
        &self.initials
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Expand two-letter initials to a full name; anything else is returned trimmed.
    pub fn resolve(&self, raw: &str) -> String {
        let raw = raw.trim();
        let is_initials = raw.chars().count() == 2 && raw.chars().all(|c| c.is_ascii_alphabetic());
        if is_initials {
            if let Some(name) = self.initials.get(&raw.to_uppercase()) {
                return name.clone();
            }
        }
        raw.to_string()
    }
}

/// A receipt photo on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReceiptImage {
    pub path: PathBuf,
}

impl ReceiptImage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// File name without its extension; used as the receipt number.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn mime_type(&self) -> &'static str {
        mime_for_path(&self.path)
    }
}

pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
}
