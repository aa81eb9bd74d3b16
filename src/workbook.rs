use std::collections::BTreeMap;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

use crate::error::{Result, TallyError};
use crate::pipeline::{Progress, PROGRESS_DONE, PROGRESS_WORKBOOK};
use crate::sink::{read_details, read_summary, DETAILS_FILE, SUMMARY_FILE};

pub const DETAILS_SHEET: &str = "교통비내역";
pub const SUMMARY_SHEET: &str = "직원별 사용금액";
pub const SUMMARY_HEADER: [&str; 3] = ["적요", "직원명", "총합계"];
pub const SUMMARY_CATEGORY: &str = "교통비";

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
    /// Excel serial date, written back with a date format.
    Date(f64),
    /// Formula text, with or without the leading `=`.
    Formula(String),
}

/// Cell values of one worksheet, keyed by zero-based (row, column).
#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub name: String,
    cells: BTreeMap<(u32, u16), CellValue>,
}

impl Sheet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cells: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, row: u32, col: u16, value: CellValue) {
        self.cells.insert((row, col), value);
    }

    #[allow(dead_code)]
    pub fn get(&self, row: u32, col: u16) -> Option<&CellValue> {
        self.cells.get(&(row, col))
    }

    /// First row below everything in use (0 for an empty sheet).
    pub fn next_row(&self) -> u32 {
        self.cells.keys().map(|(r, _)| r + 1).max().unwrap_or(0)
    }

    pub fn append(&mut self, values: &[&str]) {
        let row = self.next_row();
        for (col, value) in values.iter().enumerate() {
            self.set(row, col as u16, CellValue::Text(value.to_string()));
        }
    }
}

/// A workbook held as cell values and formulas, in sheet order.
#[derive(Debug, Clone, Default)]
pub struct Grid {
    pub sheets: Vec<Sheet>,
}

impl Grid {
    /// Read every sheet of an existing workbook.
    pub fn load(path: &Path) -> Result<Self> {
        let mut workbook = open_workbook_auto(path)
            .map_err(|e| TallyError::Workbook(format!("Failed to open {}: {e}", path.display())))?;

        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| TallyError::Workbook(format!("Failed to read sheet {name}: {e}")))?;
            let mut sheet = Sheet::new(&name);
            let (row0, col0) = range.start().unwrap_or((0, 0));
            for (r, c, data) in range.cells() {
                let value = match data {
                    Data::String(s) => CellValue::Text(s.clone()),
                    Data::Float(f) => CellValue::Number(*f),
                    Data::Int(i) => CellValue::Number(*i as f64),
                    Data::Bool(b) => CellValue::Bool(*b),
                    Data::DateTime(dt) => CellValue::Date(dt.as_f64()),
                    Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
                    Data::Error(_) | Data::Empty => continue,
                };
                sheet.set(row0 + r as u32, (col0 as usize + c) as u16, value);
            }

            // Formulas replace their cached values.
            match workbook.worksheet_formula(&name) {
                Ok(formulas) => {
                    let (row0, col0) = formulas.start().unwrap_or((0, 0));
                    for (r, c, formula) in formulas.cells() {
                        if formula.is_empty() {
                            continue;
                        }
                        sheet.set(
                            row0 + r as u32,
                            (col0 as usize + c) as u16,
                            CellValue::Formula(formula.clone()),
                        );
                    }
                }
                Err(e) => log::warn!("sheet {name}: formulas not copied: {e}"),
            }
            sheets.push(sheet);
        }
        Ok(Self { sheets })
    }

    #[allow(dead_code)]
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }

    pub fn sheet_or_create(&mut self, name: &str) -> &mut Sheet {
        let idx = match self.sheets.iter().position(|s| s.name == name) {
            Some(idx) => idx,
            None => {
                self.sheets.push(Sheet::new(name));
                self.sheets.len() - 1
            }
        };
        &mut self.sheets[idx]
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        let datetime_format = Format::new().set_num_format("yyyy-mm-dd hh:mm");

        let mut workbook = Workbook::new();
        for sheet in &self.sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(&sheet.name)?;
            for (&(row, col), value) in &sheet.cells {
                match value {
                    CellValue::Text(s) => worksheet.write_string(row, col, s)?,
                    CellValue::Number(n) => worksheet.write_number(row, col, *n)?,
                    CellValue::Bool(b) => worksheet.write_boolean(row, col, *b)?,
                    CellValue::Date(serial) => {
                        let datetime = ExcelDateTime::from_serial_datetime(*serial)?;
                        let format = if serial.fract() == 0.0 {
                            &date_format
                        } else {
                            &datetime_format
                        };
                        worksheet.write_datetime_with_format(row, col, &datetime, format)?
                    }
                    CellValue::Formula(f) => worksheet.write_formula(row, col, f.as_str())?,
                };
            }
        }
        if self.sheets.is_empty() {
            workbook.add_worksheet();
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        workbook.save(path)?;
        Ok(())
    }
}

/// Overwrite detail rows from row 2 and append the per-employee block.
pub fn apply_records(grid: &mut Grid, details: &[Vec<String>], summary: &[(String, String)]) {
    if let Some(sheet) = grid.sheet_mut(DETAILS_SHEET) {
        for (i, row) in details.iter().enumerate() {
            for (col, value) in row.iter().enumerate() {
                sheet.set(1 + i as u32, col as u16, CellValue::Text(value.clone()));
            }
        }
    } else {
        log::warn!("template has no {DETAILS_SHEET:?} sheet; detail rows not copied");
    }

    let sheet = grid.sheet_or_create(SUMMARY_SHEET);
    sheet.append(&SUMMARY_HEADER);
    for (name, total) in summary {
        sheet.append(&[SUMMARY_CATEGORY, name, total]);
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Copy the template, fill it with the records and save it to `output`.
pub fn write_to_excel(
    template: &Path,
    output: &Path,
    details: &[Vec<String>],
    summary: &[(String, String)],
) -> Result<()> {
    if same_file(template, output) {
        return Err(TallyError::Workbook(format!(
            "Output {} would overwrite the template",
            output.display()
        )));
    }
    let mut grid = Grid::load(template)?;
    apply_records(&mut grid, details, summary);
    grid.save(output)
}

/// Read the two text files in `text_dir` back and build the output workbook.
pub fn generate_excel(
    text_dir: &Path,
    template: &Path,
    output: &Path,
    progress: &mut Progress,
) -> Result<()> {
    progress.report(PROGRESS_WORKBOOK);
    let details = read_details(&text_dir.join(DETAILS_FILE))?;
    let summary = read_summary(&text_dir.join(SUMMARY_FILE))?;
    write_to_excel(template, output, &details, &summary)?;
    progress.report(PROGRESS_DONE);
    Ok(())
}
