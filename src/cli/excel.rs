use std::path::Path;

use crate::error::Result;
use crate::pipeline::Progress;
use crate::workbook::generate_excel;

pub fn run(text_dir: &Path, template: &Path, output: &Path) -> Result<()> {
    generate_excel(text_dir, template, output, &mut Progress::silent())?;
    println!("Wrote {}", output.display());
    Ok(())
}
