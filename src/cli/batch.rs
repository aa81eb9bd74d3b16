use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::batch::process_batch;
use crate::cli::{discover_images, vision_client};
use crate::csv_export::export_or_print;
use crate::error::{Result, TallyError};
use crate::settings::load_settings;

pub fn run(dir: &Path, workers: Option<usize>, out: Option<PathBuf>, api_key: Option<&str>) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        println!(
            "Created {}. Put receipt images in it and run again.",
            dir.display()
        );
        return Ok(());
    }

    let images = match discover_images(&[dir.to_path_buf()]) {
        Ok(images) => images,
        Err(TallyError::NoImages(_)) => {
            println!("No receipt images in {}. Add some and run again.", dir.display());
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    let settings = load_settings();
    let model = vision_client(api_key, &settings)?;
    let workers = workers.unwrap_or(settings.workers);

    println!("Reading {} receipt images...", images.len());
    let rows = process_batch(&*model, &settings.roster(), &images, workers);

    let blank = rows.iter().filter(|r| r.date.is_empty() && r.price.is_empty()).count();
    if blank > 0 {
        println!("{}", format!("{blank} receipts could not be read").yellow());
    }

    let out_dir = out.unwrap_or_else(|| dir.to_path_buf());
    if let Some(path) = export_or_print(&out_dir, &rows) {
        println!("{} {}", "Saved".green().bold(), path.display());
    }
    Ok(())
}
