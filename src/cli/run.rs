use std::io::Write;
use std::path::{Path, PathBuf};

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::{discover_images, vision_client};
use crate::error::{Result, TallyError};
use crate::fmt::won;
use crate::job::{spawn_run, Job, JobEvent};
use crate::models::Summary;
use crate::settings::load_settings;

const BAR_WIDTH: usize = 30;

fn progress_line(value: u8) -> String {
    let filled = BAR_WIDTH * value as usize / 100;
    format!(
        "\r  [{}{}] {value:>3}%",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled)
    )
}

pub(crate) fn summary_table(summary: &Summary) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["직원명", "총액"]);
    for entry in summary.entries() {
        table.add_row(vec![Cell::new(&entry.employee), Cell::new(won(entry.total))]);
    }
    table.add_row(vec![Cell::new("합계"), Cell::new(won(summary.total()))]);
    table
}

fn open_folder(path: &Path) {
    let opener = if cfg!(target_os = "windows") {
        "explorer"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    if let Err(e) = std::process::Command::new(opener).arg(path).spawn() {
        eprintln!("{} could not open {}: {e}", "Warning:".yellow(), path.display());
    }
}

pub fn run(
    inputs: &[PathBuf],
    out: &Path,
    template: Option<PathBuf>,
    open: bool,
    api_key: Option<&str>,
) -> Result<()> {
    let settings = load_settings();
    let template = template.or_else(|| settings.template()).ok_or_else(|| {
        TallyError::Settings(
            "No template workbook.\nPass --template or run `receipt-tally config set-template <path>`."
                .to_string(),
        )
    })?;
    if !template.is_file() {
        return Err(TallyError::Workbook(format!(
            "Template {} not found",
            template.display()
        )));
    }

    let images = discover_images(inputs)?;
    let model = vision_client(api_key, &settings)?;

    println!("Reading {} receipt images...", images.len());
    let rx = spawn_run(Job {
        model,
        roster: settings.roster(),
        images,
        out_dir: out.to_path_buf(),
        template,
    });

    let mut finished = None;
    for event in rx {
        match event {
            JobEvent::Progress(value) => {
                print!("{}", progress_line(value));
                let _ = std::io::stdout().flush();
            }
            JobEvent::Finished(result) => finished = Some(result),
        }
    }
    println!();

    let outcome = finished
        .ok_or_else(|| TallyError::Other("Job ended without a result".to_string()))??;

    println!("{} {} receipts recorded", "Done.".green().bold(), outcome.rows.len());
    if outcome.summary.is_empty() {
        println!("No employee totals.");
    } else {
        println!("{}", summary_table(&outcome.summary));
    }
    println!("  {}", outcome.details_path.display());
    println!("  {}", outcome.summary_path.display());
    println!("  {}", outcome.workbook_path.display());

    if open {
        open_folder(out);
    }
    Ok(())
}
