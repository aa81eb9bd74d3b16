pub mod batch;
pub mod config;
pub mod excel;
pub mod roster;
pub mod run;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::error::{Result, TallyError};
use crate::model_client::{GeminiClient, OpenAiClient, VisionModel};
use crate::models::ReceiptImage;
use crate::settings::{resolve_api_key, Provider, Settings};

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "tif", "tiff", "webp"];

pub(crate) fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Explicit files are taken as given; directories contribute their image
/// files (not recursive).
pub(crate) fn discover_images(inputs: &[PathBuf]) -> Result<Vec<ReceiptImage>> {
    let mut images = Vec::new();
    for input in inputs {
        if input.is_dir() {
            for entry in std::fs::read_dir(input)? {
                let path = entry?.path();
                if path.is_file() && is_image(&path) {
                    images.push(ReceiptImage::new(path));
                }
            }
        } else if input.is_file() {
            images.push(ReceiptImage::new(input.clone()));
        } else {
            return Err(TallyError::Other(format!("{} does not exist", input.display())));
        }
    }
    if images.is_empty() {
        let shown: Vec<String> = inputs.iter().map(|p| p.display().to_string()).collect();
        return Err(TallyError::NoImages(shown.join(", ")));
    }
    Ok(images)
}

/// Client for the configured provider.
pub(crate) fn vision_client(api_key: Option<&str>, settings: &Settings) -> Result<Arc<dyn VisionModel>> {
    let key = resolve_api_key(api_key, settings)?;
    let client: Arc<dyn VisionModel> = match settings.provider {
        Provider::Gemini => Arc::new(GeminiClient::new(&key, &settings.model, &settings.base_url)),
        Provider::OpenAi => Arc::new(OpenAiClient::new(
            &key,
            &settings.openai_model,
            &settings.openai_base_url,
        )),
    };
    log::debug!("using {} model {}", settings.provider, settings.active_model());
    Ok(client)
}

#[derive(Parser)]
#[command(
    name = "receipt-tally",
    version,
    about = "Reads photographed transport receipts and tallies them per employee."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pair receipt fronts with their annotated backs and build the workbook.
    Run {
        /// Image files or folders of images
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Folder for the text files and the workbook
        #[arg(long)]
        out: PathBuf,
        /// Template workbook (default: configured template)
        #[arg(long)]
        template: Option<PathBuf>,
        /// Open the output folder when done
        #[arg(long)]
        open: bool,
        /// API key (default: GEMINI_API_KEY / OPENAI_API_KEY or settings)
        #[arg(long = "api-key")]
        api_key: Option<String>,
    },
    /// Read every image in a folder independently and export a CSV.
    Batch {
        /// Folder of receipt images
        dir: PathBuf,
        /// Parallel model calls (default: configured workers)
        #[arg(long)]
        workers: Option<usize>,
        /// Folder for the CSV (default: the image folder)
        #[arg(long)]
        out: Option<PathBuf>,
        /// API key (default: GEMINI_API_KEY / OPENAI_API_KEY or settings)
        #[arg(long = "api-key")]
        api_key: Option<String>,
    },
    /// Rebuild the workbook from existing text files.
    Excel {
        /// Folder holding 교통비내역.txt and 직원별합계.txt
        #[arg(long = "text-dir")]
        text_dir: PathBuf,
        /// Template workbook
        #[arg(long)]
        template: PathBuf,
        /// Output workbook path
        #[arg(long)]
        output: PathBuf,
    },
    /// Manage the employee roster.
    Roster {
        #[command(subcommand)]
        command: RosterCommands,
    },
    /// Show or change settings.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum RosterCommands {
    /// List employees and initials.
    List,
    /// Add an employee.
    Add { name: String },
    /// Remove an employee.
    Remove { name: String },
    /// Map two-letter initials to a full name.
    Initials { code: String, name: String },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the current settings.
    Show,
    /// Store the API key for the current provider (prompted when omitted).
    SetKey { key: Option<String> },
    /// Set the model name for the current provider.
    SetModel { model: String },
    /// Choose the model provider.
    SetProvider {
        #[arg(value_enum)]
        provider: Provider,
    },
    /// Set the default template workbook.
    SetTemplate { path: String },
}
