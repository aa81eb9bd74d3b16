use thiserror::Error;

#[derive(Error, Debug)]
pub enum TallyError {
    #[error("Model call failed: {0}")]
    ModelCall(String),

    #[error("Could not parse model response: {0}")]
    ResponseParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet write error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("Workbook error: {0}")]
    Workbook(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("No receipt images found in {0}")]
    NoImages(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TallyError>;
