use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Report not found: {0}")]
    ReportNotFound(String),

    #[error("Invalid close date '{raw}' in row {row}{}: expected YYYY-MM-DD or MM/DD/YYYY", opportunity_suffix(.opportunity_id))]
    DateParse {
        raw: String,
        row: usize,
        opportunity_id: Option<String>,
    },

    #[error("Unparseable amount '{raw}' in column '{column}' (row {row})")]
    NumericCoercion {
        column: String,
        raw: String,
        row: usize,
    },

    #[error("Report {0} returned no rows")]
    EmptyReport(String),

    #[error("Invalid report payload: {0}")]
    InvalidPayload(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

fn opportunity_suffix(id: &Option<String>) -> String {
    match id {
        Some(id) => format!(" (opportunity {})", id),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, SnapshotError>;
