//! Readers for uploaded files: specification text and takeoff tables.

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::io::Cursor;
use thiserror::Error;

use crate::domain::{Cell, Table};

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Unsupported file type '{0}'")]
    Unsupported(String),

    #[error("Failed to read PDF: {0}")]
    Pdf(String),

    #[error("File is not valid UTF-8 text")]
    Encoding,

    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to read spreadsheet: {0}")]
    Spreadsheet(String),

    #[error("Spreadsheet has no worksheets")]
    NoSheets,

    #[error("Table parser aborted: {0}")]
    Aborted(String),
}

/// A file received in a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    /// Lower-cased extension, empty if none.
    pub fn extension(&self) -> String {
        std::path::Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default()
    }
}

/// Extract plain text from a specification document.
///
/// PDF parsing runs on the blocking pool; a parser panic is reported as an
/// ordinary PDF error.
pub async fn extract_text(upload: &UploadedFile) -> Result<String, DocumentError> {
    match upload.extension().as_str() {
        "pdf" => {
            let bytes = upload.bytes.clone();
            tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
                .await
                .map_err(|e| DocumentError::Pdf(format!("parser aborted: {}", e)))?
                .map_err(|e| DocumentError::Pdf(e.to_string()))
        }
        "txt" | "text" | "md" => {
            String::from_utf8(upload.bytes.clone()).map_err(|_| DocumentError::Encoding)
        }
        other => Err(DocumentError::Unsupported(other.to_string())),
    }
}

/// [`read_table`] on the blocking pool.
pub async fn load_table(upload: &UploadedFile) -> Result<Table, DocumentError> {
    let upload = upload.clone();
    tokio::task::spawn_blocking(move || read_table(&upload))
        .await
        .map_err(|e| DocumentError::Aborted(e.to_string()))?
}

/// Read the first sheet of a tabular upload; the first row names the columns.
pub fn read_table(upload: &UploadedFile) -> Result<Table, DocumentError> {
    match upload.extension().as_str() {
        "csv" => read_csv(&upload.bytes),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_workbook(&upload.bytes),
        other => Err(DocumentError::Unsupported(other.to_string())),
    }
}

fn read_csv(bytes: &[u8]) -> Result<Table, DocumentError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);

    let columns = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    if field.trim().is_empty() {
                        Cell::Empty
                    } else {
                        Cell::Text(field.to_string())
                    }
                })
                .collect(),
        );
    }

    Ok(Table { columns, rows })
}

fn read_workbook(bytes: &[u8]) -> Result<Table, DocumentError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| DocumentError::Spreadsheet(e.to_string()))?;

    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(DocumentError::NoSheets)?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| DocumentError::Spreadsheet(e.to_string()))?;

    let mut rows = range.rows();
    let columns = rows
        .next()
        .map(|header| header.iter().map(|d| cell_from_data(d).to_text()).collect())
        .unwrap_or_default();
    let rows = rows
        .map(|row| row.iter().map(cell_from_data).collect())
        .collect();

    Ok(Table { columns, rows })
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) if s.trim().is_empty() => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(UploadedFile::new("Spec.PDF", vec![]).extension(), "pdf");
        assert_eq!(UploadedFile::new("noext", vec![]).extension(), "");
    }

    #[tokio::test]
    async fn plain_text_specs_are_decoded() {
        let upload = UploadedFile::new("spec.txt", "SECTION 07 41 13");
        assert_eq!(extract_text(&upload).await.unwrap(), "SECTION 07 41 13");
    }

    #[tokio::test]
    async fn unsupported_spec_type_is_an_error() {
        let upload = UploadedFile::new("spec.docx", vec![1, 2, 3]);
        assert!(matches!(
            extract_text(&upload).await,
            Err(DocumentError::Unsupported(ext)) if ext == "docx"
        ));
    }

    #[tokio::test]
    async fn garbage_pdf_is_an_error() {
        let upload = UploadedFile::new("spec.pdf", b"definitely not a pdf".to_vec());
        assert!(matches!(
            extract_text(&upload).await,
            Err(DocumentError::Pdf(_))
        ));
    }

    #[test]
    fn csv_is_read_with_header_row() {
        let upload = UploadedFile::new(
            "takeoff.csv",
            "\u{feff}Description, Quantity ,Size\nCoping,10,LF\n,,\nTrim,,\n",
        );
        let table = read_table(&upload).unwrap();
        assert_eq!(table.columns, vec!["Description", " Quantity ", "Size"]);
        assert_eq!(
            table.rows,
            vec![
                vec![
                    Cell::Text("Coping".into()),
                    Cell::Text("10".into()),
                    Cell::Text("LF".into())
                ],
                vec![Cell::Empty, Cell::Empty, Cell::Empty],
                vec![Cell::Text("Trim".into()), Cell::Empty, Cell::Empty],
            ]
        );
    }

    #[tokio::test]
    async fn table_loads_on_blocking_pool() {
        let upload = UploadedFile::new("takeoff.csv", "Description,Quantity,Size\nCoping,10,LF\n");
        assert_eq!(load_table(&upload).await.unwrap(), read_table(&upload).unwrap());

        let wrong = UploadedFile::new("takeoff.docx", vec![0u8]);
        assert!(matches!(
            load_table(&wrong).await,
            Err(DocumentError::Unsupported(ext)) if ext == "docx"
        ));
    }

    #[test]
    fn unsupported_table_type_is_an_error() {
        let upload = UploadedFile::new("takeoff.pdf", vec![]);
        assert!(matches!(
            read_table(&upload),
            Err(DocumentError::Unsupported(_))
        ));
    }

    #[test]
    fn corrupt_workbook_is_an_error() {
        let upload = UploadedFile::new("takeoff.xlsx", b"not a zip".to_vec());
        assert!(matches!(
            read_table(&upload),
            Err(DocumentError::Spreadsheet(_))
        ));
    }

    #[test]
    fn spreadsheet_cells_map_to_table_cells() {
        assert_eq!(cell_from_data(&Data::Int(4)), Cell::Number(4.0));
        assert_eq!(cell_from_data(&Data::Float(2.5)), Cell::Number(2.5));
        assert_eq!(cell_from_data(&Data::String("  ".into())), Cell::Empty);
        assert_eq!(
            cell_from_data(&Data::String("Coping".into())),
            Cell::Text("Coping".into())
        );
        assert_eq!(cell_from_data(&Data::Empty), Cell::Empty);
    }
}
