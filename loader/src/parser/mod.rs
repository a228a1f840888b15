//! Row sources with encoding and delimiter auto-detection.
//!
//! A [`RowSource`] yields a header row, then data rows as ordered lists of
//! strings. CSV files are decoded (UTF-8, ISO-8859-1 or Windows-1252) and
//! their delimiter guessed from the header line; spreadsheets are read from
//! their first sheet.

use calamine::{open_workbook_auto, Data, Reader};
use std::io::Cursor;
use std::path::Path;
use std::vec::IntoIter;

use crate::error::{SourceError, SourceResult};
use crate::logs::log_info;

/// Ordered rows of a tabular file.
pub trait RowSource {
    /// Header row. Always the first non-blank row.
    fn header_row(&mut self) -> SourceResult<Vec<String>>;

    /// Next data row, `None` at the end. Blank rows are skipped.
    fn next_data_row(&mut self) -> SourceResult<Option<Vec<String>>>;
}

/// Readers chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Csv,
    Excel,
}

impl SourceKind {
    pub fn from_path(path: &Path) -> SourceResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "csv" => Ok(SourceKind::Csv),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(SourceKind::Excel),
            "" => Err(SourceError::UnsupportedFileType("Extension-less".to_string())),
            other => Err(SourceError::UnsupportedFileType(format!(".{}", other))),
        }
    }

    /// Loader name, also the config section for loader-specific options.
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Csv => "csv",
            SourceKind::Excel => "excel",
        }
    }
}

/// Open the file at `path` with the reader for its extension.
pub fn open_source(path: impl AsRef<Path>) -> SourceResult<Box<dyn RowSource>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(SourceError::NotFound(path.display().to_string()));
    }

    match SourceKind::from_path(path)? {
        SourceKind::Csv => Ok(Box::new(CsvSource::from_path(path)?)),
        SourceKind::Excel => Ok(Box::new(ExcelSource::from_path(path)?)),
    }
}

// =============================================================================
// Encoding and delimiter detection
// =============================================================================

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes with the given encoding, falling back to lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Guess the delimiter from the separators counted in the first line.
///
/// `|` is a candidate last so association cells never win a tie.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().find(|l| !l.trim().is_empty()).unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|c| c.trim().is_empty())
}

// =============================================================================
// CSV
// =============================================================================

/// CSV rows read with the `csv` crate after decoding.
pub struct CsvSource {
    reader: csv::Reader<Cursor<Vec<u8>>>,
    headers: Option<Vec<String>>,
    encoding: String,
    delimiter: char,
}

impl CsvSource {
    pub fn from_path(path: impl AsRef<Path>) -> SourceResult<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    /// Detect encoding and delimiter, then read from memory.
    pub fn from_bytes(bytes: &[u8]) -> SourceResult<Self> {
        let encoding = detect_encoding(bytes);
        let content = decode_content(bytes, &encoding);
        let delimiter = detect_delimiter(&content);

        log_info(format!(
            "Detected encoding {} and separator '{}'",
            encoding,
            format_delimiter(delimiter)
        ));

        Ok(Self::with_delimiter(content, delimiter, encoding))
    }

    pub fn with_delimiter(content: String, delimiter: char, encoding: String) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .delimiter(delimiter as u8)
            .from_reader(Cursor::new(content.into_bytes()));

        Self { reader, headers: None, encoding, delimiter }
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    fn read_row(&mut self) -> SourceResult<Option<Vec<String>>> {
        let mut record = csv::StringRecord::new();
        loop {
            let line = self.reader.position().line() as usize;
            let more = self
                .reader
                .read_record(&mut record)
                .map_err(|e| SourceError::Csv { line, message: e.to_string() })?;
            if !more {
                return Ok(None);
            }

            let row: Vec<String> = record.iter().map(String::from).collect();
            if !is_blank(&row) {
                return Ok(Some(row));
            }
        }
    }
}

impl RowSource for CsvSource {
    fn header_row(&mut self) -> SourceResult<Vec<String>> {
        if let Some(headers) = &self.headers {
            return Ok(headers.clone());
        }
        let headers = self.read_row()?.ok_or(SourceError::NoHeaders)?;
        self.headers = Some(headers.clone());
        Ok(headers)
    }

    fn next_data_row(&mut self) -> SourceResult<Option<Vec<String>>> {
        if self.headers.is_none() {
            self.header_row()?;
        }
        self.read_row()
    }
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

// =============================================================================
// Spreadsheets
// =============================================================================

/// Rows of the first sheet of an Excel or OpenDocument workbook.
pub struct ExcelSource {
    sheet: String,
    headers: Option<Vec<String>>,
    rows: IntoIter<Vec<String>>,
}

impl ExcelSource {
    pub fn from_path(path: impl AsRef<Path>) -> SourceResult<Self> {
        let path = path.as_ref();
        let mut workbook = open_workbook_auto(path).map_err(|e| {
            SourceError::Spreadsheet(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let sheet = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| SourceError::Spreadsheet("Workbook has no sheets".to_string()))?;

        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|e| SourceError::Spreadsheet(format!("Failed to read sheet {}: {}", sheet, e)))?;

        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>())
            .filter(|row| !is_blank(row))
            .collect();

        log_info(format!("Read {} rows from sheet {}", rows.len(), sheet));
        Ok(Self::from_rows(sheet, rows))
    }

    /// Build from rows already in memory. The first row is the header row.
    pub fn from_rows(sheet: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        Self { sheet: sheet.into(), headers: None, rows: rows.into_iter() }
    }

    pub fn sheet(&self) -> &str {
        &self.sheet
    }
}

impl RowSource for ExcelSource {
    fn header_row(&mut self) -> SourceResult<Vec<String>> {
        if let Some(headers) = &self.headers {
            return Ok(headers.clone());
        }
        let headers = self.rows.next().ok_or(SourceError::NoHeaders)?;
        self.headers = Some(headers.clone());
        Ok(headers)
    }

    fn next_data_row(&mut self) -> SourceResult<Option<Vec<String>>> {
        if self.headers.is_none() {
            self.header_row()?;
        }
        Ok(self.rows.next())
    }
}

/// String form of a cell. Whole floats lose their fraction (`3.0` -> `3`).
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string().trim().to_string(),
    }
}
