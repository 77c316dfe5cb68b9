//! Synchronous CSV reader with iterator interface
//!
//! Provides a streaming iterator over the rows of a CSV file, converted to
//! domain values through [`CsvRow`]. The same reader serves the accounts
//! fixture and the movements file.
//!
//! # Iterator Interface
//!
//! ```no_run
//! use retail_ledger::io::csv_format::MovementCsvRecord;
//! use retail_ledger::io::sync_reader::SyncReader;
//! use std::path::Path;
//!
//! let reader = SyncReader::<MovementCsvRecord>::new(Path::new("movements.csv")).unwrap();
//! for result in reader {
//!     match result {
//!         Ok(request) => println!("Movement: {:?}", request),
//!         Err(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! ```
//!
//! # Error Handling
//!
//! - Fatal errors (file not found) are returned from `new()`
//! - Row parsing and conversion errors are yielded as `Err` items, prefixed
//!   with the line number, and iteration continues
//!
//! Rows are read one at a time; memory use does not grow with file size.

use crate::io::csv_format::CsvRow;
use crate::types::LedgerError;
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::marker::PhantomData;
use std::path::Path;

/// Synchronous CSV reader over rows of type `R`
#[derive(Debug)]
pub struct SyncReader<R: CsvRow> {
    reader: csv::Reader<File>,
    line_num: usize,
    _row: PhantomData<R>,
}

impl<R: CsvRow> SyncReader<R> {
    /// Create a new SyncReader from a file path
    ///
    /// The CSV reader trims whitespace from all fields and allows flexible
    /// field counts, so trailing optional columns may be omitted.
    ///
    /// # Returns
    ///
    /// * `Ok(SyncReader)` if the file opened successfully
    /// * `Err(LedgerError::IoError)` if it could not be opened
    pub fn new(path: &Path) -> Result<Self, LedgerError> {
        let file = File::open(path).map_err(|e| LedgerError::IoError {
            message: format!("Failed to open file '{}': {}", path.display(), e),
        })?;

        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(file);

        Ok(Self {
            reader,
            line_num: 0,
            _row: PhantomData,
        })
    }
}

impl<R: CsvRow> Iterator for SyncReader<R> {
    type Item = Result<R::Output, String>;

    /// Read, deserialize and convert the next row
    ///
    /// Line numbers in errors count the header as line 1.
    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<R>();
        let next = deserializer.next()?;
        self.line_num += 1;
        let line = self.line_num + 1;

        Some(match next {
            Ok(row) => row.convert().map_err(|e| format!("Line {}: {}", line, e)),
            Err(e) => Err(format!("Line {}: CSV parse error: {}", line, e)),
        })
    }
}
