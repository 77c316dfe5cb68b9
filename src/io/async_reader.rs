//! Asynchronous CSV reader with batch interface
//!
//! Provides batch reading over the rows of a CSV stream for the async
//! replay pipeline.
//!
//! # Architecture
//!
//! ```text
//! CSV stream → AsyncReader → Batches of converted rows
//!                  ↓
//!           csv_format module
//!           (CsvRow::convert)
//! ```

use crate::io::csv_format::CsvRow;
use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::warn;

/// Asynchronous CSV reader over rows of type `T`
pub struct AsyncReader<R: AsyncRead + Unpin, T: CsvRow> {
    csv_reader: csv_async::AsyncDeserializer<R>,
    rows_read: usize,
    _row: std::marker::PhantomData<T>,
}

impl<R, T> AsyncReader<R, T>
where
    R: AsyncRead + Unpin + Send + 'static,
    T: CsvRow + Send + 'static,
{
    /// Create a new AsyncReader from an async reader
    ///
    /// # Arguments
    ///
    /// * `reader` - Async reader providing CSV data
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self {
            csv_reader,
            rows_read: 0,
            _row: std::marker::PhantomData,
        }
    }

    /// Read a batch of converted rows
    ///
    /// Reads up to `batch_size` rows. Rows that fail to parse or convert are
    /// logged with their line number and skipped.
    ///
    /// # Returns
    ///
    /// The converted rows in file order; empty at end of input.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<T::Output> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut records = self.csv_reader.deserialize::<T>();

        while batch.len() < batch_size {
            let Some(next) = records.next().await else {
                break;
            };
            self.rows_read += 1;
            let line = self.rows_read + 1;
            match next {
                Ok(row) => match row.convert() {
                    Ok(value) => batch.push(value),
                    Err(e) => warn!(line, error = %e, "Skipping row"),
                },
                Err(e) => warn!(line, error = %e, "CSV parse error"),
            }
        }

        batch
    }
}
