//! Table loaders and grid persistence
//!
//! Loaders only produce a conforming long-form table; all validation
//! happens in [`Epochs::new`]. Grid persistence writes a JSON envelope
//! tagged with a format version and the cell kind; [`load_grid`] checks
//! the version before reading any cells and dispatches on the kind to
//! reconstruct the right grid specialization, falling back to a generic
//! grid of JSON-backed cells for unknown kinds.

use crate::epochs::Epochs;
use crate::grid::{FitGrid, OlsGrid};
use crate::models::ols::OLS_KIND;
use crate::models::{FitResult, GenericFit, OlsFit};
use crate::table::{EpochsTable, Key, TableConfig};
use crate::{Error, Result};
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::debug;

/// Version of the persisted grid envelope this build reads and writes
pub const GRID_FORMAT_VERSION: u32 = 1;

/// Build an [`Epochs`] container from in-memory Arrow record batches.
///
/// # Errors
///
/// Returns an error if the batches cannot be converted to a long-form
/// table or the table fails validation.
pub fn epochs_from_batches(
    batches: &[RecordBatch],
    config: TableConfig,
    channels: Vec<String>,
) -> Result<Epochs> {
    let table = EpochsTable::from_batches(batches)?;
    Epochs::new(table, config, channels)
}

/// Build an [`Epochs`] container from a Parquet file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or the table
/// fails validation.
pub fn epochs_from_parquet<P: AsRef<Path>>(
    path: P,
    config: TableConfig,
    channels: Vec<String>,
) -> Result<Epochs> {
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    let file = File::open(path.as_ref())
        .map_err(|e| Error::Storage(format!("failed to open Parquet file: {e}")))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| Error::Storage(format!("failed to parse Parquet file: {e}")))?;
    let reader = builder
        .build()
        .map_err(|e| Error::Storage(format!("failed to create Parquet reader: {e}")))?;

    let mut batches = Vec::new();
    for batch in reader {
        batches.push(
            batch.map_err(|e| Error::Storage(format!("failed to read record batch: {e}")))?,
        );
    }
    debug!(batches = batches.len(), "loaded Parquet epochs table");

    epochs_from_batches(&batches, config, channels)
}

/// Build an [`Epochs`] container from an Arrow IPC (Feather v2) file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or the table
/// fails validation.
pub fn epochs_from_ipc<P: AsRef<Path>>(
    path: P,
    config: TableConfig,
    channels: Vec<String>,
) -> Result<Epochs> {
    use arrow::ipc::reader::FileReader;

    let file = File::open(path.as_ref())
        .map_err(|e| Error::Storage(format!("failed to open IPC file: {e}")))?;
    let reader = FileReader::try_new(file, None)
        .map_err(|e| Error::Storage(format!("failed to parse IPC file: {e}")))?;

    let mut batches = Vec::new();
    for batch in reader {
        batches.push(
            batch.map_err(|e| Error::Storage(format!("failed to read record batch: {e}")))?,
        );
    }

    epochs_from_batches(&batches, config, channels)
}

/// Persisted grid envelope
#[derive(Serialize, Deserialize)]
struct GridEnvelope {
    format_version: u32,
    kind: String,
    times: Vec<Key>,
    channels: Vec<String>,
    epoch_index: Vec<Key>,
    cells: Vec<Value>,
}

/// A grid reconstructed from disk, tagged by the specialization the cell
/// kind selected
#[derive(Debug)]
pub enum LoadedGrid {
    /// Grid of OLS cells
    Ols(OlsGrid),
    /// Grid of an unrecognized kind, with JSON-backed cells
    Other(FitGrid),
}

impl LoadedGrid {
    /// Unwrap into the generic grid regardless of specialization
    #[must_use]
    pub fn into_grid(self) -> FitGrid {
        match self {
            Self::Ols(grid) => grid.into_inner(),
            Self::Other(grid) => grid,
        }
    }
}

pub(crate) fn save_grid(grid: &FitGrid, path: &Path) -> Result<()> {
    let (rows, cols) = grid.shape();
    let mut cells = Vec::with_capacity(rows * cols);
    for t in 0..rows {
        for c in 0..cols {
            cells.push(grid.cell(t, c).to_value()?);
        }
    }
    let envelope = GridEnvelope {
        format_version: GRID_FORMAT_VERSION,
        kind: grid.kind().to_string(),
        times: grid.times().to_vec(),
        channels: grid.channels().to_vec(),
        epoch_index: grid.epoch_index().to_vec(),
        cells,
    };
    let file = File::create(path)?;
    serde_json::to_writer(BufWriter::new(file), &envelope)?;
    debug!(path = %path.display(), kind = %envelope.kind, "saved grid");
    Ok(())
}

/// Load a grid saved by [`FitGrid::save`].
///
/// The format version is checked before any cell data is decoded; the
/// kind tag of the cells selects the reconstructed specialization.
///
/// # Errors
///
/// Returns [`Error::UnsupportedFormatVersion`] for a version mismatch and
/// [`Error::Persist`] for a malformed envelope.
pub fn load_grid<P: AsRef<Path>>(path: P) -> Result<LoadedGrid> {
    let file = File::open(path.as_ref())?;
    let raw: Value = serde_json::from_reader(BufReader::new(file))?;

    let found = raw
        .get("format_version")
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::Persist("missing format_version field".to_string()))?;
    if found != u64::from(GRID_FORMAT_VERSION) {
        #[allow(clippy::cast_possible_truncation)]
        let found = found.min(u64::from(u32::MAX)) as u32;
        return Err(Error::UnsupportedFormatVersion {
            found,
            supported: GRID_FORMAT_VERSION,
        });
    }

    let envelope: GridEnvelope = serde_json::from_value(raw)?;
    if envelope.cells.is_empty() {
        return Err(Error::Persist("grid file contains no cells".to_string()));
    }
    if envelope.cells.len() != envelope.times.len() * envelope.channels.len() {
        return Err(Error::Persist(format!(
            "expected {} cells for a {} x {} grid, found {}",
            envelope.times.len() * envelope.channels.len(),
            envelope.times.len(),
            envelope.channels.len(),
            envelope.cells.len(),
        )));
    }

    let kind = envelope.kind.clone();
    let cells: Vec<Box<dyn FitResult>> = if kind == OLS_KIND {
        envelope
            .cells
            .into_iter()
            .map(|value| {
                let fit: OlsFit = serde_json::from_value(value)?;
                Ok(Box::new(fit) as Box<dyn FitResult>)
            })
            .collect::<Result<_>>()?
    } else {
        envelope
            .cells
            .into_iter()
            .map(|value| Box::new(GenericFit::new(kind.clone(), value)) as Box<dyn FitResult>)
            .collect()
    };

    let grid = FitGrid::new(envelope.times, envelope.channels, cells, envelope.epoch_index);
    debug!(kind = %kind, "loaded grid");

    Ok(if kind == OLS_KIND {
        LoadedGrid::Ols(OlsGrid::new(grid))
    } else {
        LoadedGrid::Other(grid)
    })
}
