//! # epochgrid: per-timepoint regression grids over epoched data
//!
//! epochgrid fits a separate statistical model at every (timepoint,
//! channel) cell of a collection of time-aligned trials ("epochs") and
//! collects the results into a grid with vectorized attribute extraction.
//!
//! The pipeline: a long-form table (one row per epoch × timepoint) is
//! validated so that every timepoint sees the identical set of epochs,
//! wrapped in an [`Epochs`] container, and mapped (serially or on a
//! bounded worker pool) through a user-supplied fitting callable. The
//! resulting [`FitGrid`] extracts any attribute the fitted models expose
//! as a time × channel table, lazily and cached, and round-trips through
//! [`FitGrid::save`] / [`io::load_grid`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use epochgrid::{Epochs, EpochsTable, Column, FitOptions, TableConfig};
//!
//! let table = EpochsTable::new(vec![
//!     ("time".into(), Column::Int64(vec![0, 0, 1, 1])),
//!     ("epoch_id".into(), Column::Int64(vec![1, 2, 1, 2])),
//!     ("MiPa".into(), Column::Float64(vec![0.1, 0.4, 0.2, 0.3])),
//!     ("stimulus".into(), Column::Float64(vec![1.0, 2.0, 1.0, 2.0])),
//! ])?;
//! let epochs = Epochs::new(
//!     table,
//!     TableConfig::new("time", "epoch_id"),
//!     vec!["MiPa".to_string()],
//! )?;
//!
//! let grid = epochs.ols(None, "stimulus", &FitOptions::default())?;
//! let slopes = grid.params()?;
//! # Ok::<(), epochgrid::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod epochs;
pub mod error;
pub mod grid;
pub mod io;
pub mod models;
pub mod runner;
pub mod table;

pub use epochs::Epochs;
pub use error::{Error, Result};
pub use grid::{FitGrid, OlsGrid, ScalarTable, VectorEntry, VectorTable};
pub use io::{epochs_from_batches, epochs_from_ipc, epochs_from_parquet, load_grid, LoadedGrid};
pub use models::{AttrValue, FitResult, GenericFit, OlsFit};
pub use runner::{FitOptions, DEFAULT_WORKERS};
pub use table::{Column, EpochsTable, Key, Snapshot, TableConfig, DEFAULT_EPOCH_ID, DEFAULT_TIME};
