//! Time × channel grid of fitted-model results
//!
//! A [`FitGrid`] holds one opaque fitted-model object per (time, channel)
//! cell and extracts attributes across the whole grid at once:
//! [`FitGrid::extract_scalar`] yields a time × channel table,
//! [`FitGrid::extract_vector`] flattens one extra labeled dimension.
//! Extraction is lazy and cached per attribute name; nothing is precomputed
//! at construction because the cells' attribute surface is open-ended.
//!
//! The caches use interior mutability (`RefCell`), so a grid is not `Sync`:
//! concurrent extraction from multiple threads is ruled out by construction.

mod ols;

pub use ols::OlsGrid;

use crate::models::{AttrValue, FitResult};
use crate::table::Key;
use crate::{Error, Result};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

/// Time × channel table of scalar attribute values
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarTable {
    times: Vec<Key>,
    channels: Vec<String>,
    values: Vec<AttrValue>,
}

impl ScalarTable {
    pub(crate) fn new(times: Vec<Key>, channels: Vec<String>, values: Vec<AttrValue>) -> Self {
        debug_assert_eq!(values.len(), times.len() * channels.len());
        Self {
            times,
            channels,
            values,
        }
    }

    /// Row keys (time order)
    #[must_use]
    pub fn times(&self) -> &[Key] {
        &self.times
    }

    /// Column names (caller order)
    #[must_use]
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Value at (row, column) position
    #[must_use]
    pub fn value(&self, time_idx: usize, channel_idx: usize) -> &AttrValue {
        &self.values[time_idx * self.channels.len() + channel_idx]
    }

    /// Value at a (time key, channel name) address
    #[must_use]
    pub fn get(&self, time: &Key, channel: &str) -> Option<&AttrValue> {
        let t = self.times.iter().position(|k| k == time)?;
        let c = self.channels.iter().position(|n| n == channel)?;
        Some(self.value(t, c))
    }
}

/// One (time, channel, label) row of a [`VectorTable`]
#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
    /// Time key
    pub time: Key,
    /// Channel name
    pub channel: String,
    /// Vector label (regressor name, epoch id, ...)
    pub label: String,
    /// Value
    pub value: f64,
}

/// Flattened (time, channel, label) → value table of a vector attribute
#[derive(Debug, Clone, PartialEq)]
pub struct VectorTable {
    entries: Vec<VectorEntry>,
}

impl VectorTable {
    /// All rows, grouped by time then channel, labels in cell order
    #[must_use]
    pub fn entries(&self) -> &[VectorEntry] {
        &self.entries
    }

    /// Value at a (time, channel, label) address
    #[must_use]
    pub fn get(&self, time: &Key, channel: &str, label: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.time == *time && e.channel == channel && e.label == label)
            .map(|e| e.value)
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the table has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rectangular grid of fitted-model results.
///
/// Rows are time keys in time order, columns are channels in the order the
/// fit was requested with. Every cell is populated; construction is private
/// to the crate, so a partially-fit grid cannot exist.
pub struct FitGrid {
    times: Vec<Key>,
    channels: Vec<String>,
    cells: Vec<Box<dyn FitResult>>,
    epoch_index: Vec<Key>,
    scalar_cache: RefCell<FxHashMap<String, Rc<ScalarTable>>>,
    vector_cache: RefCell<FxHashMap<String, Rc<VectorTable>>>,
}

impl std::fmt::Debug for FitGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FitGrid")
            .field("times", &self.times)
            .field("channels", &self.channels)
            .field("cells", &self.cells.len())
            .field("epoch_index", &self.epoch_index)
            .finish()
    }
}

impl FitGrid {
    pub(crate) fn new(
        times: Vec<Key>,
        channels: Vec<String>,
        cells: Vec<Box<dyn FitResult>>,
        epoch_index: Vec<Key>,
    ) -> Self {
        debug_assert_eq!(cells.len(), times.len() * channels.len());
        Self {
            times,
            channels,
            cells,
            epoch_index,
            scalar_cache: RefCell::new(FxHashMap::default()),
            vector_cache: RefCell::new(FxHashMap::default()),
        }
    }

    /// Row keys (time order)
    #[must_use]
    pub fn times(&self) -> &[Key] {
        &self.times
    }

    /// Column names (fit-request order)
    #[must_use]
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Epoch index the fitted grid was built over
    #[must_use]
    pub fn epoch_index(&self) -> &[Key] {
        &self.epoch_index
    }

    /// (rows, columns)
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.times.len(), self.channels.len())
    }

    /// Kind tag of the contained fitted-model objects
    #[must_use]
    pub fn kind(&self) -> &str {
        self.cells[0].kind()
    }

    /// The fitted-model object at (row, column) position
    #[must_use]
    pub fn cell(&self, time_idx: usize, channel_idx: usize) -> &dyn FitResult {
        self.cells[time_idx * self.channels.len() + channel_idx].as_ref()
    }

    /// Extract a scalar attribute across the whole grid.
    ///
    /// Lazy and cached: the first call reflects over every cell, later
    /// calls for the same name return the cached table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingAttribute`] naming the first cell that does
    /// not expose the attribute.
    pub fn extract_scalar(&self, attr: &str) -> Result<Rc<ScalarTable>> {
        if let Some(table) = self.scalar_cache.borrow().get(attr) {
            return Ok(Rc::clone(table));
        }
        let mut values = Vec::with_capacity(self.cells.len());
        for (idx, cell) in self.cells.iter().enumerate() {
            let value = cell
                .scalar_attr(attr)
                .ok_or_else(|| self.missing_attribute(attr, idx, cell.as_ref()))?;
            values.push(value);
        }
        let table = Rc::new(ScalarTable::new(
            self.times.clone(),
            self.channels.clone(),
            values,
        ));
        self.scalar_cache
            .borrow_mut()
            .insert(attr.to_string(), Rc::clone(&table));
        Ok(table)
    }

    /// Extract a labeled-vector attribute across the whole grid, flattened
    /// to (time, channel, label) rows.
    ///
    /// Lazy and cached like [`extract_scalar`](Self::extract_scalar).
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingAttribute`] naming the first cell that does
    /// not expose the attribute.
    pub fn extract_vector(&self, attr: &str) -> Result<Rc<VectorTable>> {
        if let Some(table) = self.vector_cache.borrow().get(attr) {
            return Ok(Rc::clone(table));
        }
        let mut entries = Vec::new();
        for (idx, cell) in self.cells.iter().enumerate() {
            let vector = cell
                .vector_attr(attr)
                .ok_or_else(|| self.missing_attribute(attr, idx, cell.as_ref()))?;
            let (time, channel) = self.address(idx);
            for (label, value) in vector {
                entries.push(VectorEntry {
                    time: time.clone(),
                    channel: channel.to_string(),
                    label,
                    value,
                });
            }
        }
        let table = Rc::new(VectorTable { entries });
        self.vector_cache
            .borrow_mut()
            .insert(attr.to_string(), Rc::clone(&table));
        Ok(table)
    }

    /// Persist the grid to a JSON envelope at `path`.
    ///
    /// A grid reloaded via [`crate::io::load_grid`] extracts identically to
    /// this one for every attribute valid before saving.
    ///
    /// # Errors
    ///
    /// Returns an error if a cell cannot be serialized or the file cannot
    /// be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        crate::io::save_grid(self, path.as_ref())
    }

    fn address(&self, cell_idx: usize) -> (&Key, &str) {
        (
            &self.times[cell_idx / self.channels.len()],
            &self.channels[cell_idx % self.channels.len()],
        )
    }

    fn missing_attribute(&self, attr: &str, cell_idx: usize, cell: &dyn FitResult) -> Error {
        let (time, channel) = self.address(cell_idx);
        Error::MissingAttribute {
            attr: attr.to_string(),
            time: time.clone(),
            channel: channel.to_string(),
            kind: cell.kind().to_string(),
        }
    }
}
