//! Long-form table validation
//!
//! Partitions a table by its time key and checks that every partition sees
//! the identical epoch-id sequence (by value and order) with no duplicates.
//! Consecutive-pair comparison suffices by transitivity.

use super::{Column, EpochsTable, Key, TableConfig};
use crate::{Error, Result};
use rustc_hash::FxHashMap;
use std::ops::Range;
use tracing::debug;

/// Time-sorted row order plus partition bounds into it
#[derive(Debug, Clone)]
pub(crate) struct Partitions {
    /// Table row indices, stable-sorted by time key
    pub row_order: Vec<usize>,
    /// One (time key, range into `row_order`) per partition, in time order
    pub bounds: Vec<(Key, Range<usize>)>,
}

impl Partitions {
    pub(crate) fn times(&self) -> Vec<Key> {
        self.bounds.iter().map(|(time, _)| time.clone()).collect()
    }
}

/// Validate a long-form table against its identifying columns.
///
/// On success returns the time partitioning and the epoch index captured
/// from the first partition.
pub(crate) fn validate(
    table: &EpochsTable,
    config: &TableConfig,
) -> Result<(Partitions, Vec<Key>)> {
    let time_col = key_column(table, &config.time)?;
    let epoch_col = key_column(table, &config.epoch_id)?;

    // Stable sort keeps the original row order within each partition, so
    // partition comparison is order-sensitive like the epoch index itself.
    let time_keys: Vec<Key> = (0..table.num_rows())
        .map(|row| time_col.key_at(row).expect("key-typed column"))
        .collect();
    let mut row_order: Vec<usize> = (0..table.num_rows()).collect();
    row_order.sort_by(|&a, &b| time_keys[a].cmp(&time_keys[b]));

    let mut bounds: Vec<(Key, Range<usize>)> = Vec::new();
    let mut start = 0;
    for pos in 1..=row_order.len() {
        if pos == row_order.len() || time_keys[row_order[pos]] != time_keys[row_order[start]] {
            bounds.push((time_keys[row_order[start]].clone(), start..pos));
            start = pos;
        }
    }

    let partitions = Partitions { row_order, bounds };
    let epoch_index = check_alignment(&partitions, epoch_col)?;
    check_duplicates(&epoch_index)?;

    debug!(
        partitions = partitions.bounds.len(),
        epochs = epoch_index.len(),
        "validated epochs table"
    );

    Ok((partitions, epoch_index))
}

fn key_column<'a>(table: &'a EpochsTable, name: &str) -> Result<&'a Column> {
    let column = table
        .column(name)
        .ok_or_else(|| Error::MissingIndexColumn {
            name: name.to_string(),
        })?;
    if matches!(column, Column::Float64(_)) {
        return Err(Error::KeyType {
            name: name.to_string(),
            actual: column.type_name(),
        });
    }
    Ok(column)
}

/// Check consecutive partitions for an identical epoch-id sequence; returns
/// the sequence of the first partition.
fn check_alignment(partitions: &Partitions, epoch_col: &Column) -> Result<Vec<Key>> {
    let ids_of = |range: &Range<usize>| -> Vec<Key> {
        partitions.row_order[range.clone()]
            .iter()
            .map(|&row| epoch_col.key_at(row).expect("key-typed column"))
            .collect()
    };

    let mut prev: Option<Vec<Key>> = None;
    for (time, range) in &partitions.bounds {
        let current = ids_of(range);
        if let Some(previous) = prev {
            if current != previous {
                return Err(Error::MisalignedSnapshot {
                    time: time.clone(),
                    current: format_keys(&current),
                    previous: format_keys(&previous),
                });
            }
        }
        prev = Some(current);
    }

    // bounds is non-empty because EpochsTable rejects zero rows
    let (_, first) = &partitions.bounds[0];
    Ok(ids_of(first))
}

fn check_duplicates(epoch_index: &[Key]) -> Result<()> {
    let mut seen: FxHashMap<&Key, usize> = FxHashMap::default();
    for key in epoch_index {
        *seen.entry(key).or_insert(0) += 1;
    }
    let mut dupes: Vec<&Key> = seen
        .into_iter()
        .filter(|&(_, count)| count > 1)
        .map(|(key, _)| key)
        .collect();
    if dupes.is_empty() {
        return Ok(());
    }
    dupes.sort();
    Err(Error::DuplicateEpochIds {
        dupes: format_keys(&dupes.into_iter().cloned().collect::<Vec<_>>()),
    })
}

fn format_keys(keys: &[Key]) -> String {
    let items: Vec<String> = keys.iter().map(ToString::to_string).collect();
    format!("[{}]", items.join(", "))
}
