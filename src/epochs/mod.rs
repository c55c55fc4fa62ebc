//! Epochs container
//!
//! Owns a validated long-form table and exposes the per-timepoint fitting
//! map. Construction takes the table by value, so the container's copy can
//! never be observed or mutated through a caller-held alias; the container
//! is read-only afterwards.

use crate::grid::{FitGrid, OlsGrid, ScalarTable};
use crate::models::{AttrValue, FitResult, OlsFit};
use crate::runner::{self, FitOptions};
use crate::table::validate::{validate, Partitions};
use crate::table::{Column, EpochsTable, Key, Snapshot, TableConfig};
use crate::{Error, Result};
use tracing::debug;

/// Container for a validated epochs table.
///
/// Every time partition is guaranteed to expose the identical epoch-id
/// sequence, captured once as the epoch index.
#[derive(Debug)]
pub struct Epochs {
    table: EpochsTable,
    config: TableConfig,
    channels: Vec<String>,
    partitions: Partitions,
    epoch_index: Vec<Key>,
}

impl Epochs {
    /// Validate a long-form table and build the container.
    ///
    /// `channels` are the dependent-variable columns later fits default to.
    ///
    /// # Errors
    ///
    /// Returns an error if an identifying column is missing, a channel is
    /// absent from the table, time partitions disagree on their epoch ids,
    /// or a partition contains duplicate epoch ids.
    pub fn new(table: EpochsTable, config: TableConfig, channels: Vec<String>) -> Result<Self> {
        check_channels(&table, &channels)?;
        let (partitions, epoch_index) = validate(&table, &config)?;
        Ok(Self {
            table,
            config,
            channels,
            partitions,
            epoch_index,
        })
    }

    /// Default channel list given at construction
    #[must_use]
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Epoch-id index shared by every time partition
    #[must_use]
    pub fn epoch_index(&self) -> &[Key] {
        &self.epoch_index
    }

    /// Time keys, in order
    #[must_use]
    pub fn times(&self) -> Vec<Key> {
        self.partitions.times()
    }

    /// Number of time partitions
    #[must_use]
    pub fn num_timepoints(&self) -> usize {
        self.partitions.bounds.len()
    }

    /// Run an arbitrary fitting callable over every (time, channel) cell.
    ///
    /// The callable receives one timepoint's [`Snapshot`] and a channel
    /// name, and returns an opaque fitted-model object. It must be
    /// deterministic and must not rely on shared mutable state; in
    /// parallel mode the per-timepoint work units run concurrently.
    ///
    /// `channels` of `None` fits the construction channel list.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown channels, or the first callable
    /// failure wrapped with its (time, channel) context. No partial grid
    /// is ever returned.
    pub fn fit<F>(
        &self,
        function: F,
        channels: Option<&[String]>,
        options: &FitOptions,
    ) -> Result<FitGrid>
    where
        F: Fn(&Snapshot<'_>, &str) -> Result<Box<dyn FitResult>> + Sync,
    {
        let channels = self.resolve_channels(channels)?;
        let snapshots = self.snapshots();
        debug!(
            timepoints = snapshots.len(),
            channels = channels.len(),
            parallel = options.parallel,
            "fitting model grid"
        );
        let rows = runner::run_model(&snapshots, &channels, &function, options)?;
        let cells: Vec<Box<dyn FitResult>> = rows.into_iter().flatten().collect();
        Ok(FitGrid::new(
            self.times(),
            channels,
            cells,
            self.epoch_index.clone(),
        ))
    }

    /// Fit ordinary least squares per cell: `channel ~ rhs`.
    ///
    /// Thin adapter over [`fit`](Self::fit) closing over the formula
    /// right-hand side. `lhs` of `None` fits the construction channels.
    ///
    /// # Errors
    ///
    /// As [`fit`](Self::fit), plus formula errors.
    pub fn ols(
        &self,
        lhs: Option<&[String]>,
        rhs: &str,
        options: &FitOptions,
    ) -> Result<OlsGrid> {
        // surface formula errors before any fitting work starts
        crate::models::formula::parse_rhs(rhs)?;
        let grid = self.fit(
            |snapshot, channel| {
                OlsFit::fit(snapshot, channel, rhs).map(|fit| Box::new(fit) as Box<dyn FitResult>)
            },
            lhs,
            options,
        )?;
        Ok(OlsGrid::new(grid))
    }

    /// Scaled Euclidean distance of each epoch from the mean trajectory.
    ///
    /// The L2 norm is taken over samples, then over channels, and the
    /// result is divided by the maximum distance, so values lie in [0, 1]
    /// with exactly one epoch at 1.0, unless all epochs are identical, in
    /// which case every distance is defined as 0.
    ///
    /// # Errors
    ///
    /// Returns an error if a channel column is not numeric.
    pub fn distances(&self) -> Result<Vec<(Key, f64)>> {
        let n_epochs = self.epoch_index.len();
        let n_times = self.partitions.bounds.len();
        let n_channels = self.channels.len();

        // values[epoch][time][channel], epoch in index order
        let mut values = vec![0.0; n_epochs * n_times * n_channels];
        for (t, (_, range)) in self.partitions.bounds.iter().enumerate() {
            for (c, channel) in self.channels.iter().enumerate() {
                let column = self.numeric_channel(channel)?;
                for (e, &row) in self.partitions.row_order[range.clone()].iter().enumerate() {
                    values[(e * n_times + t) * n_channels + c] =
                        column.f64_at(row).ok_or(Error::ColumnType {
                            name: channel.clone(),
                            expected: "float64 or int64",
                            actual: column.type_name(),
                        })?;
                }
            }
        }

        let cell = |e: usize, t: usize, c: usize| values[(e * n_times + t) * n_channels + c];

        #[allow(clippy::cast_precision_loss)]
        let mean: Vec<f64> = (0..n_times * n_channels)
            .map(|tc| (0..n_epochs).map(|e| values[e * n_times * n_channels + tc]).sum::<f64>() / n_epochs as f64)
            .collect();

        let mut distances: Vec<f64> = (0..n_epochs)
            .map(|e| {
                let mut sum_sq = 0.0;
                for t in 0..n_times {
                    for c in 0..n_channels {
                        let diff = cell(e, t, c) - mean[t * n_channels + c];
                        sum_sq += diff * diff;
                    }
                }
                sum_sq.sqrt()
            })
            .collect();

        let max = distances.iter().copied().fold(0.0_f64, f64::max);
        if max > 0.0 {
            for d in &mut distances {
                *d /= max;
            }
        } else {
            // all epochs identical: 0/0 is defined as 0
            distances.iter_mut().for_each(|d| *d = 0.0);
        }

        Ok(self.epoch_index.iter().cloned().zip(distances).collect())
    }

    /// Across-epoch mean of every channel at every timepoint
    ///
    /// # Errors
    ///
    /// Returns an error if a channel column is not numeric.
    pub fn snapshot_means(&self) -> Result<ScalarTable> {
        let mut values = Vec::with_capacity(self.partitions.bounds.len() * self.channels.len());
        for (_, range) in &self.partitions.bounds {
            for channel in &self.channels {
                let column = self.numeric_channel(channel)?;
                let rows = &self.partitions.row_order[range.clone()];
                #[allow(clippy::cast_precision_loss)]
                let mean = rows
                    .iter()
                    .filter_map(|&row| column.f64_at(row))
                    .sum::<f64>()
                    / rows.len() as f64;
                values.push(AttrValue::Float(mean));
            }
        }
        Ok(ScalarTable::new(
            self.times(),
            self.channels.clone(),
            values,
        ))
    }

    fn snapshots(&self) -> Vec<Snapshot<'_>> {
        let epoch_col = self
            .table
            .column(&self.config.epoch_id)
            .expect("validated at construction");
        self.partitions
            .bounds
            .iter()
            .map(|(time, range)| {
                Snapshot::new(
                    &self.table,
                    time,
                    &self.partitions.row_order[range.clone()],
                    epoch_col,
                )
            })
            .collect()
    }

    fn resolve_channels(&self, channels: Option<&[String]>) -> Result<Vec<String>> {
        match channels {
            None => Ok(self.channels.clone()),
            Some(list) => {
                check_channels(&self.table, list)?;
                Ok(list.to_vec())
            }
        }
    }

    fn numeric_channel(&self, name: &str) -> Result<&Column> {
        let column = self
            .table
            .column(name)
            .ok_or_else(|| Error::MissingChannels {
                missing: vec![name.to_string()],
            })?;
        if matches!(column, Column::Utf8(_)) {
            return Err(Error::ColumnType {
                name: name.to_string(),
                expected: "float64 or int64",
                actual: column.type_name(),
            });
        }
        Ok(column)
    }
}

fn check_channels(table: &EpochsTable, channels: &[String]) -> Result<()> {
    if channels.is_empty() {
        return Err(Error::EmptyChannelList);
    }
    let missing: Vec<String> = channels
        .iter()
        .filter(|c| !table.has_column(c))
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::MissingChannels { missing })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_epochs() -> Epochs {
        // 2 epochs x 3 timepoints, channel values diverge for epoch 11
        let table = EpochsTable::new(vec![
            ("time".to_string(), Column::Int64(vec![0, 0, 1, 1, 2, 2])),
            (
                "epoch_id".to_string(),
                Column::Int64(vec![10, 11, 10, 11, 10, 11]),
            ),
            (
                "ch0".to_string(),
                Column::Float64(vec![1.0, 3.0, 1.0, 3.0, 1.0, 3.0]),
            ),
        ])
        .unwrap();
        Epochs::new(
            table,
            TableConfig::new("time", "epoch_id"),
            vec!["ch0".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_missing_channel_reported() {
        let table = EpochsTable::new(vec![
            ("time".to_string(), Column::Int64(vec![0])),
            ("epoch_id".to_string(), Column::Int64(vec![1])),
        ])
        .unwrap();
        let err = Epochs::new(
            table,
            TableConfig::new("time", "epoch_id"),
            vec!["ch9".to_string()],
        )
        .unwrap_err();
        match err {
            Error::MissingChannels { missing } => assert_eq!(missing, vec!["ch9".to_string()]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_distances_scale_to_unit_max() {
        let epochs = toy_epochs();
        let distances = epochs.distances().unwrap();
        assert_eq!(distances.len(), 2);
        let max = distances.iter().map(|(_, d)| *d).fold(0.0_f64, f64::max);
        assert!((max - 1.0).abs() < 1e-12);
        for (_, d) in &distances {
            assert!((0.0..=1.0).contains(d));
        }
    }

    #[test]
    fn test_distances_all_identical_epochs_are_zero() {
        let table = EpochsTable::new(vec![
            ("time".to_string(), Column::Int64(vec![0, 0, 1, 1])),
            ("epoch_id".to_string(), Column::Int64(vec![10, 11, 10, 11])),
            ("ch0".to_string(), Column::Float64(vec![2.0, 2.0, 2.0, 2.0])),
        ])
        .unwrap();
        let epochs = Epochs::new(
            table,
            TableConfig::new("time", "epoch_id"),
            vec!["ch0".to_string()],
        )
        .unwrap();
        for (_, d) in epochs.distances().unwrap() {
            assert_eq!(d, 0.0);
        }
    }

    #[test]
    fn test_snapshot_means() {
        let epochs = toy_epochs();
        let means = epochs.snapshot_means().unwrap();
        assert_eq!(
            means.get(&Key::Int(0), "ch0"),
            Some(&AttrValue::Float(2.0))
        );
    }
}
