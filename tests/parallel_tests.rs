//! Serial / parallel equivalence of the fitting map
//!
//! For any deterministic callable the assembled grid must be
//! extraction-equivalent between serial mode and parallel mode, for every
//! worker-pool size >= 1.

use epochgrid::{
    Column, Epochs, EpochsTable, Error, FitOptions, FitResult, GenericFit, TableConfig,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

/// Route fit-boundary debug events to the test writer, filtered by RUST_LOG
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn random_epochs(n_epochs: i64, n_times: i64, seed: u64) -> Epochs {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut time = Vec::new();
    let mut epoch_id = Vec::new();
    let mut ch0 = Vec::new();
    let mut ch1 = Vec::new();
    let mut covariate = Vec::new();
    for t in 0..n_times {
        for e in 0..n_epochs {
            time.push(t);
            epoch_id.push(e);
            ch0.push(rng.gen_range(-1.0..1.0));
            ch1.push(rng.gen_range(-1.0..1.0));
            #[allow(clippy::cast_precision_loss)]
            covariate.push(e as f64);
        }
    }
    let table = EpochsTable::new(vec![
        ("time".to_string(), Column::Int64(time)),
        ("epoch_id".to_string(), Column::Int64(epoch_id)),
        ("ch0".to_string(), Column::Float64(ch0)),
        ("ch1".to_string(), Column::Float64(ch1)),
        ("covariate".to_string(), Column::Float64(covariate)),
    ])
    .unwrap();
    Epochs::new(
        table,
        TableConfig::new("time", "epoch_id"),
        vec!["ch0".to_string(), "ch1".to_string()],
    )
    .unwrap()
}

fn summarize(snapshot: &epochgrid::Snapshot<'_>, channel: &str) -> epochgrid::Result<Box<dyn FitResult>> {
    let values = snapshot.f64_column(channel)?;
    let sum: f64 = values.iter().sum();
    Ok(Box::new(GenericFit::new(
        "summary".to_string(),
        json!({
            "sum": sum,
            "cell": format!("{}:{}", snapshot.time(), channel),
        }),
    )) as Box<dyn FitResult>)
}

#[test]
fn test_parallel_matches_serial_for_all_pool_sizes() {
    let epochs = random_epochs(8, 12, 42);
    let serial = epochs
        .fit(summarize, None, &FitOptions::serial())
        .unwrap();
    let serial_sums = serial.extract_scalar("sum").unwrap();
    let serial_cells = serial.extract_scalar("cell").unwrap();

    for workers in [1, 2, 4, 8] {
        let parallel = epochs
            .fit(summarize, None, &FitOptions::parallel(workers))
            .unwrap();
        assert_eq!(parallel.times(), serial.times());
        assert_eq!(parallel.channels(), serial.channels());
        assert_eq!(
            *parallel.extract_scalar("sum").unwrap(),
            *serial_sums,
            "sum mismatch with {workers} workers"
        );
        assert_eq!(
            *parallel.extract_scalar("cell").unwrap(),
            *serial_cells,
            "cell address mismatch with {workers} workers"
        );
    }
}

#[test]
fn test_parallel_ols_matches_serial() {
    let epochs = random_epochs(6, 5, 7);
    let serial = epochs
        .ols(None, "covariate", &FitOptions::serial())
        .unwrap();
    let parallel = epochs
        .ols(None, "covariate", &FitOptions::parallel(3))
        .unwrap();

    assert_eq!(*serial.params().unwrap(), *parallel.params().unwrap());
    assert_eq!(*serial.rsquared().unwrap(), *parallel.rsquared().unwrap());
    assert_eq!(*serial.residuals().unwrap(), *parallel.residuals().unwrap());
}

#[test]
fn test_parallel_error_aborts_like_serial() {
    let epochs = random_epochs(4, 10, 3);
    let fail_fast = |snapshot: &epochgrid::Snapshot<'_>,
                     _channel: &str|
     -> epochgrid::Result<Box<dyn FitResult>> {
        if snapshot.time().to_string() == "6" {
            Err(Error::Other("singular matrix".to_string()))
        } else {
            Ok(Box::new(GenericFit::new("ok".to_string(), json!({ "v": 1 })))
                as Box<dyn FitResult>)
        }
    };

    let err = epochs
        .fit(fail_fast, None, &FitOptions::parallel(4))
        .unwrap_err();
    match err {
        Error::Fit { time, source, .. } => {
            assert_eq!(time.to_string(), "6");
            assert_eq!(source.to_string(), "singular matrix");
        }
        other => panic!("expected Fit, got: {other}"),
    }
}
