//! Grid fitting: OLS recovery, callable contract, abort-on-error

use epochgrid::{
    AttrValue, Column, Epochs, EpochsTable, Error, FitOptions, FitResult, GenericFit, Key,
    TableConfig,
};
use serde_json::json;

const TOL: f64 = 1e-9;

/// Route fit-boundary debug events to the test writer, filtered by RUST_LOG
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config() -> TableConfig {
    TableConfig::new("time", "epoch_id")
}

/// 3 trials x 4 timepoints x 2 channels: channel "A" is 1 + 2 * stimulus,
/// channel "B" is constant.
fn linear_epochs() -> Epochs {
    init_tracing();
    let mut time = Vec::new();
    let mut epoch_id = Vec::new();
    let mut stimulus = Vec::new();
    let mut ch_a = Vec::new();
    let mut ch_b = Vec::new();
    for t in 0..4_i64 {
        for e in 0..3_i64 {
            #[allow(clippy::cast_precision_loss)]
            let x = (e + 1) as f64;
            time.push(t);
            epoch_id.push(e);
            stimulus.push(x);
            ch_a.push(1.0 + 2.0 * x);
            ch_b.push(5.0);
        }
    }
    let table = EpochsTable::new(vec![
        ("time".to_string(), Column::Int64(time)),
        ("epoch_id".to_string(), Column::Int64(epoch_id)),
        ("stimulus".to_string(), Column::Float64(stimulus)),
        ("A".to_string(), Column::Float64(ch_a)),
        ("B".to_string(), Column::Float64(ch_b)),
    ])
    .unwrap();
    Epochs::new(
        table,
        config(),
        vec!["A".to_string(), "B".to_string()],
    )
    .unwrap()
}

#[test]
fn test_ols_recovers_generating_coefficients() {
    let epochs = linear_epochs();
    let grid = epochs.ols(None, "stimulus", &FitOptions::default()).unwrap();
    let params = grid.params().unwrap();

    for time in grid.times() {
        let slope_a = params.get(time, "A", "stimulus").unwrap();
        let intercept_a = params.get(time, "A", "Intercept").unwrap();
        assert!((slope_a - 2.0).abs() < TOL, "slope at {time}: {slope_a}");
        assert!(
            (intercept_a - 1.0).abs() < TOL,
            "intercept at {time}: {intercept_a}"
        );

        let slope_b = params.get(time, "B", "stimulus").unwrap();
        let intercept_b = params.get(time, "B", "Intercept").unwrap();
        assert!(slope_b.abs() < TOL, "slope at {time}: {slope_b}");
        assert!(
            (intercept_b - 5.0).abs() < TOL,
            "intercept at {time}: {intercept_b}"
        );
    }
}

#[test]
fn test_ols_grid_shape_and_fit_quality() {
    let epochs = linear_epochs();
    let grid = epochs.ols(None, "stimulus", &FitOptions::default()).unwrap();
    assert_eq!(grid.shape(), (4, 2));

    // channel A is exactly linear in stimulus
    let rsquared = grid.rsquared().unwrap();
    for t in 0..4 {
        let r2 = rsquared.value(t, 0).as_f64().unwrap();
        assert!((r2 - 1.0).abs() < TOL, "rsquared at row {t}: {r2}");
    }

    // residuals are labeled per epoch and near zero
    let residuals = grid.residuals().unwrap();
    assert_eq!(residuals.len(), 4 * 2 * 3);
    for entry in residuals.entries() {
        assert!(entry.value.abs() < TOL);
    }
}

#[test]
fn test_fit_lhs_subset_and_order() {
    let epochs = linear_epochs();
    let lhs = vec!["B".to_string()];
    let grid = epochs.ols(Some(&lhs), "stimulus", &FitOptions::default()).unwrap();
    assert_eq!(grid.channels(), &["B".to_string()]);
    assert_eq!(grid.shape(), (4, 1));
}

#[test]
fn test_fit_unknown_channel_rejected() {
    let epochs = linear_epochs();
    let lhs = vec!["A".to_string(), "nope".to_string()];
    let err = epochs
        .ols(Some(&lhs), "stimulus", &FitOptions::default())
        .unwrap_err();
    match err {
        Error::MissingChannels { missing } => assert_eq!(missing, vec!["nope".to_string()]),
        other => panic!("expected MissingChannels, got: {other}"),
    }
}

#[test]
fn test_unknown_formula_term_rejected() {
    let epochs = linear_epochs();
    let err = epochs
        .ols(None, "no_such_covariate", &FitOptions::default())
        .unwrap_err();
    match err {
        Error::Fit { source, .. } => {
            assert!(matches!(source.as_ref(), Error::Formula(_)), "source: {source}");
        }
        other => panic!("expected Fit wrapping Formula, got: {other}"),
    }
}

#[test]
fn test_callable_receives_each_time_and_channel_once() {
    let epochs = linear_epochs();
    let grid = epochs
        .fit(
            |snapshot, channel| {
                let values = snapshot.f64_column(channel)?;
                #[allow(clippy::cast_precision_loss)]
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                Ok(Box::new(GenericFit::new(
                    "mean".to_string(),
                    json!({ "mean": mean, "time": snapshot.time().to_string() }),
                )) as Box<dyn FitResult>)
            },
            None,
            &FitOptions::default(),
        )
        .unwrap();

    let means = grid.extract_scalar("mean").unwrap();
    // channel A means: 1 + 2 * mean(1, 2, 3) = 5
    for t in 0..4 {
        assert_eq!(means.value(t, 0), &AttrValue::Float(5.0));
        assert_eq!(means.value(t, 1), &AttrValue::Float(5.0));
    }
    // cells saw the timepoint they were fit against
    let tags = grid.extract_scalar("time").unwrap();
    for (t, time) in grid.times().iter().enumerate() {
        assert_eq!(tags.value(t, 0), &AttrValue::Str(time.to_string()));
    }
}

#[test]
fn test_callable_error_aborts_whole_fit() {
    let epochs = linear_epochs();
    let times: Vec<Key> = epochs.times();
    let failing_time = times[2].clone();

    let err = epochs
        .fit(
            |snapshot, channel| {
                if snapshot.time() == &failing_time {
                    return Err(Error::Other("did not converge".to_string()));
                }
                let _ = snapshot.f64_column(channel)?;
                Ok(Box::new(GenericFit::new("ok".to_string(), json!({})))
                    as Box<dyn FitResult>)
            },
            None,
            &FitOptions::default(),
        )
        .unwrap_err();

    match err {
        Error::Fit { time, channel, source } => {
            assert_eq!(time, failing_time);
            assert_eq!(channel, "A");
            assert_eq!(source.to_string(), "did not converge");
        }
        other => panic!("expected Fit, got: {other}"),
    }
}

#[test]
fn test_ols_with_categorical_covariate() {
    // condition is a string column, dummy-coded against level "ctl"
    let table = EpochsTable::new(vec![
        ("time".to_string(), Column::Int64(vec![0, 0, 0, 0, 1, 1, 1, 1])),
        (
            "epoch_id".to_string(),
            Column::Int64(vec![1, 2, 3, 4, 1, 2, 3, 4]),
        ),
        (
            "condition".to_string(),
            Column::Utf8(
                ["ctl", "ctl", "trt", "trt", "ctl", "ctl", "trt", "trt"]
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            ),
        ),
        (
            "A".to_string(),
            Column::Float64(vec![1.0, 1.0, 3.0, 3.0, 1.0, 1.0, 3.0, 3.0]),
        ),
    ])
    .unwrap();
    let epochs = Epochs::new(table, config(), vec!["A".to_string()]).unwrap();
    let grid = epochs.ols(None, "condition", &FitOptions::default()).unwrap();
    let params = grid.params().unwrap();

    let effect = params.get(&Key::Int(0), "A", "condition[trt]").unwrap();
    assert!((effect - 2.0).abs() < TOL, "treatment effect: {effect}");
}
