//! Built-in ordinary least squares fitter
//!
//! Solves one snapshot's `channel ~ RHS` regression by SVD least squares
//! and records the usual summary surface: coefficients, standard errors,
//! t-values, residuals, fitted values, and goodness-of-fit scalars.

use super::formula::build_design;
use super::{AttrValue, FitResult};
use crate::table::Snapshot;
use crate::{Error, Result};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind tag of OLS cells, used by grid persistence
pub const OLS_KIND: &str = "ols";

/// Singular values below this (relative) threshold are treated as zero
const SVD_EPS: f64 = 1e-12;

/// One fitted ordinary-least-squares model.
///
/// Vectors over coefficients (`params`, `bse`, `tvalues`) are labeled by
/// regressor name; vectors over observations (`resid`, `fittedvalues`) are
/// labeled by epoch id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OlsFit {
    formula: String,
    params: Vec<(String, f64)>,
    bse: Vec<(String, f64)>,
    tvalues: Vec<(String, f64)>,
    resid: Vec<(String, f64)>,
    fittedvalues: Vec<(String, f64)>,
    nobs: i64,
    df_resid: f64,
    ssr: f64,
    rsquared: f64,
    rsquared_adj: f64,
    llf: f64,
    aic: f64,
    bic: f64,
}

impl OlsFit {
    /// Fit `channel ~ rhs` against one snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid formula, a non-numeric channel, or a
    /// least-squares solve failure.
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(snapshot: &Snapshot<'_>, channel: &str, rhs: &str) -> Result<Self> {
        let design = build_design(snapshot, rhs)?;
        let y = DVector::from_vec(snapshot.f64_column(channel)?);
        let n = y.len();
        let p = design.names.len();

        let svd = design.matrix.clone().svd(true, true);
        let beta = svd
            .solve(&y, SVD_EPS)
            .map_err(|e| Error::Numeric(format!("least squares solve failed: {e}")))?;
        let beta = DVector::from_column_slice(beta.as_slice());

        let fitted = &design.matrix * &beta;
        let resid = &y - &fitted;
        let ssr = resid.norm_squared();

        let df_resid = (n as f64 - p as f64).max(0.0);
        let sigma2 = if df_resid > 0.0 { ssr / df_resid } else { 0.0 };

        // diag((X'X)^-1) from the SVD: V S^-2 V'
        let v_t = svd
            .v_t
            .as_ref()
            .ok_or_else(|| Error::Numeric("SVD did not produce V^T".to_string()))?;
        let s = &svd.singular_values;
        let s_max = s.iter().copied().fold(0.0_f64, f64::max);
        let tol = SVD_EPS * s_max;
        let mut bse = Vec::with_capacity(p);
        for j in 0..p {
            let mut diag = 0.0;
            for k in 0..s.len() {
                if s[k] > tol {
                    let v = v_t[(k, j)];
                    diag += v * v / (s[k] * s[k]);
                }
            }
            bse.push((sigma2 * diag).sqrt());
        }

        let tvalues: Vec<f64> = beta
            .iter()
            .zip(&bse)
            .map(|(b, se)| if *se > 0.0 { b / se } else { 0.0 })
            .collect();

        let mean = y.mean();
        let tss: f64 = y.iter().map(|v| (v - mean) * (v - mean)).sum();
        let rsquared = if tss > 0.0 { 1.0 - ssr / tss } else { 0.0 };
        let rsquared_adj = if df_resid > 0.0 && tss > 0.0 {
            1.0 - (1.0 - rsquared) * (n as f64 - 1.0) / df_resid
        } else {
            0.0
        };

        // clamp keeps llf finite (and JSON-representable) for exact fits
        let sigma2_ml = (ssr / n as f64).max(f64::MIN_POSITIVE);
        let llf = -0.5
            * n as f64
            * ((2.0 * std::f64::consts::PI).ln() + sigma2_ml.ln() + 1.0);
        let aic = 2.0 * p as f64 - 2.0 * llf;
        let bic = (n as f64).ln() * p as f64 - 2.0 * llf;

        let epoch_labels: Vec<String> = snapshot
            .epoch_ids()
            .iter()
            .map(ToString::to_string)
            .collect();
        let label = |values: &DVector<f64>| -> Vec<(String, f64)> {
            epoch_labels
                .iter()
                .cloned()
                .zip(values.iter().copied())
                .collect()
        };

        let names = design.names;
        let with_names = |values: &[f64]| -> Vec<(String, f64)> {
            names.iter().cloned().zip(values.iter().copied()).collect()
        };

        #[allow(clippy::cast_possible_wrap)]
        Ok(Self {
            formula: format!("{channel} ~ {rhs}"),
            params: with_names(beta.as_slice()),
            bse: with_names(&bse),
            tvalues: with_names(&tvalues),
            resid: label(&resid),
            fittedvalues: label(&fitted),
            nobs: n as i64,
            df_resid,
            ssr,
            rsquared,
            rsquared_adj,
            llf,
            aic,
            bic,
        })
    }

    /// Coefficient for a named regressor, if present
    #[must_use]
    pub fn param(&self, name: &str) -> Option<f64> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }
}

impl FitResult for OlsFit {
    fn kind(&self) -> &str {
        OLS_KIND
    }

    fn scalar_attr(&self, name: &str) -> Option<AttrValue> {
        match name {
            "formula" => Some(AttrValue::Str(self.formula.clone())),
            "nobs" => Some(AttrValue::Int(self.nobs)),
            "df_resid" => Some(AttrValue::Float(self.df_resid)),
            "ssr" => Some(AttrValue::Float(self.ssr)),
            "rsquared" => Some(AttrValue::Float(self.rsquared)),
            "rsquared_adj" => Some(AttrValue::Float(self.rsquared_adj)),
            "llf" => Some(AttrValue::Float(self.llf)),
            "aic" => Some(AttrValue::Float(self.aic)),
            "bic" => Some(AttrValue::Float(self.bic)),
            _ => None,
        }
    }

    fn vector_attr(&self, name: &str) -> Option<Vec<(String, f64)>> {
        match name {
            "params" => Some(self.params.clone()),
            "bse" => Some(self.bse.clone()),
            "tvalues" => Some(self.tvalues.clone()),
            "resid" => Some(self.resid.clone()),
            "fittedvalues" => Some(self.fittedvalues.clone()),
            _ => None,
        }
    }

    fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
