//! OLS grid specialization
//!
//! Thin wrapper over [`FitGrid`] adding the extraction shortcuts an OLS
//! summary usually wants. Every shortcut is built from the generic
//! `extract_scalar` / `extract_vector` machinery and shares its cache.

use super::{FitGrid, ScalarTable, VectorTable};
use crate::Result;
use std::ops::Deref;
use std::rc::Rc;

/// A [`FitGrid`] known to contain OLS cells
#[derive(Debug)]
pub struct OlsGrid {
    inner: FitGrid,
}

impl OlsGrid {
    pub(crate) const fn new(inner: FitGrid) -> Self {
        Self { inner }
    }

    /// Coefficient table: (time, channel, regressor) → estimate
    ///
    /// # Errors
    ///
    /// Propagates extraction errors.
    pub fn params(&self) -> Result<Rc<VectorTable>> {
        self.inner.extract_vector("params")
    }

    /// Coefficient standard errors
    ///
    /// # Errors
    ///
    /// Propagates extraction errors.
    pub fn bse(&self) -> Result<Rc<VectorTable>> {
        self.inner.extract_vector("bse")
    }

    /// Coefficient t-values
    ///
    /// # Errors
    ///
    /// Propagates extraction errors.
    pub fn tvalues(&self) -> Result<Rc<VectorTable>> {
        self.inner.extract_vector("tvalues")
    }

    /// Residuals per epoch
    ///
    /// # Errors
    ///
    /// Propagates extraction errors.
    pub fn residuals(&self) -> Result<Rc<VectorTable>> {
        self.inner.extract_vector("resid")
    }

    /// Fitted values per epoch
    ///
    /// # Errors
    ///
    /// Propagates extraction errors.
    pub fn fitted_values(&self) -> Result<Rc<VectorTable>> {
        self.inner.extract_vector("fittedvalues")
    }

    /// R² per cell
    ///
    /// # Errors
    ///
    /// Propagates extraction errors.
    pub fn rsquared(&self) -> Result<Rc<ScalarTable>> {
        self.inner.extract_scalar("rsquared")
    }

    /// Adjusted R² per cell
    ///
    /// # Errors
    ///
    /// Propagates extraction errors.
    pub fn rsquared_adj(&self) -> Result<Rc<ScalarTable>> {
        self.inner.extract_scalar("rsquared_adj")
    }

    /// Akaike information criterion per cell
    ///
    /// # Errors
    ///
    /// Propagates extraction errors.
    pub fn aic(&self) -> Result<Rc<ScalarTable>> {
        self.inner.extract_scalar("aic")
    }

    /// Bayesian information criterion per cell
    ///
    /// # Errors
    ///
    /// Propagates extraction errors.
    pub fn bic(&self) -> Result<Rc<ScalarTable>> {
        self.inner.extract_scalar("bic")
    }

    /// Unwrap into the underlying generic grid
    #[must_use]
    pub fn into_inner(self) -> FitGrid {
        self.inner
    }
}

impl Deref for OlsGrid {
    type Target = FitGrid;

    fn deref(&self) -> &FitGrid {
        &self.inner
    }
}
