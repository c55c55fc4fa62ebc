//! Right-hand-side formula parsing and design-matrix assembly
//!
//! Supports `+`-separated terms over table columns: numeric columns enter
//! directly, string columns are dummy-coded against their first (sorted)
//! level. An intercept is included unless the formula contains a `0` or
//! `-1` term; a literal `1` names the intercept explicitly.

use crate::table::Snapshot;
use crate::{Error, Result};
use nalgebra::DMatrix;
use std::collections::BTreeSet;

/// Name given to the intercept column
pub(crate) const INTERCEPT: &str = "Intercept";

/// A design matrix with one named column per regressor
pub(crate) struct Design {
    pub names: Vec<String>,
    pub matrix: DMatrix<f64>,
}

/// Parse an RHS into (intercept flag, column terms)
pub(crate) fn parse_rhs(rhs: &str) -> Result<(bool, Vec<String>)> {
    if rhs.trim().is_empty() {
        return Err(Error::Formula("right-hand side must not be empty".to_string()));
    }
    let mut intercept = true;
    let mut terms = Vec::new();
    for raw in rhs.split('+') {
        let term = raw.trim();
        match term {
            "" => {
                return Err(Error::Formula(format!(
                    "empty term in right-hand side '{rhs}'"
                )))
            }
            "1" => {}
            "0" | "-1" => intercept = false,
            _ => terms.push(term.to_string()),
        }
    }
    if !intercept && terms.is_empty() {
        return Err(Error::Formula(format!(
            "right-hand side '{rhs}' has no regressors"
        )));
    }
    Ok((intercept, terms))
}

/// Build the design matrix for one snapshot
pub(crate) fn build_design(snapshot: &Snapshot<'_>, rhs: &str) -> Result<Design> {
    let (intercept, terms) = parse_rhs(rhs)?;
    let n = snapshot.num_rows();

    let mut names = Vec::new();
    let mut columns: Vec<Vec<f64>> = Vec::new();

    if intercept {
        names.push(INTERCEPT.to_string());
        columns.push(vec![1.0; n]);
    }

    for term in &terms {
        match snapshot.column_type(term) {
            None => {
                return Err(Error::Formula(format!(
                    "formula term '{term}' is not a column in the epochs table"
                )))
            }
            Some("utf8") => {
                let values = snapshot.utf8_column(term)?;
                let levels: BTreeSet<&str> = values.iter().copied().collect();
                // first (sorted) level is the reference category
                for level in levels.iter().skip(1) {
                    names.push(format!("{term}[{level}]"));
                    columns.push(
                        values
                            .iter()
                            .map(|v| if v == level { 1.0 } else { 0.0 })
                            .collect(),
                    );
                }
            }
            Some(_) => {
                names.push(term.clone());
                columns.push(snapshot.f64_column(term)?);
            }
        }
    }

    let matrix = DMatrix::from_fn(n, columns.len(), |row, col| columns[col][row]);
    Ok(Design { names, matrix })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rhs_default_intercept() {
        let (intercept, terms) = parse_rhs("a + b").unwrap();
        assert!(intercept);
        assert_eq!(terms, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_parse_rhs_drops_intercept() {
        let (intercept, terms) = parse_rhs("0 + a").unwrap();
        assert!(!intercept);
        assert_eq!(terms, vec!["a".to_string()]);

        let (intercept, _) = parse_rhs("a + -1").unwrap();
        assert!(!intercept);
    }

    #[test]
    fn test_parse_rhs_intercept_only() {
        let (intercept, terms) = parse_rhs("1").unwrap();
        assert!(intercept);
        assert!(terms.is_empty());
    }

    #[test]
    fn test_parse_rhs_rejects_empty() {
        assert!(parse_rhs("").is_err());
        assert!(parse_rhs("a + ").is_err());
        assert!(parse_rhs("0").is_err());
    }
}
