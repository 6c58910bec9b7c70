//! Dataset loading and matrix extraction
//!
//! Training requests reference datasets by file name. A processed copy (output
//! of the preprocessing pipeline) takes precedence over the raw upload. The
//! orchestrator never mutates the frame; it only derives feature/target views.

use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};
use polars::prelude::*;

use crate::error::{Result, StudioError};

/// Locate a dataset file: processed directory first, then uploads.
pub fn resolve_dataset(processed_dir: &Path, uploads_dir: &Path, filename: &str) -> Option<PathBuf> {
    let processed = processed_dir.join(filename);
    if processed.exists() {
        return Some(processed);
    }
    let uploaded = uploads_dir.join(filename);
    if uploaded.exists() {
        return Some(uploaded);
    }
    None
}

/// Read a CSV dataset into a DataFrame.
pub fn load_dataset(path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(1000))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    Ok(df)
}

/// Extract named columns into a row-major f64 matrix. Nulls become 0.0.
pub fn columns_to_matrix(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let n_cols = col_names.len();

    let col_data: Vec<Vec<f64>> = col_names
        .iter()
        .map(|col_name| {
            let series = df
                .column(col_name)
                .map_err(|_| StudioError::ColumnNotFound(col_name.clone()))?;
            let series_f64 = series
                .cast(&DataType::Float64)
                .map_err(|e| StudioError::DataError(e.to_string()))?;
            let values: Vec<f64> = series_f64
                .f64()
                .map_err(|e| StudioError::DataError(e.to_string()))?
                .into_iter()
                .map(|v| v.unwrap_or(0.0))
                .collect();
            Ok(values)
        })
        .collect::<Result<Vec<Vec<f64>>>>()?;

    let col_refs: Vec<&[f64]> = col_data.iter().map(|c| c.as_slice()).collect();
    Ok(Array2::from_shape_fn((n_rows, n_cols), |(r, c)| col_refs[c][r]))
}

/// Feature matrix and target vector for supervised tasks.
///
/// The target column is excluded from the features; every other column is
/// cast to f64. Returns the feature column names alongside the views.
pub fn supervised_views(
    df: &DataFrame,
    target: &str,
) -> Result<(Array2<f64>, Array1<f64>, Vec<String>)> {
    let feature_cols: Vec<String> = df
        .get_column_names()
        .into_iter()
        .filter(|name| name.as_str() != target)
        .map(|s| s.to_string())
        .collect();

    if feature_cols.is_empty() {
        return Err(StudioError::DataError(
            "Dataset has no feature columns besides the target".to_string(),
        ));
    }

    let target_series = df
        .column(target)
        .map_err(|_| StudioError::ColumnNotFound(target.to_string()))?;
    let target_f64 = target_series
        .cast(&DataType::Float64)
        .map_err(|e| StudioError::DataError(e.to_string()))?;
    let y: Array1<f64> = target_f64
        .f64()
        .map_err(|e| StudioError::DataError(e.to_string()))?
        .into_iter()
        .map(|v| v.unwrap_or(0.0))
        .collect();

    let x = columns_to_matrix(df, &feature_cols)?;
    Ok((x, y, feature_cols))
}

/// Numeric-columns-only matrix for clustering. Nulls become 0.0.
///
/// Errors when the frame has no numeric columns at all.
pub fn numeric_matrix(df: &DataFrame) -> Result<(Array2<f64>, Vec<String>)> {
    let numeric_cols: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|col| col.dtype().is_numeric())
        .map(|col| col.name().to_string())
        .collect();

    if numeric_cols.is_empty() {
        return Err(StudioError::ValidationError(
            "No numeric columns available for clustering".to_string(),
        ));
    }

    let x = columns_to_matrix(df, &numeric_cols)?;
    Ok((x, numeric_cols))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_df() -> DataFrame {
        df!(
            "a" => &[1.0, 2.0, 3.0],
            "b" => &[4.0, 5.0, 6.0],
            "label" => &[0.0, 1.0, 0.0]
        )
        .unwrap()
    }

    #[test]
    fn test_supervised_views_excludes_target() {
        let df = sample_df();
        let (x, y, names) = supervised_views(&df, "label").unwrap();
        assert_eq!(x.dim(), (3, 2));
        assert_eq!(y.len(), 3);
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_supervised_views_missing_target() {
        let df = sample_df();
        let err = supervised_views(&df, "nope").unwrap_err();
        assert!(matches!(err, StudioError::ColumnNotFound(_)));
    }

    #[test]
    fn test_numeric_matrix_skips_strings() {
        let df = df!(
            "x" => &[1.0, 2.0],
            "name" => &["a", "b"]
        )
        .unwrap();
        let (x, cols) = numeric_matrix(&df).unwrap();
        assert_eq!(x.dim(), (2, 1));
        assert_eq!(cols, vec!["x".to_string()]);
    }

    #[test]
    fn test_numeric_matrix_no_numeric_columns() {
        let df = df!("name" => &["a", "b"]).unwrap();
        assert!(numeric_matrix(&df).is_err());
    }
}
