//! Linear model family: OLS, Ridge, Lasso, and logistic regression.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StudioError};

/// Solve the symmetric positive-definite system Ax = b via Cholesky.
/// Adds a small diagonal jitter and retries once if A is not PD.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    fn attempt(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
        let n = a.nrows();
        let mut l = Array2::zeros((n, n));
        for i in 0..n {
            for j in 0..=i {
                let mut sum = 0.0;
                for k in 0..j {
                    sum += l[[i, k]] * l[[j, k]];
                }
                if i == j {
                    let diag = a[[i, i]] - sum;
                    if diag <= 0.0 {
                        return None;
                    }
                    l[[i, j]] = diag.sqrt();
                } else {
                    l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
                }
            }
        }

        // Forward then backward substitution
        let mut y = Array1::zeros(n);
        for i in 0..n {
            let mut sum = 0.0;
            for j in 0..i {
                sum += l[[i, j]] * y[j];
            }
            y[i] = (b[i] - sum) / l[[i, i]];
        }
        let mut x = Array1::zeros(n);
        for i in (0..n).rev() {
            let mut sum = 0.0;
            for j in (i + 1)..n {
                sum += l[[j, i]] * x[j];
            }
            x[i] = (y[i] - sum) / l[[i, i]];
        }
        Some(x)
    }

    if let Some(x) = attempt(a, b) {
        return Some(x);
    }
    let n = a.nrows();
    let jitter = 1e-8 * a.diag().iter().map(|v| v.abs()).sum::<f64>().max(1.0) / n as f64;
    let mut a_reg = a.clone();
    for k in 0..n {
        a_reg[[k, k]] += jitter;
    }
    attempt(&a_reg, b)
}

/// Center x and y around their means when fitting an intercept.
fn center(x: &Array2<f64>, y: &Array1<f64>) -> (Array2<f64>, Array1<f64>, Array1<f64>, f64) {
    let x_mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
    let y_mean = y.mean().unwrap_or(0.0);
    let x_c = x - &x_mean.clone().insert_axis(Axis(0));
    let y_c = y - y_mean;
    (x_c, y_c, x_mean, y_mean)
}

fn check_shapes(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(StudioError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    Ok(())
}

/// Ordinary least-squares / ridge solver shared by the linear regressors.
/// `l2` of 0.0 gives plain OLS.
fn solve_linear(x: &Array2<f64>, y: &Array1<f64>, l2: f64) -> Result<(Array1<f64>, f64)> {
    let (x_c, y_c, x_mean, y_mean) = center(x, y);
    let mut xtx = x_c.t().dot(&x_c);
    if l2 > 0.0 {
        for i in 0..xtx.nrows() {
            xtx[[i, i]] += l2;
        }
    }
    let xty = x_c.t().dot(&y_c);
    let coef = cholesky_solve(&xtx, &xty).ok_or_else(|| {
        StudioError::ComputationError("Normal-equation matrix is singular".to_string())
    })?;
    let intercept = y_mean - coef.dot(&x_mean);
    Ok((coef, intercept))
}

/// Ordinary least-squares regression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: f64,
    pub is_fitted: bool,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearRegression {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: 0.0,
            is_fitted: false,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_shapes(x, y)?;
        let (coef, intercept) = solve_linear(x, y, 0.0)?;
        self.coefficients = Some(coef);
        self.intercept = intercept;
        self.is_fitted = true;
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coef = self.coefficients.as_ref().ok_or(StudioError::ModelNotFitted)?;
        Ok(x.dot(coef) + self.intercept)
    }
}

/// L2-regularized linear regression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidgeRegression {
    pub alpha: f64,
    pub coefficients: Option<Array1<f64>>,
    pub intercept: f64,
    pub is_fitted: bool,
}

impl RidgeRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            coefficients: None,
            intercept: 0.0,
            is_fitted: false,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_shapes(x, y)?;
        let (coef, intercept) = solve_linear(x, y, self.alpha.max(0.0))?;
        self.coefficients = Some(coef);
        self.intercept = intercept;
        self.is_fitted = true;
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coef = self.coefficients.as_ref().ok_or(StudioError::ModelNotFitted)?;
        Ok(x.dot(coef) + self.intercept)
    }
}

/// L1-regularized linear regression via coordinate descent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LassoRegression {
    pub alpha: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub coefficients: Option<Array1<f64>>,
    pub intercept: f64,
    pub is_fitted: bool,
}

impl LassoRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            max_iter: 1000,
            tol: 1e-6,
            coefficients: None,
            intercept: 0.0,
            is_fitted: false,
        }
    }

    fn soft_threshold(val: f64, threshold: f64) -> f64 {
        if val > threshold {
            val - threshold
        } else if val < -threshold {
            val + threshold
        } else {
            0.0
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_shapes(x, y)?;
        let n_samples = x.nrows();
        let n_features = x.ncols();
        let (x_c, y_c, x_mean, y_mean) = center(x, y);

        let col_norms: Vec<f64> = (0..n_features)
            .map(|j| x_c.column(j).mapv(|v| v * v).sum())
            .collect();

        let mut w: Array1<f64> = Array1::zeros(n_features);
        let lambda = self.alpha * n_samples as f64;

        for _ in 0..self.max_iter {
            let w_old = w.clone();
            let mut r = &y_c - &x_c.dot(&w);

            for j in 0..n_features {
                if col_norms[j] < 1e-15 {
                    w[j] = 0.0;
                    continue;
                }
                let rho = x_c.column(j).dot(&r) + col_norms[j] * w[j];
                let old_wj = w[j];
                w[j] = Self::soft_threshold(rho, lambda) / col_norms[j];
                if (old_wj - w[j]).abs() > 0.0 {
                    r = r + &(&x_c.column(j) * (old_wj - w[j]));
                }
            }

            if (&w - &w_old).mapv(f64::abs).sum() < self.tol {
                break;
            }
        }

        self.intercept = y_mean - w.dot(&x_mean);
        self.coefficients = Some(w);
        self.is_fitted = true;
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coef = self.coefficients.as_ref().ok_or(StudioError::ModelNotFitted)?;
        Ok(x.dot(coef) + self.intercept)
    }
}

/// Logistic regression trained by batch gradient descent.
///
/// Binary problems use a single weight vector; problems with more than two
/// classes fall back to one-vs-rest with per-class probability normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub max_iter: usize,
    pub learning_rate: f64,
    pub l2: f64,
    pub tol: f64,
    classes: Vec<i64>,
    /// One row per class for one-vs-rest; a single row for binary.
    weights: Option<Array2<f64>>,
    intercepts: Vec<f64>,
    pub is_fitted: bool,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            max_iter: 1000,
            learning_rate: 0.1,
            l2: 0.01,
            tol: 1e-6,
            classes: Vec::new(),
            weights: None,
            intercepts: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
        z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    }

    /// Train one binary weight vector against 0/1 targets.
    fn fit_binary(&self, x: &Array2<f64>, y01: &Array1<f64>) -> (Array1<f64>, f64) {
        let n_samples = x.nrows() as f64;
        let mut weights: Array1<f64> = Array1::zeros(x.ncols());
        let mut bias = 0.0;

        for _ in 0..self.max_iter {
            let linear = x.dot(&weights) + bias;
            let predictions = Self::sigmoid(&linear);
            let errors = &predictions - y01;
            let dw = (x.t().dot(&errors) / n_samples) + (self.l2 * &weights);
            let db = errors.mean().unwrap_or(0.0);

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < self.tol {
                break;
            }
            weights = weights - self.learning_rate * dw;
            bias -= self.learning_rate * db;
        }
        (weights, bias)
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_shapes(x, y)?;
        let mut classes: Vec<i64> = y.iter().map(|v| v.round() as i64).collect();
        classes.sort_unstable();
        classes.dedup();
        if classes.len() < 2 {
            return Err(StudioError::TrainingError(
                "Logistic regression needs at least two classes".to_string(),
            ));
        }

        let n_features = x.ncols();
        if classes.len() == 2 {
            let positive = classes[1];
            let y01 = y.mapv(|v| if v.round() as i64 == positive { 1.0 } else { 0.0 });
            let (w, b) = self.fit_binary(x, &y01);
            let mut weights = Array2::zeros((1, n_features));
            weights.row_mut(0).assign(&w);
            self.weights = Some(weights);
            self.intercepts = vec![b];
        } else {
            let mut weights = Array2::zeros((classes.len(), n_features));
            let mut intercepts = Vec::with_capacity(classes.len());
            for (idx, &class) in classes.iter().enumerate() {
                let y01 = y.mapv(|v| if v.round() as i64 == class { 1.0 } else { 0.0 });
                let (w, b) = self.fit_binary(x, &y01);
                weights.row_mut(idx).assign(&w);
                intercepts.push(b);
            }
            self.weights = Some(weights);
            self.intercepts = intercepts;
        }

        self.classes = classes;
        self.is_fitted = true;
        Ok(())
    }

    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    /// Class probabilities, one column per class in sorted class order.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let weights = self.weights.as_ref().ok_or(StudioError::ModelNotFitted)?;
        let n = x.nrows();

        if self.classes.len() == 2 {
            let linear = x.dot(&weights.row(0).to_owned()) + self.intercepts[0];
            let p = Self::sigmoid(&linear);
            let mut out = Array2::zeros((n, 2));
            for (i, &pi) in p.iter().enumerate() {
                out[[i, 0]] = 1.0 - pi;
                out[[i, 1]] = pi;
            }
            return Ok(out);
        }

        let mut out = Array2::zeros((n, self.classes.len()));
        for (idx, _) in self.classes.iter().enumerate() {
            let linear = x.dot(&weights.row(idx).to_owned()) + self.intercepts[idx];
            let p = Self::sigmoid(&linear);
            for i in 0..n {
                out[[i, idx]] = p[i];
            }
        }
        // Normalize one-vs-rest scores into a distribution
        for mut row in out.rows_mut() {
            let total: f64 = row.sum();
            if total > 0.0 {
                row.mapv_inplace(|v| v / total);
            } else {
                let uniform = 1.0 / self.classes.len() as f64;
                row.fill(uniform);
            }
        }
        Ok(out)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        let labels = proba
            .rows()
            .into_iter()
            .map(|row| {
                let mut best = 0;
                let mut best_p = f64::MIN;
                for (idx, &p) in row.iter().enumerate() {
                    if p > best_p {
                        best_p = p;
                        best = idx;
                    }
                }
                self.classes[best] as f64
            })
            .collect();
        Ok(Array1::from_vec(labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_linear_regression_exact_fit() {
        // y = 2*x1 + 1
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![3.0, 5.0, 7.0, 9.0];
        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&array![[5.0]]).unwrap();
        assert!((pred[0] - 11.0).abs() < 1e-6);
    }

    #[test]
    fn test_ridge_shrinks_coefficients() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![2.0, 4.0, 6.0, 8.0];
        let mut ols = LinearRegression::new();
        ols.fit(&x, &y).unwrap();
        let mut ridge = RidgeRegression::new(10.0);
        ridge.fit(&x, &y).unwrap();
        let w_ols = ols.coefficients.as_ref().unwrap()[0];
        let w_ridge = ridge.coefficients.as_ref().unwrap()[0];
        assert!(w_ridge.abs() < w_ols.abs());
    }

    #[test]
    fn test_lasso_sparsity() {
        // Second feature is pure noise with tiny variance; lasso should zero it.
        let x = array![
            [1.0, 0.01],
            [2.0, -0.02],
            [3.0, 0.015],
            [4.0, -0.01],
            [5.0, 0.02]
        ];
        let y = array![2.0, 4.0, 6.0, 8.0, 10.0];
        let mut model = LassoRegression::new(0.5);
        model.fit(&x, &y).unwrap();
        let coef = model.coefficients.as_ref().unwrap();
        assert!(coef[1].abs() < 1e-6);
    }

    #[test]
    fn test_logistic_binary_separable() {
        let x = array![
            [0.0], [0.2], [0.4], [0.6],
            [5.0], [5.2], [5.4], [5.6]
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert_eq!(*p, *t);
        }
        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (8, 2));
        assert!(proba[[0, 0]] > 0.5);
        assert!(proba[[7, 1]] > 0.5);
    }

    #[test]
    fn test_logistic_multiclass() {
        let x = array![
            [0.0, 0.0], [0.1, 0.1], [0.2, 0.0],
            [5.0, 0.0], [5.1, 0.1], [5.2, 0.0],
            [0.0, 5.0], [0.1, 5.1], [0.2, 5.0]
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0];
        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.classes(), &[0, 1, 2]);
        let pred = model.predict(&x).unwrap();
        let correct = pred.iter().zip(y.iter()).filter(|(p, t)| p == t).count();
        assert!(correct >= 8);
    }

    #[test]
    fn test_logistic_single_class_errors() {
        let x = array![[1.0], [2.0]];
        let y = array![1.0, 1.0];
        let mut model = LogisticRegression::new();
        assert!(model.fit(&x, &y).is_err());
    }
}
