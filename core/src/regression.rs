//! Closed-form least-squares polynomial fitting.
//!
//! Builds the Vandermonde normal equations `(XᵀX) c = Xᵀy` and solves them
//! by Gaussian elimination with partial pivoting. Columns are eliminated
//! in increasing power order; a column whose best pivot falls below the
//! rank tolerance is treated as dependent and its coefficient is pinned
//! to zero. An under-determined fit therefore degrades to the
//! lower-degree fit instead of failing.

use serde::{Deserialize, Serialize};

/// `coefficients[i]` multiplies `x^i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolynomialFit {
    pub coefficients: Vec<f64>,
}

impl PolynomialFit {
    pub fn evaluate(&self, x: f64) -> f64 {
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, c| acc * x + c)
    }

    /// Highest power with a non-zero coefficient.
    pub fn effective_degree(&self) -> usize {
        self.coefficients
            .iter()
            .rposition(|c| *c != 0.0)
            .unwrap_or(0)
    }
}

/// Fit `ys ≈ Σ cᵢ xᵢ^i` for `i in 0..=degree`.
///
/// Returns `None` for empty input or mismatched lengths.
pub fn fit_polynomial(
    xs: &[f64],
    ys: &[f64],
    degree: usize,
    rank_tolerance: f64,
) -> Option<PolynomialFit> {
    if xs.is_empty() || xs.len() != ys.len() {
        return None;
    }

    let m = degree + 1;

    // Augmented normal-equation matrix, m rows × (m + 1) columns.
    let mut a = vec![vec![0.0_f64; m + 1]; m];
    for (&x, &y) in xs.iter().zip(ys) {
        let powers: Vec<f64> = (0..2 * m - 1).map(|p| x.powi(p as i32)).collect();
        for i in 0..m {
            for j in 0..m {
                a[i][j] += powers[i + j];
            }
            a[i][m] += powers[i] * y;
        }
    }

    let scale = (0..m).map(|i| a[i][i].abs()).fold(1.0_f64, f64::max);
    let threshold = rank_tolerance * scale;

    let mut pivots: Vec<(usize, usize)> = Vec::with_capacity(m);
    let mut row = 0;
    for col in 0..m {
        if row == m {
            break;
        }
        let (best, best_abs) = (row..m)
            .map(|r| (r, a[r][col].abs()))
            .fold((row, -1.0), |acc, cur| if cur.1 > acc.1 { cur } else { acc });
        if best_abs <= threshold {
            // dependent column; coefficient stays pinned at zero
            continue;
        }
        a.swap(row, best);
        for r in row + 1..m {
            let factor = a[r][col] / a[row][col];
            if factor == 0.0 {
                continue;
            }
            for c in col..=m {
                a[r][c] -= factor * a[row][c];
            }
        }
        pivots.push((row, col));
        row += 1;
    }

    let mut coefficients = vec![0.0; m];
    for &(r, c) in pivots.iter().rev() {
        let mut sum = a[r][m];
        for k in c + 1..m {
            sum -= a[r][k] * coefficients[k];
        }
        coefficients[c] = sum / a[r][c];
    }

    if coefficients.iter().any(|c| !c.is_finite()) {
        return None;
    }

    Some(PolynomialFit { coefficients })
}
