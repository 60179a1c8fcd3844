//! Eigen decomposition of the band covariance matrix.
//!
//! Thin wrapper over `nalgebra::SymmetricEigen` with the contract the rest
//! of the pipeline relies on: eigenvalues sorted descending with pairing
//! preserved, eigenvectors orthonormal. Eigenvector SIGN is not guaranteed,
//! and repeated eigenvalues yield an arbitrary orthonormal basis for their
//! subspace; downstream consumers must tolerate both.

use crate::types::{PcaError, PcaResult};
use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::Array2;

/// Relative tolerance for the symmetry check
const SYMMETRY_TOLERANCE: f64 = 1e-8;

/// Convergence epsilon handed to the iterative solver
const EIGEN_EPSILON: f64 = 1e-12;

/// Iteration cap for the decomposition before reporting non-convergence
const MAX_EIGEN_ITERATIONS: usize = 500;

/// Eigenvalues and eigenvectors of a symmetric covariance matrix
#[derive(Debug, Clone)]
pub struct EigenDecomposition {
    /// Eigenvalues sorted descending
    pub eigenvalues: Vec<f64>,
    /// Row i holds the eigenvector paired with `eigenvalues[i]`
    pub eigenvectors: Array2<f64>,
}

/// Decompose a symmetric covariance matrix into eigenvalues/eigenvectors.
///
/// # Errors
/// * [`PcaError::InvalidMatrix`] - non-square input, or asymmetry beyond
///   floating tolerance
/// * [`PcaError::NumericalConvergence`] - the iteration cap was reached
///   without convergence (ill-conditioned input)
pub fn decompose(covariance: &Array2<f64>) -> PcaResult<EigenDecomposition> {
    let (rows, cols) = covariance.dim();
    if rows != cols || rows == 0 {
        return Err(PcaError::InvalidMatrix(format!(
            "expected square matrix, got {}x{}",
            rows, cols
        )));
    }

    check_symmetry(covariance)?;

    // Average out the sub-tolerance asymmetry before handing the matrix to
    // the solver, which assumes exact symmetry.
    let n = rows;
    let m = DMatrix::from_fn(n, n, |i, j| {
        0.5 * (covariance[[i, j]] + covariance[[j, i]])
    });

    log::debug!("Decomposing {}x{} covariance matrix", n, n);

    let eigen = SymmetricEigen::try_new(m, EIGEN_EPSILON, MAX_EIGEN_ITERATIONS).ok_or_else(|| {
        PcaError::NumericalConvergence(format!(
            "symmetric eigen solver exceeded {} iterations",
            MAX_EIGEN_ITERATIONS
        ))
    })?;

    // nalgebra pairs eigenvalue k with eigenvector COLUMN k; reorder both
    // descending and emit eigenvectors as rows.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .partial_cmp(&eigen.eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let eigenvalues: Vec<f64> = order.iter().map(|&k| eigen.eigenvalues[k]).collect();
    let mut eigenvectors = Array2::<f64>::zeros((n, n));
    for (row, &k) in order.iter().enumerate() {
        for b in 0..n {
            eigenvectors[[row, b]] = eigen.eigenvectors[(b, k)];
        }
    }

    log::debug!("Eigenvalues (descending): {:?}", eigenvalues);

    Ok(EigenDecomposition {
        eigenvalues,
        eigenvectors,
    })
}

fn check_symmetry(matrix: &Array2<f64>) -> PcaResult<()> {
    let n = matrix.nrows();
    let scale = matrix
        .iter()
        .fold(0.0f64, |acc, v| acc.max(v.abs()))
        .max(1.0);
    for i in 0..n {
        for j in (i + 1)..n {
            let diff = (matrix[[i, j]] - matrix[[j, i]]).abs();
            if diff > SYMMETRY_TOLERANCE * scale {
                return Err(PcaError::InvalidMatrix(format!(
                    "asymmetric at ({}, {}): |{} - {}| = {:e}",
                    i,
                    j,
                    matrix[[i, j]],
                    matrix[[j, i]],
                    diff
                )));
            }
        }
    }
    Ok(())
}
