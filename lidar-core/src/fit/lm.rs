//! Levenberg-Marquardt minimisation of sums of squared residuals.
use nalgebra::{DMatrix, DVector};

pub const MAX_ITERATIONS: usize = 100;
const GRADIENT_EPSILON: f64 = 1.0e-12;
const STEP_EPSILON: f64 = 1.0e-12;
const MAX_DAMPING: f64 = 1.0e16;

/// A least-squares problem over a fixed number of parameters.
pub trait LeastSquares {
    fn num_params(&self) -> usize;

    fn num_residuals(&self) -> usize;

    fn residuals(&self, params: &DVector<f64>, out: &mut DVector<f64>);

    /// Jacobian of `residuals`, one row per residual. Central differences unless overridden.
    fn jacobian(&self, params: &DVector<f64>, out: &mut DMatrix<f64>) {
        let m = self.num_residuals();
        let mut plus = DVector::zeros(m);
        let mut minus = DVector::zeros(m);
        let mut probe = params.clone();
        for j in 0..self.num_params() {
            let h = 1.0e-7 * params[j].abs().max(1.0);
            probe[j] = params[j] + h;
            self.residuals(&probe, &mut plus);
            probe[j] = params[j] - h;
            self.residuals(&probe, &mut minus);
            probe[j] = params[j];
            out.set_column(j, &((&plus - &minus) / (2.0 * h)));
        }
    }
}

/// Outcome of a minimisation.
#[derive(Debug, Clone)]
pub struct Minimum {
    pub params: DVector<f64>,
    /// Sum of squared residuals at `params`.
    pub sum_sq: f64,
    pub iterations: usize,
}

/// Minimise starting from `initial`; stops on a vanishing gradient or step, or after `MAX_ITERATIONS`.
pub fn minimize<P: LeastSquares>(problem: &P, initial: DVector<f64>) -> Minimum {
    let n = problem.num_params();
    let m = problem.num_residuals();
    let mut params = initial;
    let mut residuals = DVector::zeros(m);
    let mut trial_residuals = DVector::zeros(m);
    let mut jacobian = DMatrix::zeros(m, n);
    let mut damping = 1.0e-3;

    problem.residuals(&params, &mut residuals);
    let mut sum_sq = residuals.norm_squared();
    let mut iterations = 0;
    while iterations < MAX_ITERATIONS {
        iterations += 1;
        problem.jacobian(&params, &mut jacobian);
        let gradient = jacobian.transpose() * &residuals;
        if gradient.amax() < GRADIENT_EPSILON {
            break;
        }
        let normal = jacobian.transpose() * &jacobian;

        let mut accepted = false;
        let mut step_norm = 0.0;
        while damping < MAX_DAMPING {
            let mut damped = normal.clone();
            for i in 0..n {
                damped[(i, i)] += damping * normal[(i, i)].max(1.0e-12);
            }
            let Some(step) = damped.cholesky().map(|c| c.solve(&(-&gradient))) else {
                damping *= 10.0;
                continue;
            };
            let trial = &params + &step;
            problem.residuals(&trial, &mut trial_residuals);
            let trial_sum_sq = trial_residuals.norm_squared();
            if trial_sum_sq.is_finite() && trial_sum_sq < sum_sq {
                step_norm = step.norm();
                params = trial;
                std::mem::swap(&mut residuals, &mut trial_residuals);
                sum_sq = trial_sum_sq;
                damping = (damping * 0.1).max(1.0e-15);
                accepted = true;
                break;
            }
            damping *= 10.0;
        }
        if !accepted || step_norm < STEP_EPSILON * (params.norm() + STEP_EPSILON) {
            break;
        }
    }

    Minimum {
        params,
        sum_sq,
        iterations,
    }
}
