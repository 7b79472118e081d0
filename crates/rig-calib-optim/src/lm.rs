//! Thin adapter from dense residual problems to `levenberg-marquardt`.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};

use crate::SolveError;

/// Dense nonlinear least-squares problem over a flat parameter vector.
pub(crate) trait NllsProblem {
    fn residuals(&self, x: &DVector<f64>) -> DVector<f64>;
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64>;
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct LmOptions {
    /// MINPACK convention: the evaluation cap is `max_iters * (n + 1)`.
    pub max_iters: usize,
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
}

/// Outcome of one Levenberg-Marquardt run.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    pub evaluations: usize,
    /// Half the squared residual norm at the solution.
    pub final_cost: f64,
    pub converged: bool,
    pub termination: String,
}

impl SolveReport {
    /// Turn a non-converged run into an error.
    pub(crate) fn ensure_converged(&self) -> Result<(), SolveError> {
        if self.converged {
            Ok(())
        } else {
            Err(SolveError::NotConverged {
                termination: self.termination.clone(),
                evaluations: self.evaluations,
            })
        }
    }
}

struct LmWrapper<'a, P: NllsProblem> {
    problem: &'a P,
    params: DVector<f64>,
}

impl<P: NllsProblem> LeastSquaresProblem<f64, Dyn, Dyn> for LmWrapper<'_, P> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(self.problem.residuals(&self.params))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        Some(self.problem.jacobian(&self.params))
    }
}

pub(crate) fn minimize<P: NllsProblem>(
    problem: &P,
    x0: DVector<f64>,
    opts: &LmOptions,
) -> (DVector<f64>, SolveReport) {
    let lm = LevenbergMarquardt::new()
        .with_ftol(opts.ftol)
        .with_xtol(opts.xtol)
        .with_gtol(opts.gtol)
        .with_patience(opts.max_iters.max(1));

    let wrapper = LmWrapper {
        problem,
        params: x0,
    };

    let (wrapper, report) = lm.minimize(wrapper);
    let x_opt = wrapper.params();
    let converged = report.termination.was_successful() && x_opt.iter().all(|v| v.is_finite());

    (
        x_opt,
        SolveReport {
            evaluations: report.number_of_evaluations,
            final_cost: report.objective_function,
            converged,
            termination: format!("{:?}", report.termination),
        },
    )
}

/// Central-difference step for parameter value `v`.
#[inline]
pub(crate) fn diff_step(v: f64) -> f64 {
    1e-6 * (1.0 + v.abs())
}
