//! LP Oracle
//!
//! Every higher-level algorithm in this crate — the FCG build, the
//! parallelism marker, the scale-shift step — boils down to one of two
//! queries against a [`ConstraintMatrix`]: "minimise this objective, or
//! tell me it's infeasible" ([`LpOracle::feasibility_lexmin`]), or "find the
//! lexicographically smallest feasible point" ([`LpOracle::lexmin`]). This
//! module is the only place that talks to an actual numeric solver; the
//! rest of the crate only ever sees [`Rat`] vectors.
//!
//! The active backend, [`GoodLpOracle`], is built on the `good_lp` crate
//! with its pure-Rust `microlp` simplex solver — no system LP library is
//! required to build or run this crate. `good_lp` works in `f64`; witnesses
//! are snapped back to exact rationals via
//! [`crate::rational::rationalize`], bounded by the same coefficient bound
//! the constraint system was built with (see `SPEC_FULL.md` §4.1 for the
//! soundness argument).

use good_lp::{variable, Expression, ProblemVariables, Solution, SolverModel, Variable};
use num_traits::ToPrimitive;

use crate::cst::ConstraintMatrix;
use crate::rational::{self, Rat};

/// Abstraction over the external LP/MILP solver. Exactly one backend is
/// active per build (today: [`GoodLpOracle`]); additional backends are a
/// pure addition behind this trait, never a change to the algorithms that
/// call it.
///
/// Implementations must be deterministic: the same `(cst, obj)` must
/// always produce the same witness, because colouring reproducibility
/// (`SPEC_FULL.md` §8, property 7) depends on it.
pub trait LpOracle {
    /// Low-level single-objective solve. `None` means infeasible.
    fn solve_min(&self, cst: &ConstraintMatrix, obj: &[Rat]) -> Option<Vec<Rat>>;

    /// Minimise `obj` over the feasible region of `cst`.
    fn feasibility_lexmin(&self, cst: &ConstraintMatrix, obj: &[Rat]) -> Option<Vec<Rat>> {
        self.solve_min(cst, obj)
    }

    /// Full lexicographic minimisation: minimise coordinate 0, fix it,
    /// minimise coordinate 1 among the remaining optima, and so on. Used
    /// only by the scale-shift step, which needs one canonical witness
    /// rather than merely *a* feasible point.
    fn lexmin(&self, cst: &ConstraintMatrix) -> Option<Vec<Rat>> {
        let width = cst.width;
        let mut fixed = cst.clone();
        let mut witness = vec![rational::zero(); width];
        for i in 0..width {
            let mut obj = vec![rational::zero(); width];
            obj[i] = rational::one();
            let sol = self.solve_min(&fixed, &obj)?;
            witness[i] = sol[i].clone();
            // Pin coordinate i to its optimum before minimising the next.
            let mut pin = crate::cst::Row::zero(width);
            pin.coeffs[i] = rational::one();
            pin.constant = -sol[i].clone();
            pin.is_eq = true;
            fixed.push(pin);
        }
        Some(witness)
    }
}

/// `good_lp`/`microlp`-backed oracle. Stateless: every call builds a fresh
/// problem, matching the "scoped, freed before the next query" resource
/// discipline from `SPEC_FULL.md` §5.
#[derive(Debug, Default, Clone, Copy)]
pub struct GoodLpOracle {
    /// Denominator bound used when rationalising the solver's `f64`
    /// witness back to an exact value. `1` forces integers, which is what
    /// every caller in this crate wants (schedule coefficients are
    /// integral by construction of `coeff_bounding_constraints`).
    pub max_den: i64,
}

impl GoodLpOracle {
    /// Documented for lint compliance.
    pub fn new() -> Self {
        Self { max_den: 1 }
    }
}

impl LpOracle for GoodLpOracle {
    fn solve_min(&self, cst: &ConstraintMatrix, obj: &[Rat]) -> Option<Vec<Rat>> {
        debug_assert_eq!(obj.len(), cst.width);
        let mut vars = ProblemVariables::new();
        let xs: Vec<Variable> = (0..cst.width).map(|_| vars.add(variable())).collect();

        let objective: Expression = obj.iter().zip(xs.iter()).fold(
            Expression::from(0.0),
            |acc, (c, &x)| acc + c.to_f64().unwrap_or(0.0) * x,
        );

        let mut model = vars.minimise(objective).using(good_lp::solvers::microlp::microlp);
        for row in &cst.rows {
            let expr: Expression = row.coeffs.iter().zip(xs.iter()).fold(
                Expression::from(row.constant.to_f64().unwrap_or(0.0)),
                |acc, (c, &x)| acc + c.to_f64().unwrap_or(0.0) * x,
            );
            model = if row.is_eq {
                model.with(expr.eq(0.0))
            } else {
                model.with(expr.geq(0.0))
            };
        }

        let solution = model.solve().ok()?;
        Some(
            xs.iter()
                .map(|&x| rational::rationalize(solution.value(x), self.max_den))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cst::Row;

    fn unbounded_box(width: usize, bound: i64) -> ConstraintMatrix {
        let mut cst = ConstraintMatrix::empty(width);
        for col in 0..width {
            let mut hi = Row::zero(width);
            hi.coeffs[col] = rational::int(-1);
            hi.constant = rational::int(bound);
            cst.push(hi);
            let mut lo = Row::zero(width);
            lo.coeffs[col] = rational::int(1);
            lo.constant = rational::int(bound);
            cst.push(lo);
        }
        cst
    }

    #[test]
    fn feasible_box_minimises_to_lower_bound() {
        let oracle = GoodLpOracle::new();
        let cst = unbounded_box(2, 3);
        let obj = vec![rational::one(), rational::zero()];
        let sol = oracle.feasibility_lexmin(&cst, &obj).expect("feasible");
        assert_eq!(sol[0], rational::int(-3));
    }

    #[test]
    fn infeasible_system_returns_none() {
        let oracle = GoodLpOracle::new();
        let mut cst = ConstraintMatrix::empty(1);
        // x >= 1 and x <= -1 simultaneously.
        let mut a = Row::zero(1);
        a.coeffs[0] = rational::int(1);
        a.constant = rational::int(-1);
        cst.push(a);
        let mut b = Row::zero(1);
        b.coeffs[0] = rational::int(-1);
        b.constant = rational::int(-1);
        cst.push(b);
        let obj = vec![rational::zero()];
        assert!(oracle.feasibility_lexmin(&cst, &obj).is_none());
    }

    #[test]
    fn lexmin_picks_smallest_point_in_box() {
        let oracle = GoodLpOracle::new();
        let cst = unbounded_box(2, 2);
        let sol = oracle.lexmin(&cst).expect("feasible");
        assert_eq!(sol[0], rational::int(-2));
        assert_eq!(sol[1], rational::int(-2));
    }
}
