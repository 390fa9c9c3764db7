//! Constraint builder
//!
//! Every feasibility query the scheduler issues is phrased over one shared
//! coordinate space: a vector of schedule *coefficients*, one block per
//! statement, plus a block of program-parameter multipliers. A
//! [`ConstraintMatrix`] is a flat list of affine rows over that space; a row
//! is either an equality (`coeffs · x + c == 0`) or an inequality
//! (`coeffs · x + c >= 0`).
//!
//! # Width invariant
//! Every constraint matrix built by this module has exactly
//! [`cst_width`]`(nstmts, nvar, npar)` columns (coefficients, *excluding*
//! the trailing constant, which is tracked separately on [`Row`]). Column
//! layout, left to right:
//!
//! ```text
//! [ npar parameter-multiplier coeffs | 1 translation coeff
//!   | nstmts blocks of (nvar loop coeffs + 1 statement-constant coeff) ]
//! ```
//!
//! # Reserved rows
//! [`coeff_bounding_constraints`] pre-allocates one row per variable column
//! (`cst_width(..) ` rows): the `npar + 1` parameter-block rows start as
//! `coeff >= 0` lower bounds (never toggled further — these are not "dims"),
//! and the `nstmts * (nvar + 1)` statement-block rows start as `coeff == 0`
//! equalities that [`crate::fcg`] toggles on and off via
//! [`ConstraintMatrix::force_at_least_one`] /
//! [`ConstraintMatrix::reset_reserved_row`] while probing which dimensions
//! can be fused or made parallel. This mirrors the way the original
//! scheduler treats the tail of its constraint matrix as a reusable
//! scratch area instead of re-allocating per probe.

use crate::rational::{self, Rat};
use crate::stmt::{Dep, StmtId};

/// Default magnitude bound placed on every schedule coefficient. Matches
/// the common default used by affine schedulers: large enough to express
/// skewing by a handful of outer iterations, small enough to keep the LP
/// well-conditioned.
pub const DEFAULT_COEFF_BOUND: i64 = 4;

/// Number of coefficient columns (the width invariant, excluding the
/// trailing constant column that every [`Row`] carries separately).
#[inline]
pub fn cst_width(nstmts: usize, nvar: usize, npar: usize) -> usize {
    npar + 1 + nstmts * (nvar + 1)
}

/// Column offset of statement `s`'s loop-coefficient block.
#[inline]
pub fn stmt_col_offset(s: StmtId, nvar: usize, npar: usize) -> usize {
    npar + 1 + s.as_usize() * (nvar + 1)
}

/// One affine row: `coeffs · x + constant {== 0 | >= 0}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    /// Coefficient for every column in the shared coordinate space.
    pub coeffs: Vec<Rat>,
    /// Constant term added to `coeffs · x`.
    pub constant: Rat,
    /// `true` for `== 0`, `false` for `>= 0`.
    pub is_eq: bool,
}

impl Row {
    /// Documented for lint compliance.
    pub fn zero(width: usize) -> Self {
        Self { coeffs: vec![rational::zero(); width], constant: rational::zero(), is_eq: false }
    }

    /// Evaluate `coeffs · x + constant` for a point `x` in this row's
    /// coefficient space. Shared by the scale-shift step (to test whether a
    /// solved hyperplane strictly satisfies a dependence) and the skewing
    /// pass (to test candidate skew factors) so both read a dependence's
    /// scalar row the same way.
    pub fn evaluate(&self, x: &[Rat]) -> Rat {
        let mut v = self.constant.clone();
        for (c, s) in self.coeffs.iter().zip(x.iter()) {
            if !num_traits::Zero::is_zero(c) {
                v += c * s;
            }
        }
        v
    }
}

/// A conjunction of affine [`Row`]s, all sharing `width` coefficient
/// columns — a polyhedron.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstraintMatrix {
    /// Number of coefficient columns shared by every row.
    pub width: usize,
    /// The polyhedron's rows.
    pub rows: Vec<Row>,
}

impl ConstraintMatrix {
    /// Documented for lint compliance.
    pub fn empty(width: usize) -> Self {
        Self { width, rows: Vec::new() }
    }

    /// Documented for lint compliance.
    pub fn push(&mut self, row: Row) {
        debug_assert_eq!(row.coeffs.len(), self.width);
        self.rows.push(row);
    }

    /// Intersect two polyhedra (conjoin their rows). Panics on width
    /// mismatch — a mismatch here is always a construction bug, never an
    /// expected runtime outcome, so `SPEC_FULL.md` §7 treats it as an
    /// invariant violation rather than a recoverable error.
    pub fn union(mut self, other: ConstraintMatrix) -> Self {
        assert_eq!(self.width, other.width, "constraint matrix width mismatch");
        self.rows.extend(other.rows);
        self
    }

    /// Documented for lint compliance.
    pub fn extend_from(&mut self, other: &ConstraintMatrix) {
        assert_eq!(self.width, other.width, "constraint matrix width mismatch");
        self.rows.extend(other.rows.iter().cloned());
    }

    /// Toggle reserved row `col` (one of the `cst_width` dim-coefficient
    /// rows laid down by [`coeff_bounding_constraints`]) from `coeff == 0`
    /// to `coeff >= 1`, by setting `is_eq = false` and `constant = -1`.
    pub fn force_at_least_one(&mut self, row_idx: usize) {
        let row = &mut self.rows[row_idx];
        row.is_eq = false;
        row.constant = rational::int(-1);
    }

    /// Undo [`Self::force_at_least_one`], restoring `coeff == 0`.
    pub fn reset_reserved_row(&mut self, row_idx: usize) {
        let row = &mut self.rows[row_idx];
        row.is_eq = true;
        row.constant = rational::zero();
    }
}

/// Build the base polyhedron bounding every coefficient's magnitude to
/// `[-bound, bound]`, lower-bounding the `npar + 1` parameter-multiplier
/// columns at `0`, and laying down one toggleable `coeff == 0` equality per
/// statement loop/constant-shift column (rows `npar+1 ..= cst_width-1`,
/// i.e. row indices `[npar+1, cst_width)` when the reserved block is
/// indexed from the start of the matrix — see [`reserved_row_for_col`]).
pub fn coeff_bounding_constraints(
    nstmts: usize,
    nvar: usize,
    npar: usize,
    bound: i64,
) -> ConstraintMatrix {
    let width = cst_width(nstmts, nvar, npar);
    let mut cst = ConstraintMatrix::empty(width);

    // Magnitude bounds: -bound <= coeff <= bound, for every column.
    for col in 0..width {
        let mut upper = Row::zero(width);
        upper.coeffs[col] = rational::int(-1);
        upper.constant = rational::int(bound);
        cst.push(upper); // bound - coeff >= 0
        let mut lower = Row::zero(width);
        lower.coeffs[col] = rational::int(1);
        lower.constant = rational::int(bound);
        cst.push(lower); // coeff + bound >= 0
    }

    // Reserved rows, one per column, in column order.
    for col in 0..width {
        let mut row = Row::zero(width);
        row.coeffs[col] = rational::int(1);
        if col < npar + 1 {
            // Parameter-multiplier lower bound: coeff >= 0. Never toggled.
            row.is_eq = false;
            row.constant = rational::zero();
        } else {
            // Dim/shift coefficient: starts pinned to zero, toggled to
            // ">= 1" by the FCG engine while it is uncoloured.
            row.is_eq = true;
            row.constant = rational::zero();
        }
        cst.push(row);
    }
    cst
}

/// Row index, within a matrix built by [`coeff_bounding_constraints`], of
/// the reserved row for coefficient column `col`.
#[inline]
pub fn reserved_row_for_col(col: usize, width: usize) -> usize {
    // 2 magnitude rows per column precede the reserved block.
    2 * width + col
}

/// Per-dep permutability constraint, already cached on the `Dep` at
/// construction time (see [`crate::stmt::Dep`] and
/// [`uniform_dep_constraints`]). Returning a clone keeps callers free to
/// extend it without mutating the shared cache.
pub fn permutability_constraints(dep: &Dep) -> ConstraintMatrix {
    dep.cst.clone()
}

/// Build the permutability constraint for a *uniform* dependence: one whose
/// source-to-destination iteration displacement is a constant vector
/// `dist` (the common case for stencils and array-index-shifted
/// producer/consumer pairs — see `SPEC_FULL.md` §1's exclusion of
/// non-affine dependences and the concrete scenarios in §8). Non-uniform
/// dependences are out of this crate's scope: a front end would hand us an
/// already Farkas-eliminated [`ConstraintMatrix`] instead.
///
/// For a uniform dependence, legality for *every* iteration point forces
/// the same coefficient on every shared loop dimension between source and
/// destination (`a[k] == b[k]`); the only remaining freedom is the scalar
/// term `b_const - a_const + b·dist`, which the reserved-row toggle turns
/// into "weakly satisfies" (`>= 0`) or "strictly satisfies" (`>= 1`).
pub fn uniform_dep_constraints(
    nstmts: usize,
    nvar: usize,
    npar: usize,
    src: StmtId,
    dst: StmtId,
    dist: &[i64],
) -> ConstraintMatrix {
    let width = cst_width(nstmts, nvar, npar);
    let mut cst = ConstraintMatrix::empty(width);
    let src_off = stmt_col_offset(src, nvar, npar);
    let dst_off = stmt_col_offset(dst, nvar, npar);

    if src != dst {
        // a[k] - b[k] == 0 for every shared loop dim.
        for k in 0..nvar {
            let mut row = Row::zero(width);
            row.coeffs[src_off + k] = rational::int(1);
            row.coeffs[dst_off + k] = rational::int(-1);
            row.is_eq = true;
            cst.push(row);
        }
    }

    // Scalar term: (b_const - a_const) + sum_k b[k]*dist[k] >= 0 (weak).
    let mut scalar = Row::zero(width);
    scalar.coeffs[dst_off + nvar] = rational::int(1);
    if src != dst {
        scalar.coeffs[src_off + nvar] = rational::int(-1);
    }
    for (k, &d) in dist.iter().enumerate().take(nvar) {
        if d != 0 {
            scalar.coeffs[dst_off + k] += rational::int(d);
        }
    }
    scalar.is_eq = false;
    cst.push(scalar);
    cst
}

/// Union of [`permutability_constraints`] for every dependence fully
/// contained in `members` (both endpoints within the set) — used both as
/// `scc_permutability_constraints` (feeding `mark_parallel_sccs`) and as
/// `intra_scc_dep_constraints` (feeding the cluster-mode permute-preventing
/// self-loop check): the two names in `SPEC_FULL.md` §4.2 denote the same
/// computation applied at different call sites.
pub fn constraints_within<'a>(
    width: usize,
    deps: impl Iterator<Item = &'a Dep>,
    members: &[StmtId],
) -> ConstraintMatrix {
    let mut cst = ConstraintMatrix::empty(width);
    for dep in deps {
        if members.contains(&dep.src) && members.contains(&dep.dst) {
            cst.extend_from(&permutability_constraints(dep));
        }
    }
    cst
}

/// Union of dep polyhedra for dependences strictly between `a` and `b`
/// (one endpoint in each, either direction) — `inter_scc_dep_constraints`.
pub fn constraints_between<'a>(
    width: usize,
    deps: impl Iterator<Item = &'a Dep>,
    a: &[StmtId],
    b: &[StmtId],
) -> ConstraintMatrix {
    let mut cst = ConstraintMatrix::empty(width);
    for dep in deps {
        let straddles = (a.contains(&dep.src) && b.contains(&dep.dst))
            || (b.contains(&dep.src) && a.contains(&dep.dst));
        if straddles {
            cst.extend_from(&permutability_constraints(dep));
        }
    }
    cst
}

/// Union of self-dependence polyhedra for statement `s` —
/// `intra_stmt_dep_constraints`.
pub fn constraints_intra_stmt<'a>(
    width: usize,
    deps: impl Iterator<Item = &'a Dep>,
    s: StmtId,
) -> ConstraintMatrix {
    let mut cst = ConstraintMatrix::empty(width);
    for dep in deps {
        if dep.is_self_dep() && dep.src == s {
            cst.extend_from(&permutability_constraints(dep));
        }
    }
    cst
}

/// Linear-independence (orthogonality) constraints for an SCC: one row per
/// member statement that still has an uncoloured dim, demanding the sum of
/// its uncoloured per-dim coefficients be `>= 1`. Returns `None` if no
/// member has any uncoloured dim left.
pub fn scc_ortho_constraints(
    nstmts: usize,
    nvar: usize,
    npar: usize,
    members: &[(StmtId, usize, usize)], // (stmt, d_orig, fcg_stmt_offset)
    colour: &[i32],
) -> Option<ConstraintMatrix> {
    let width = cst_width(nstmts, nvar, npar);
    let mut cst = ConstraintMatrix::empty(width);
    let mut any = false;
    for &(s, d_orig, fcg_off) in members {
        let mut row = Row::zero(width);
        let off = stmt_col_offset(s, nvar, npar);
        let mut has_uncoloured = false;
        for k in 0..d_orig {
            if colour[fcg_off + k] == 0 {
                row.coeffs[off + k] = rational::int(1);
                has_uncoloured = true;
            }
        }
        if has_uncoloured {
            row.is_eq = false;
            row.constant = rational::int(-1); // sum >= 1
            cst.push(row);
            any = true;
        }
    }
    if any {
        Some(cst)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_matches_invariant() {
        assert_eq!(cst_width(2, 3, 1), 1 + 1 + 2 * (3 + 1));
    }

    #[test]
    fn bounding_constraints_have_one_reserved_row_per_column() {
        let nstmts = 2;
        let nvar = 2;
        let npar = 1;
        let width = cst_width(nstmts, nvar, npar);
        let cst = coeff_bounding_constraints(nstmts, nvar, npar, DEFAULT_COEFF_BOUND);
        // 2 magnitude rows per column + 1 reserved row per column.
        assert_eq!(cst.rows.len(), 3 * width);
        for col in 0..width {
            let r = &cst.rows[reserved_row_for_col(col, width)];
            assert_eq!(r.coeffs[col], rational::one());
            if col < npar + 1 {
                assert!(!r.is_eq);
            } else {
                assert!(r.is_eq);
            }
        }
    }

    #[test]
    fn force_and_reset_round_trip() {
        let width = cst_width(1, 1, 0);
        let mut cst = coeff_bounding_constraints(1, 1, 0, DEFAULT_COEFF_BOUND);
        let row_idx = reserved_row_for_col(1, width); // first stmt loop coeff
        cst.force_at_least_one(row_idx);
        assert!(!cst.rows[row_idx].is_eq);
        assert_eq!(cst.rows[row_idx].constant, rational::int(-1));
        cst.reset_reserved_row(row_idx);
        assert!(cst.rows[row_idx].is_eq);
        assert_eq!(cst.rows[row_idx].constant, rational::zero());
    }

    #[test]
    fn uniform_self_dep_equates_nothing_but_bounds_scalar() {
        let cst = uniform_dep_constraints(1, 2, 0, StmtId(0), StmtId(0), &[1, 0]);
        // src == dst: no equality rows, just the scalar inequality.
        assert_eq!(cst.rows.len(), 1);
        assert!(!cst.rows[0].is_eq);
    }

    #[test]
    fn uniform_inter_stmt_dep_equates_shared_dims() {
        let cst = uniform_dep_constraints(2, 2, 0, StmtId(0), StmtId(1), &[0, 0]);
        assert_eq!(cst.rows.len(), 3); // 2 equalities + 1 scalar row
        assert!(cst.rows[0].is_eq && cst.rows[1].is_eq);
        assert!(!cst.rows[2].is_eq);
    }
}
