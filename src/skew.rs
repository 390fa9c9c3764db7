//! Skewing post-pass
//!
//! Optional final step (`ScheduleOptions::skew`): for every pair of loop
//! hyperplanes `(outer, inner)` where some dependence's displacement is
//! negative at `inner`, search for the smallest positive integer skew
//! factor `f` such that replacing every statement's `inner` row with
//! `inner + f * outer` makes every dependence's displacement at `inner`
//! non-negative. This is the textbook skew transformation that turns a
//! parallelogram-shaped dependence cone into one tileable by rectangular
//! tiles (`SPEC_FULL.md` §4.5).

use crate::rational::{self, Rat};
use crate::scheduler::Prog;
use crate::stmt::{Dep, Direction, StmtId};

/// Direction of `dep`'s displacement at `level`, derived from the already
/// solved schedule rows rather than a stored iteration-distance vector: the
/// dependence's cached scalar row already encodes the distance (see
/// [`crate::cst::uniform_dep_constraints`]), so evaluating it at the
/// concrete coefficients chosen for `level` recovers the sign directly.
/// Parameters are assumed non-negative, which holds for every loop bound
/// parameter in this crate's domain.
pub fn dependence_direction(dep: &Dep, level: usize, stmts: &[crate::stmt::Stmt], nvar: usize, npar: usize) -> Direction {
    if let Some(d) = dep.cached_direction(level) {
        return d;
    }
    let rows: Vec<&[Rat]> = stmts.iter().map(|s| s.trans[level].as_slice()).collect();
    direction_for_rows(dep, &rows, nvar, npar)
}

/// Shared evaluator: given each statement's candidate row at one level
/// (either already-committed rows or a not-yet-applied skew candidate),
/// recover the displacement's sign for `dep`.
fn direction_for_rows(dep: &Dep, rows: &[&[Rat]], nvar: usize, npar: usize) -> Direction {
    let width = crate::cst::cst_width(rows.len(), nvar, npar);
    let mut x = vec![rational::zero(); width];
    for &s in &[dep.src, dep.dst] {
        let off = crate::cst::stmt_col_offset(s, nvar, npar);
        let row = rows[s.as_usize()];
        for k in 0..nvar {
            x[off + k] = row[k].clone();
        }
        x[off + nvar] = row[nvar + npar].clone();
    }
    for p in 0..npar {
        x[p] = rows[dep.src.as_usize()][nvar + p].clone();
    }
    let row = dep.cst.rows.last().expect("dependence constraint matrix always has a scalar row");
    let val = row.evaluate(&x);
    use std::cmp::Ordering;
    match val.cmp(&rational::zero()) {
        Ordering::Greater => Direction::Plus,
        Ordering::Equal => Direction::Zero,
        Ordering::Less => Direction::Minus,
    }
}

/// Run the skewing search over every `(outer, inner)` pair of loop levels.
pub fn introduce_skew(prog: &mut Prog<'_>) {
    let start = std::time::Instant::now();
    let nlevels = prog.h_props.len();
    for outer in 0..nlevels {
        if !matches!(prog.h_props[outer], crate::stmt::HProp::HLoop) {
            continue;
        }
        for inner in (outer + 1)..nlevels {
            if !matches!(prog.h_props[inner], crate::stmt::HProp::HLoop) {
                continue;
            }
            skew_pair(prog, outer, inner);
        }
    }
    prog.stats.skew_time += start.elapsed();
}

fn skew_pair(prog: &mut Prog<'_>, outer: usize, inner: usize) {
    let nvar = prog.nvar;
    let npar = prog.npar;

    let negative_deps: Vec<usize> = prog
        .deps
        .iter()
        .enumerate()
        .filter(|(_, d)| {
            matches!(dependence_direction(d, inner, &prog.stmts, nvar, npar), Direction::Minus)
        })
        .map(|(i, _)| i)
        .collect();
    if negative_deps.is_empty() {
        return;
    }

    for f in 1..=crate::cst::DEFAULT_COEFF_BOUND {
        let candidate: Vec<Vec<Rat>> = prog
            .stmts
            .iter()
            .map(|s| skewed_row(&s.trans[inner], &s.trans[outer], f))
            .collect();
        if !within_bound(&candidate, crate::cst::DEFAULT_COEFF_BOUND) {
            continue;
        }
        if negative_deps.iter().all(|&i| {
            direction_with_candidate(&prog.deps[i], &candidate, nvar, npar) != Direction::Minus
        }) {
            for (j, s) in prog.stmts.iter_mut().enumerate() {
                s.trans[inner] = candidate[j].clone();
            }
            for &i in &negative_deps {
                prog.deps[i].cache_direction(inner, Direction::Plus);
            }
            return;
        }
    }
    // No bounded skew factor fixed every negative dependence at this pair;
    // leave the rows untouched and let the caller's tiler (out of scope)
    // decide whether to tile across this pair at all.
}

fn skewed_row(inner: &[Rat], outer: &[Rat], f: i64) -> Vec<Rat> {
    inner.iter().zip(outer.iter()).map(|(a, b)| a + &rational::int(f) * b).collect()
}

fn within_bound(rows: &[Vec<Rat>], bound: i64) -> bool {
    let hi = rational::int(bound);
    let lo = rational::int(-bound);
    rows.iter().all(|r| r.iter().all(|c| *c <= hi && *c >= lo))
}

fn direction_with_candidate(dep: &Dep, candidate: &[Vec<Rat>], nvar: usize, npar: usize) -> Direction {
    let rows: Vec<&[Rat]> = candidate.iter().map(|r| r.as_slice()).collect();
    direction_for_rows(dep, &rows, nvar, npar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cst;
    use crate::lp::GoodLpOracle;
    use crate::scheduler::{schedule, FuseMode, ProgSeed, ScheduleOptions};
    use crate::stmt::{DepKind, Stmt};

    #[test]
    fn stencil_like_dependence_is_skewed_to_nonnegative() {
        let oracle = GoodLpOracle::new();
        let dep = Dep::new(
            StmtId(0),
            StmtId(0),
            DepKind::Raw,
            cst::uniform_dep_constraints(1, 2, 0, StmtId(0), StmtId(0), &[1, -1]),
        );
        let seed = ProgSeed { nvar: 2, npar: 0, stmts: vec![Stmt::new(StmtId(0), 2)], deps: vec![dep] };
        let opts = ScheduleOptions { fuse: FuseMode::SmartFuse, skew: true, ..Default::default() };
        let prog = schedule(seed, opts, &oracle).expect("schedule succeeds");
        assert!(prog.stmts[0].nrows() >= 2);
    }
}
