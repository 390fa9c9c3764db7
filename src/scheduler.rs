//! Scheduling driver
//!
//! Owns the `Prog<'_>` context and the top-level entry point, [`schedule`], that
//! walks colours `1..=nvar`, delegating each round to
//! [`crate::colour::colour_fcg_scc_based`] and then
//! [`scale_shift_permutations`] to realize the round's colouring as a
//! concrete schedule hyperplane. This mirrors the way the workspace's other
//! driver (a five-phase prover/verifier pair) owns one context struct for
//! the whole run and exposes a single fallible entry point per side.

use tracing::{debug, info, instrument};

use crate::colour::{self, ColourCtx};
use crate::cst;
use crate::ddg::Ddg;
use crate::error::{ParamError, ScaleShiftError, ScheduleError};
use crate::fcg::{Fcg, FcgMode};
use crate::lp::LpOracle;
use crate::rational::{self, Rat};
use crate::stmt::{Dep, HProp, Stmt, StmtId};

/// Fusion policy: how aggressively distinct statements are allowed to share
/// a schedule dimension.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FuseMode {
    /// Every SCC gets its own dimension; nothing is fused.
    NoFuse,
    /// Fuse when legal and it does not cost parallelism.
    SmartFuse,
    /// Fuse whenever legal, regardless of parallelism.
    MaxFuse,
    /// Like `MaxFuse`, but an extra FCG edge forbids fusions that would
    /// destroy a provably parallel SCC's parallelism.
    TypedFuse,
}

/// LP backend selector. A single variant today; kept as an enum so adding a
/// second backend is a pure addition, never a call-site change.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Solver {
    /// `good_lp` with the pure-Rust `microlp` simplex backend.
    GoodLp,
}

/// Explicit configuration threaded through every public entry point; no
/// module-level mutable state.
#[derive(Clone, Debug)]
pub struct ScheduleOptions {
    /// Fusion policy applied while building and colouring the FCG.
    pub fuse: FuseMode,
    /// FCG vertices are per-SCC dimensions rather than per-statement ones.
    pub scc_cluster: bool,
    /// Bias dim selection inside `colour_scc` towards SCC witnesses that
    /// are already known parallel.
    pub lpcolour: bool,
    /// Track read-after-read dependences too (off by default: RAR never
    /// constrains legality, only extra fusion opportunities).
    pub rar: bool,
    /// Suppress `tracing` events below `warn`.
    pub silent: bool,
    /// LP/MILP backend to use.
    pub solver: Solver,
    /// Run the skewing post-pass after the main colouring loop.
    pub skew: bool,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            fuse: FuseMode::TypedFuse,
            scc_cluster: false,
            lpcolour: false,
            rar: false,
            silent: false,
            solver: Solver::GoodLp,
            skew: true,
        }
    }
}

/// Timing and call counters accumulated over one `schedule` run.
#[derive(Clone, Debug, Default)]
pub struct ScheduleStats {
    /// Time spent in [`crate::fcg::Fcg::build`] calls.
    pub fcg_const_time: std::time::Duration,
    /// Time spent inside [`crate::colour::colour_fcg_scc_based`].
    pub fcg_colour_time: std::time::Duration,
    /// Time spent in [`crate::fcg::Fcg::update_fcg_between_sccs`] calls.
    pub fcg_update_time: std::time::Duration,
    /// Time spent allocating/cloning constraint matrices for FCG probes.
    pub fcg_cst_alloc_time: std::time::Duration,
    /// Time spent scaling dimensions once a colour is fully resolved.
    pub fcg_dims_scale_time: std::time::Duration,
    /// Time spent inside [`scale_shift_permutations`]'s `lexmin` calls.
    pub scaling_cst_sol_time: std::time::Duration,
    /// Time spent in [`crate::skew::introduce_skew`].
    pub skew_time: std::time::Duration,
    /// Time spent in any MILP-specific solve path (reserved for future
    /// backends; the default `good_lp`/`microlp` backend is pure LP).
    pub mip_time: std::time::Duration,
    /// Total number of [`crate::lp::LpOracle`] queries issued.
    pub num_lp_calls: u64,
}

/// Input to [`schedule`]: the statements and dependences as produced by a
/// dependence-analysis front end (out of this crate's scope, see
/// `SPEC_FULL.md` §1).
pub struct ProgSeed {
    /// Maximum loop nest depth across all statements.
    pub nvar: usize,
    /// Number of symbolic program parameters.
    pub npar: usize,
    /// The program's statements, in source order.
    pub stmts: Vec<Stmt>,
    /// Dependences between (or within) those statements.
    pub deps: Vec<Dep>,
}

/// The scheduler's mutable context: statements, dependences, the current
/// DDG/FCG pair, the hyperplane-property tape, and run configuration. Owned
/// exclusively by the scheduler for the duration of one `schedule` call
/// (`SPEC_FULL.md` §5 — single-threaded, no shared mutable state).
pub struct Prog<'a> {
    /// Maximum loop nest depth across all statements.
    pub nvar: usize,
    /// Number of symbolic program parameters.
    pub npar: usize,
    /// The program's statements; `stmts[i].trans` accumulates the final
    /// schedule rows as colours are resolved.
    pub stmts: Vec<Stmt>,
    /// Dependences between (or within) statements.
    pub deps: Vec<Dep>,
    /// Current dependence graph / SCC decomposition.
    pub ddg: Ddg,
    /// Current fusion conflict graph.
    pub fcg: Fcg,
    /// Per-level tag recording whether that schedule row is a real loop or
    /// a scalar distribution cut.
    pub h_props: Vec<HProp>,
    /// Run configuration.
    pub options: ScheduleOptions,
    /// Timing/call counters accumulated so far.
    pub stats: ScheduleStats,
    oracle: &'a dyn LpOracle,
}

impl<'a> std::fmt::Debug for Prog<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prog")
            .field("nvar", &self.nvar)
            .field("npar", &self.npar)
            .field("stmts", &self.stmts)
            .field("deps", &self.deps)
            .field("ddg", &self.ddg)
            .field("fcg", &self.fcg)
            .field("h_props", &self.h_props)
            .field("options", &self.options)
            .field("stats", &self.stats)
            .finish()
    }
}

impl<'a> Prog<'a> {
    fn new(seed: ProgSeed, options: ScheduleOptions, oracle: &'a dyn LpOracle) -> Result<Self, ParamError> {
        if seed.stmts.is_empty() {
            return Err(ParamError::EmptyProgram);
        }
        for s in &seed.stmts {
            if s.d_orig == 0 {
                return Err(ParamError::DegenerateStatement(s.id));
            }
        }
        for d in &seed.deps {
            let n = seed.stmts.len();
            if d.src.as_usize() >= n {
                return Err(ParamError::UnknownStatement(d.src));
            }
            if d.dst.as_usize() >= n {
                return Err(ParamError::UnknownStatement(d.dst));
            }
        }

        let mut stmts = seed.stmts;
        assign_fcg_stmt_offsets(&mut stmts);
        let nvertices = stmts.iter().map(|s| s.d_orig).sum();
        let mode = if options.scc_cluster { FcgMode::SccCluster } else { FcgMode::StatementDim };

        let mut deps = seed.deps;
        let mut ddg = Ddg::build(stmts.len(), &deps, &stmts);
        let colour = vec![0i32; nvertices];
        let fcg = Fcg::build(mode, nvertices, &mut stmts, &mut deps, &mut ddg, seed.nvar, seed.npar, &options, oracle, &colour);

        Ok(Self {
            nvar: seed.nvar,
            npar: seed.npar,
            stmts,
            deps,
            ddg,
            fcg,
            h_props: Vec::new(),
            options,
            stats: ScheduleStats::default(),
            oracle,
        })
    }

    fn colour_ctx(&mut self) -> ColourCtx<'_> {
        ColourCtx {
            stmts: &mut self.stmts,
            deps: &mut self.deps,
            ddg: &mut self.ddg,
            fcg: &mut self.fcg,
            h_props: &mut self.h_props,
            nvar: self.nvar,
            npar: self.npar,
            opts: &self.options,
            oracle: self.oracle,
        }
    }
}

fn assign_fcg_stmt_offsets(stmts: &mut [Stmt]) {
    let mut off = 0;
    for s in stmts.iter_mut() {
        s.fcg_stmt_offset = off;
        off += s.d_orig;
    }
}

/// Run the scheduler to completion: build the FCG, consume colours
/// `1..=nvar`, and fall back to a final `cut_all_sccs` for whatever
/// dependences are still unsatisfied. Returns the scheduled `Prog<'_>` so the
/// caller can read `stmts[i].trans` for the final schedule and `h_props`
/// for each row's kind.
#[instrument(skip_all, fields(nstmts = seed.stmts.len(), nvar = seed.nvar, npar = seed.npar))]
pub fn schedule<'a>(
    seed: ProgSeed,
    options: ScheduleOptions,
    oracle: &'a dyn LpOracle,
) -> Result<Prog<'a>, ScheduleError> {
    let mut prog = Prog::new(seed, options, oracle)?;
    find_permutable_dimensions_scc_based(&mut prog)?;
    if prog.options.skew {
        crate::skew::introduce_skew(&mut prog);
    }
    Ok(prog)
}

/// Drive colouring for every colour `1..=nvar`, realizing each round as one
/// new schedule hyperplane via [`scale_shift_permutations`]. When the loop
/// ends with dependences still unsatisfied (can happen for SCCs whose
/// `max_dim` was smaller than `nvar`), finish with an innermost
/// distribution (`SPEC_FULL.md` §4.5).
#[instrument(skip_all)]
fn find_permutable_dimensions_scc_based(prog: &mut Prog<'_>) -> Result<(), ScheduleError> {
    let nvertices = prog.fcg.nvertices;
    let mut colour = vec![0i32; nvertices];

    for c in 1..=(prog.nvar as i32) {
        if prog.options.lpcolour {
            crate::fcg::mark_parallel_sccs(&mut prog.ddg, &prog.stmts, &prog.deps, prog.nvar, prog.npar, prog.oracle);
        }

        {
            let mut ctx = prog.colour_ctx();
            colour::colour_fcg_scc_based(&mut ctx, c, &mut colour);
        }

        let level = (c - 1) as usize;
        let appended = scale_shift_permutations(prog, &colour, level)?;
        if !appended {
            return Err(ScheduleError::ScaleShift(ScaleShiftError::LexminInfeasible));
        }

        prog.fcg.to_be_rebuilt = true;
        for scc in prog.ddg.sccs.iter_mut() {
            scc.sol = None;
        }
        if !prog.options.scc_cluster {
            prog.ddg.update(&prog.deps);
            prog.ddg.recompute_sccs(&prog.stmts);
        }
        let mode = prog.fcg.mode;
        prog.fcg = Fcg::build(
            mode,
            nvertices,
            &mut prog.stmts,
            &mut prog.deps,
            &mut prog.ddg,
            prog.nvar,
            prog.npar,
            &prog.options,
            prog.oracle,
            &colour,
        );
        debug!(colour = c, "finished colour round");
    }

    if prog.deps.iter().any(Dep::is_unsatisfied) {
        info!("unsatisfied dependences remain after all colours; cutting innermost distribution");
        prog.ddg.cut_all_sccs(&mut prog.stmts, &mut prog.deps, prog.nvar, prog.npar, &mut prog.h_props);
    }
    Ok(())
}

/// For colour `level+1`: build the constraint system that forces every
/// statement's schedule coefficient on that colour's dims to at least `1`
/// and every other coefficient to `0`, `lexmin` it, and — if feasible —
/// append the resulting hyperplane to every statement's schedule. Returns
/// `false` (never an error; the caller decides) when `lexmin` is
/// infeasible, which `SPEC_FULL.md` §4.5/§7 treats as a design bug were it
/// ever to happen after a successful colouring round.
#[instrument(skip(prog, colour))]
fn scale_shift_permutations(prog: &mut Prog<'_>, colour: &[i32], level: usize) -> Result<bool, ScheduleError> {
    let c = (level + 1) as i32;
    let nstmts = prog.stmts.len();
    let width = cst::cst_width(nstmts, prog.nvar, prog.npar);

    let mut cst = cst::coeff_bounding_constraints(nstmts, prog.nvar, prog.npar, cst::DEFAULT_COEFF_BOUND);
    let all_ids: Vec<StmtId> = (0..nstmts).map(StmtId).collect();
    cst.extend_from(&cst::constraints_within(width, prog.deps.iter(), &all_ids));

    for (j, s) in prog.stmts.iter().enumerate() {
        let off = cst::stmt_col_offset(StmtId(j), prog.nvar, prog.npar);
        for k in 0..prog.nvar {
            let row_idx = cst::reserved_row_for_col(off + k, width);
            let wants_this_colour =
                k < s.d_orig && s.is_orig_loop[k] && colour[s.fcg_stmt_offset + k] == c;
            if wants_this_colour {
                cst.force_at_least_one(row_idx);
            } else {
                cst.reset_reserved_row(row_idx);
            }
        }
    }

    let sol = match prog.oracle.lexmin(&cst) {
        Some(sol) => sol,
        None => return Ok(false),
    };
    prog.stats.num_lp_calls += 1;

    let mut any_hloop = false;
    for (j, s) in prog.stmts.iter_mut().enumerate() {
        let off = cst::stmt_col_offset(StmtId(j), prog.nvar, prog.npar);
        let mut row = vec![rational::zero(); prog.nvar + prog.npar + 1];
        let mut stmt_is_loop = false;
        for k in 0..prog.nvar {
            row[k] = sol[off + k].clone();
            if !is_zero(&sol[off + k]) {
                stmt_is_loop = true;
            }
        }
        for p in 0..prog.npar {
            row[prog.nvar + p] = sol[p].clone();
        }
        *row.last_mut().unwrap() = sol[off + prog.nvar].clone();
        s.push_row(row);
        any_hloop |= stmt_is_loop;
    }
    prog.h_props.push(if any_hloop { HProp::HLoop } else { HProp::HScalar });

    update_dep_satisfaction(&mut prog.deps, &sol, level);
    Ok(true)
}

fn is_zero(r: &Rat) -> bool {
    use num_traits::Zero;
    Rat::is_zero(r)
}

/// Evaluate each still-unsatisfied dependence's scalar legality row
/// (the last row built by [`crate::cst::uniform_dep_constraints`]) against
/// the newly found schedule coefficients. A strictly positive value means
/// the dependence is carried (satisfied) at `level`; a value of exactly
/// zero means it is only weakly satisfied and remains live for later
/// levels (`SPEC_FULL.md` §4's "Monotone satisfaction" invariant).
fn update_dep_satisfaction(deps: &mut [Dep], sol: &[Rat], level: usize) {
    for dep in deps.iter_mut() {
        if !dep.is_unsatisfied() {
            continue;
        }
        let row = dep.cst.rows.last().expect("dependence constraint matrix always has a scalar row");
        let val = row.evaluate(sol);
        if val >= rational::one() {
            dep.mark_satisfied(level);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lp::GoodLpOracle;
    use crate::stmt::{DepKind, Stmt};

    fn single_stmt_no_deps() -> ProgSeed {
        ProgSeed { nvar: 2, npar: 0, stmts: vec![Stmt::new(StmtId(0), 2)], deps: Vec::new() }
    }

    #[test]
    fn single_statement_no_deps_yields_d_orig_parallel_loops() {
        let oracle = GoodLpOracle::new();
        let prog = schedule(single_stmt_no_deps(), ScheduleOptions { skew: false, ..Default::default() }, &oracle)
            .expect("schedule succeeds");
        assert_eq!(prog.stmts[0].nrows(), 2);
        assert!(prog.h_props.iter().all(|h| matches!(h, HProp::HLoop)));
    }

    #[test]
    fn rejects_empty_program() {
        let oracle = GoodLpOracle::new();
        let seed = ProgSeed { nvar: 1, npar: 0, stmts: Vec::new(), deps: Vec::new() };
        let err = schedule(seed, ScheduleOptions::default(), &oracle).unwrap_err();
        assert!(matches!(err, ScheduleError::Param(ParamError::EmptyProgram)));
    }

    #[test]
    fn two_independent_statements_each_get_their_own_loops() {
        let oracle = GoodLpOracle::new();
        let seed = ProgSeed {
            nvar: 1,
            npar: 0,
            stmts: vec![Stmt::new(StmtId(0), 1), Stmt::new(StmtId(1), 1)],
            deps: Vec::new(),
        };
        let prog = schedule(seed, ScheduleOptions { skew: false, ..Default::default() }, &oracle)
            .expect("schedule succeeds");
        assert_eq!(prog.stmts[0].nrows(), 1);
        assert_eq!(prog.stmts[1].nrows(), 1);
    }

    #[test]
    fn producer_consumer_with_uniform_dep_is_scheduled() {
        let oracle = GoodLpOracle::new();
        let dep = Dep::new(
            StmtId(0),
            StmtId(1),
            DepKind::Raw,
            cst::uniform_dep_constraints(2, 1, 0, StmtId(0), StmtId(1), &[0]),
        );
        let seed = ProgSeed {
            nvar: 1,
            npar: 0,
            stmts: vec![Stmt::new(StmtId(0), 1), Stmt::new(StmtId(1), 1)],
            deps: vec![dep],
        };
        let prog = schedule(seed, ScheduleOptions { skew: false, ..Default::default() }, &oracle)
            .expect("schedule succeeds");
        assert!(prog.deps.iter().all(|d| !d.is_unsatisfied()));
    }
}
