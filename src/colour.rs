//! Colouring & scaling driver
//!
//! Consumes one colour at a time. For each colour, every SCC contributes at
//! most one new schedule dimension; [`colour_fcg_scc_based`] is the outer
//! loop that tries each SCC in id order and falls back to cutting /
//! rebuilding the FCG when a greedy colouring attempt gets stuck (see
//! `SPEC_FULL.md` §4.5).

use crate::ddg::{Ddg, FastIdSet};
use crate::fcg::{Fcg, FcgMode};
use crate::lp::LpOracle;
use crate::scheduler::{FuseMode, ScheduleOptions};
use crate::stmt::{HProp, SccId, Stmt};

/// Bundles the mutable state the colouring driver threads through its
/// recursive and iterative helpers. Grouping these avoids an eight-argument
/// function signature on every recursive call.
pub struct ColourCtx<'a> {
    /// The program's statements.
    pub stmts: &'a mut [Stmt],
    /// The program's dependences.
    pub deps: &'a mut [crate::stmt::Dep],
    /// Current dependence graph / SCC decomposition.
    pub ddg: &'a mut Ddg,
    /// Current fusion conflict graph.
    pub fcg: &'a mut Fcg,
    /// Per-level hyperplane-kind tape, appended to by cut operations.
    pub h_props: &'a mut Vec<HProp>,
    /// Maximum loop nest depth across all statements.
    pub nvar: usize,
    /// Number of symbolic program parameters.
    pub npar: usize,
    /// Run configuration.
    pub opts: &'a ScheduleOptions,
    /// LP/MILP oracle used to rebuild the FCG when colouring gets stuck.
    pub oracle: &'a dyn LpOracle,
}

/// Statement-dim mode: try to extend every statement of `scc` with one new
/// vertex of colour `c`, backtracking over candidate dims. `pos` indexes
/// into `scc.vertices`; `prev_vertex` is the vertex chosen for `pos-1` (or
/// `None` at the start), used to reject adjacent choices within the SCC.
pub fn colour_scc(
    ctx: &mut ColourCtx<'_>,
    scc_id: SccId,
    colour: &mut [i32],
    c: i32,
    pos: usize,
    prev_vertex: Option<usize>,
    discard: &mut FastIdSet,
) -> bool {
    let members = ctx.ddg.sccs[scc_id.as_usize()].vertices.clone();
    let max_dim = ctx.ddg.sccs[scc_id.as_usize()].max_dim;
    let coloured_dims = (c - 1) as usize;

    if pos == members.len() {
        return true;
    }
    if coloured_dims > max_dim {
        return true;
    }
    if coloured_dims == max_dim && members.len() == 1 {
        cut_against_any_connected(ctx, scc_id);
        return true;
    }

    let s = members[pos];
    let stmt = &ctx.stmts[s.as_usize()];
    let offset = stmt.fcg_stmt_offset;
    let d_orig = stmt.d_orig;

    let parallel_sol = ctx.ddg.sccs[scc_id.as_usize()].sol.clone();

    for k in 0..d_orig {
        let v = offset + k;
        if discard.contains(&v) {
            continue;
        }
        if ctx.opts.lpcolour {
            if let Some(sol) = &parallel_sol {
                if k < sol.len() && num_traits::Zero::is_zero(&sol[k]) {
                    continue;
                }
            }
        }
        if colour[v] != 0 && colour[v] != c {
            continue;
        }
        if ctx.fcg.has_self_loop(v) {
            continue;
        }
        if let Some(pv) = prev_vertex {
            if ctx.fcg.is_adjacent(pv, v) {
                continue;
            }
        }
        if conflicts_with_colour(ctx.fcg, v, colour, c) {
            continue;
        }

        let prior = colour[v];
        colour[v] = c;
        if colour_scc(ctx, scc_id, colour, c, pos + 1, Some(v), discard) {
            return true;
        }
        colour[v] = prior;
        discard.insert(v);
    }
    false
}

fn conflicts_with_colour(fcg: &Fcg, v: usize, colour: &[i32], c: i32) -> bool {
    (0..fcg.nvertices).any(|u| u != v && colour[u] == c && fcg.is_adjacent(u, v))
}

/// When a size-1 SCC has exhausted its own dims, any SCC still directly
/// connected to it must be separated from it right now: a scalar cut in
/// `NoFuse` mode severs everything, otherwise only the connected pair.
fn cut_against_any_connected(ctx: &mut ColourCtx<'_>, scc_id: SccId) {
    let nsccs = ctx.ddg.nsccs();
    for other in 0..nsccs {
        if other == scc_id.as_usize() {
            continue;
        }
        if ctx.ddg.sccs_direct_connected(scc_id, SccId(other)) {
            if matches!(ctx.opts.fuse, FuseMode::NoFuse) {
                ctx.ddg.cut_all_sccs(ctx.stmts, ctx.deps, ctx.nvar, ctx.npar, ctx.h_props);
            } else {
                let pivot = SccId(other.max(scc_id.as_usize()));
                ctx.ddg.cut_between_sccs(pivot, ctx.stmts, ctx.deps, ctx.nvar, ctx.npar, ctx.h_props);
            }
            ctx.fcg.mark_rebuild();
            break;
        }
    }
}

/// SCC-cluster mode: one linear scan, first valid dim wins, no recursion —
/// cluster-mode decisions are atomic per SCC.
pub fn colour_scc_cluster(ctx: &mut ColourCtx<'_>, scc_id: SccId, colour: &mut [i32], c: i32) -> bool {
    let scc_offset = ctx.ddg.sccs[scc_id.as_usize()].fcg_scc_offset;
    let max_dim = ctx.ddg.sccs[scc_id.as_usize()].max_dim;
    let coloured_dims = (c - 1) as usize;
    if coloured_dims >= max_dim {
        return true;
    }
    for k in 0..max_dim {
        let v = scc_offset + k;
        if colour[v] != 0 {
            continue;
        }
        if ctx.fcg.has_self_loop(v) {
            continue;
        }
        if !conflicts_with_colour(ctx.fcg, v, colour, c) {
            colour[v] = c;
            return true;
        }
    }
    false
}

fn colour_one_scc(ctx: &mut ColourCtx<'_>, scc_id: SccId, colour: &mut [i32], c: i32) -> bool {
    match ctx.fcg.mode {
        FcgMode::StatementDim => {
            let mut discard = FastIdSet::default();
            colour_scc(ctx, scc_id, colour, c, 0, None, &mut discard)
        }
        FcgMode::SccCluster => colour_scc_cluster(ctx, scc_id, colour, c),
    }
}

/// Free the current FCG, refresh the DDG from currently-unsatisfied
/// dependences, recompute SCCs, and rebuild the FCG from scratch against
/// the current colour map (`SPEC_FULL.md` §4.4 "Rebuild").
fn rebuild_fcg(ctx: &mut ColourCtx<'_>, colour: &[i32]) -> Fcg {
    ctx.ddg.update(ctx.deps);
    ctx.ddg.recompute_sccs(ctx.stmts);
    Fcg::build(
        ctx.fcg.mode,
        ctx.fcg.nvertices,
        ctx.stmts,
        ctx.deps,
        ctx.ddg,
        ctx.nvar,
        ctx.npar,
        ctx.opts,
        ctx.oracle,
        colour,
    )
}

/// Outer driver for one colour round: visit every SCC in id order, retrying
/// via cut/rebuild when a greedy attempt fails (`SPEC_FULL.md` §4.5).
pub fn colour_fcg_scc_based(ctx: &mut ColourCtx<'_>, c: i32, colour: &mut [i32]) {
    let nsccs = ctx.ddg.nsccs();
    let mut prev_scc: Option<usize> = None;

    for i in 0..nsccs {
        let scc_id = SccId(i);
        if colour_one_scc(ctx, scc_id, colour, c) {
            ctx.ddg.sccs[i].is_scc_coloured = true;
            prev_scc = Some(i);
            continue;
        }

        // Failure path (a): rebuild is already pending, or this is the
        // first SCC of the round — cut (if no-fuse) and force a rebuild.
        if ctx.fcg.to_be_rebuilt || i == 0 {
            if matches!(ctx.opts.fuse, FuseMode::NoFuse) {
                ctx.ddg.cut_all_sccs(ctx.stmts, ctx.deps, ctx.nvar, ctx.npar, ctx.h_props);
            }
            *ctx.fcg = rebuild_fcg(ctx, colour);
            if i != 0 && colour_one_scc(ctx, scc_id, colour, c) {
                ctx.ddg.sccs[i].is_scc_coloured = true;
                prev_scc = Some(i);
                continue;
            }
            if let Some(p) = prev_scc {
                if matches!(ctx.opts.fuse, FuseMode::NoFuse) {
                    ctx.ddg.cut_all_sccs(ctx.stmts, ctx.deps, ctx.nvar, ctx.npar, ctx.h_props);
                } else {
                    ctx.ddg.cut_between_sccs(SccId(p.max(i)), ctx.stmts, ctx.deps, ctx.nvar, ctx.npar, ctx.h_props);
                }
                ctx.fcg.update_fcg_between_sccs(ctx.ddg, ctx.stmts, SccId(i), matches!(ctx.opts.fuse, FuseMode::NoFuse));
            }
            if colour_one_scc(ctx, scc_id, colour, c) {
                ctx.ddg.sccs[i].is_scc_coloured = true;
                prev_scc = Some(i);
                continue;
            }
        } else {
            // Failure path (b): directly mutate the FCG between the
            // previous SCC and this one, then retry.
            ctx.fcg.update_fcg_between_sccs(ctx.ddg, ctx.stmts, SccId(i), matches!(ctx.opts.fuse, FuseMode::NoFuse));
            if colour_one_scc(ctx, scc_id, colour, c) {
                ctx.ddg.sccs[i].is_scc_coloured = true;
                prev_scc = Some(i);
                continue;
            }
        }

        // Failure path (c): force a full rebuild and retry one last time.
        *ctx.fcg = rebuild_fcg(ctx, colour);
        let ok = colour_one_scc(ctx, scc_id, colour, c);
        assert!(ok, "FCG colouring invariant violated: scc {i} uncolourable at colour {c} after rebuild");
        ctx.ddg.sccs[i].is_scc_coloured = true;
        prev_scc = Some(i);
    }
}
