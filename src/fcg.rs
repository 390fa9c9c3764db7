//! Fusion Conflict Graph engine
//!
//! The FCG is the auxiliary graph whose colouring drives the whole
//! scheduler: one vertex per still-uncoloured schedule dimension, one edge
//! per pair of dimensions that cannot share a colour (because fusing them
//! at the same level is either illegal or, in `TypedFuse` mode, legal but
//! would destroy parallelism). Colouring it one colour at a time, in
//! [`crate::colour`], is what produces the schedule's hyperplanes.

use crate::cst::{self, ConstraintMatrix};
use crate::ddg::Ddg;
use crate::lp::LpOracle;
use crate::rational::{self, Rat};
use crate::scheduler::{FuseMode, ScheduleOptions};
use crate::stmt::{Dep, SccId, Stmt, StmtId};

/// Which entities own FCG vertices: one per statement loop-dim, or one per
/// SCC loop-dim shared by every member statement.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FcgMode {
    /// One FCG vertex per statement loop dimension.
    StatementDim,
    /// One FCG vertex per SCC loop dimension, shared by every member.
    SccCluster,
}

impl FcgMode {
    /// Documented for lint compliance.
    fn from_options(opts: &ScheduleOptions) -> Self {
        if opts.scc_cluster {
            FcgMode::SccCluster
        } else {
            FcgMode::StatementDim
        }
    }
}

/// The fusion conflict graph: a dense symmetric adjacency matrix over
/// `nvertices` schedule-dimension vertices.
#[derive(Debug)]
pub struct Fcg {
    /// Vertex granularity this instance was built with.
    pub mode: FcgMode,
    /// Total number of vertices (dimensions).
    pub nvertices: usize,
    adj: Vec<bool>,
    /// How many vertices already carry a nonzero colour.
    pub num_coloured_vertices: usize,
    /// Set when a colouring attempt has given up and needs a fresh
    /// [`Fcg::build`] before the round can be retried.
    pub to_be_rebuilt: bool,
}

impl Fcg {
    #[inline]
    fn idx(&self, u: usize, v: usize) -> usize {
        u * self.nvertices + v
    }

    #[inline]
    /// Documented for lint compliance.
    pub fn is_adjacent(&self, u: usize, v: usize) -> bool {
        self.adj[self.idx(u, v)]
    }

    #[inline]
    /// Documented for lint compliance.
    pub fn has_self_loop(&self, v: usize) -> bool {
        self.adj[self.idx(v, v)]
    }

    fn add_edge(&mut self, u: usize, v: usize) {
        let iuv = self.idx(u, v);
        let ivu = self.idx(v, u);
        self.adj[iuv] = true;
        self.adj[ivu] = true;
    }

    fn remove_edge(&mut self, u: usize, v: usize) {
        let iuv = self.idx(u, v);
        let ivu = self.idx(v, u);
        self.adj[iuv] = false;
        self.adj[ivu] = false;
    }

    /// Vertex range `[offset, offset+count)` owned by entity `i` (a
    /// statement in statement-dim mode, an SCC in cluster mode).
    pub fn entity_vertices(&self, offset: usize, count: usize) -> std::ops::Range<usize> {
        offset..(offset + count)
    }

    /// Build a fresh FCG from scratch, following `SPEC_FULL.md` §4.4.
    pub fn build(
        mode: FcgMode,
        nvertices: usize,
        stmts: &mut [Stmt],
        deps: &mut [Dep],
        ddg: &mut Ddg,
        nvar: usize,
        npar: usize,
        opts: &ScheduleOptions,
        oracle: &dyn LpOracle,
        colour: &[i32],
    ) -> Fcg {
        let mut fcg =
            Fcg { mode, nvertices, adj: vec![false; nvertices * nvertices], num_coloured_vertices: 0, to_be_rebuilt: false };
        fcg.num_coloured_vertices = colour.iter().filter(|&&c| c != 0).count();

        let nstmts = stmts.len();
        let width = cst::cst_width(nstmts, nvar, npar);
        let base = cst::coeff_bounding_constraints(nstmts, nvar, npar, cst::DEFAULT_COEFF_BOUND);

        // Step 3: permute-preventing self-loops.
        match mode {
            FcgMode::StatementDim => {
                for s in stmts.iter_mut() {
                    let intra = match s.intra_stmt_dep_cst() {
                        Some(c) => c.clone(),
                        None => {
                            let c = cst::constraints_intra_stmt(width, deps.iter(), s.id);
                            s.set_intra_stmt_dep_cst(c.clone());
                            c
                        }
                    };
                    for k in 0..s.d_orig {
                        let v = s.fcg_stmt_offset + k;
                        if colour[v] != 0 {
                            continue;
                        }
                        let row_idx = cst::reserved_row_for_col(
                            cst::stmt_col_offset(s.id, nvar, npar) + k,
                            width,
                        );
                        let mut cand = base.clone();
                        cand.extend_from(&intra);
                        cand.force_at_least_one(row_idx);
                        if oracle.feasibility_lexmin(&cand, &vec![rational::zero(); width]).is_none() {
                            fcg.add_edge(v, v);
                        }
                    }
                }
            }
            FcgMode::SccCluster => {
                for scc in &ddg.sccs {
                    let members: Vec<StmtId> = scc.vertices.clone();
                    let intra = cst::constraints_within(width, deps.iter(), &members);
                    for k in 0..scc.max_dim {
                        let v = scc.fcg_scc_offset + k;
                        if colour[v] != 0 {
                            continue;
                        }
                        let mut cand = base.clone();
                        cand.extend_from(&intra);
                        for &s in &members {
                            if k < stmts[s.as_usize()].d_orig {
                                let row_idx = cst::reserved_row_for_col(
                                    cst::stmt_col_offset(s, nvar, npar) + k,
                                    width,
                                );
                                cand.force_at_least_one(row_idx);
                            }
                        }
                        if oracle.feasibility_lexmin(&cand, &vec![rational::zero(); width]).is_none() {
                            fcg.add_edge(v, v);
                        }
                    }
                }
            }
        }

        // Step 4: typed-fuse parallelism marking.
        if matches!(opts.fuse, FuseMode::TypedFuse) {
            mark_parallel_sccs(ddg, stmts, deps, nvar, npar, oracle);
        }

        // Step 5: inter-entity edges.
        let nsccs = ddg.nsccs();
        for a in 0..nsccs {
            for b in (a + 1)..nsccs {
                let sa = SccId(a);
                let sb = SccId(b);
                if !ddg.sccs_direct_connected(sa, sb) {
                    continue;
                }
                let between = cst::constraints_between(
                    width,
                    deps.iter(),
                    &ddg.sccs[a].vertices,
                    &ddg.sccs[b].vertices,
                );
                let typed_crosses_parallel =
                    matches!(opts.fuse, FuseMode::TypedFuse) && (ddg.sccs[a].is_parallel || ddg.sccs[b].is_parallel);

                match mode {
                    FcgMode::StatementDim => {
                        for &su in &ddg.sccs[a].vertices {
                            for &sv in &ddg.sccs[b].vertices {
                                let stu = &stmts[su.as_usize()];
                                let stv = &stmts[sv.as_usize()];
                                for ku in 0..stu.d_orig {
                                    let vu = stu.fcg_stmt_offset + ku;
                                    if colour[vu] != 0 {
                                        continue;
                                    }
                                    for kv in 0..stv.d_orig {
                                        let vv = stv.fcg_stmt_offset + kv;
                                        if colour[vv] != 0 || vu == vv {
                                            continue;
                                        }
                                        resolve_pair_edge(
                                            &mut fcg, oracle, &base, &between, width, nvar, npar,
                                            su, ku, sv, kv, vu, vv, typed_crosses_parallel,
                                        );
                                    }
                                }
                            }
                        }
                    }
                    FcgMode::SccCluster => {
                        let max_dim_a = ddg.sccs[a].max_dim;
                        let max_dim_b = ddg.sccs[b].max_dim;
                        for ku in 0..max_dim_a {
                            let vu = ddg.sccs[a].fcg_scc_offset + ku;
                            if colour[vu] != 0 {
                                continue;
                            }
                            for kv in 0..max_dim_b {
                                let vv = ddg.sccs[b].fcg_scc_offset + kv;
                                if colour[vv] != 0 {
                                    continue;
                                }
                                let mut cand = base.clone();
                                cand.extend_from(&between);
                                force_scc_dim(&mut cand, &ddg.sccs[a].vertices, stmts, nvar, npar, ku, width);
                                force_scc_dim(&mut cand, &ddg.sccs[b].vertices, stmts, nvar, npar, kv, width);
                                let obj = vec![rational::zero(); width];
                                match oracle.feasibility_lexmin(&cand, &obj) {
                                    None => fcg.add_edge(vu, vv),
                                    Some(sol) => {
                                        if typed_crosses_parallel && !is_lp_solution_parallel(&sol, npar) {
                                            fcg.add_edge(vu, vv);
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        // Step 6: intra-entity cliques.
        match mode {
            FcgMode::StatementDim => {
                for s in stmts.iter() {
                    clique(&mut fcg, s.fcg_stmt_offset, s.d_orig);
                }
            }
            FcgMode::SccCluster => {
                for scc in &ddg.sccs {
                    clique(&mut fcg, scc.fcg_scc_offset, scc.max_dim);
                }
            }
        }

        // Step 7: free intra-stmt caches, now stale.
        for s in stmts.iter_mut() {
            s.free_intra_stmt_dep_cst();
        }
        for d in deps.iter_mut() {
            d.free_intra_cache();
        }

        fcg
    }

    /// Erase every edge connecting a dim of a statement in an SCC `< b` to a
    /// dim of a statement in an SCC `>= b` (both directions). In cluster
    /// mode the same rule applies at SCC granularity directly.
    pub fn update_fcg_between_sccs(&mut self, ddg: &Ddg, stmts: &[Stmt], pivot: SccId, no_fuse: bool) {
        let nsccs = ddg.nsccs();
        match self.mode {
            FcgMode::StatementDim => {
                for a in 0..nsccs {
                    for b in 0..nsccs {
                        if a == b {
                            continue;
                        }
                        let crosses = if no_fuse {
                            true
                        } else {
                            (a < pivot.as_usize()) != (b < pivot.as_usize())
                        };
                        if !crosses {
                            continue;
                        }
                        for &su in &ddg.sccs[a].vertices {
                            for &sv in &ddg.sccs[b].vertices {
                                let stu = &stmts[su.as_usize()];
                                let stv = &stmts[sv.as_usize()];
                                for ku in 0..stu.d_orig {
                                    for kv in 0..stv.d_orig {
                                        self.remove_edge(stu.fcg_stmt_offset + ku, stv.fcg_stmt_offset + kv);
                                    }
                                }
                            }
                        }
                    }
                }
            }
            FcgMode::SccCluster => {
                for a in 0..nsccs {
                    for b in 0..nsccs {
                        if a == b {
                            continue;
                        }
                        let crosses = if no_fuse {
                            true
                        } else {
                            (a < pivot.as_usize()) != (b < pivot.as_usize())
                        };
                        if !crosses {
                            continue;
                        }
                        for ku in 0..ddg.sccs[a].max_dim {
                            for kv in 0..ddg.sccs[b].max_dim {
                                self.remove_edge(
                                    ddg.sccs[a].fcg_scc_offset + ku,
                                    ddg.sccs[b].fcg_scc_offset + kv,
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    /// Re-establish the intra-SCC clique for `scc` after a cluster-mode
    /// rebuild dropped it.
    pub fn fcg_add_intra_scc_edges(&mut self, scc_offset: usize, max_dim: usize) {
        clique(self, scc_offset, max_dim);
    }

    /// Documented for lint compliance.
    pub fn mark_rebuild(&mut self) {
        self.to_be_rebuilt = true;
    }
}

fn clique(fcg: &mut Fcg, offset: usize, count: usize) {
    for i in 0..count {
        for j in (i + 1)..count {
            fcg.add_edge(offset + i, offset + j);
        }
    }
}

fn force_scc_dim(
    cst: &mut ConstraintMatrix,
    members: &[StmtId],
    stmts: &[Stmt],
    nvar: usize,
    npar: usize,
    k: usize,
    width: usize,
) {
    for &s in members {
        if k < stmts[s.as_usize()].d_orig {
            let row_idx = cst::reserved_row_for_col(cst::stmt_col_offset(s, nvar, npar) + k, width);
            cst.force_at_least_one(row_idx);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn resolve_pair_edge(
    fcg: &mut Fcg,
    oracle: &dyn LpOracle,
    base: &ConstraintMatrix,
    between: &ConstraintMatrix,
    width: usize,
    nvar: usize,
    npar: usize,
    su: StmtId,
    ku: usize,
    sv: StmtId,
    kv: usize,
    vu: usize,
    vv: usize,
    typed_crosses_parallel: bool,
) {
    let mut cand = base.clone();
    cand.extend_from(between);
    let row_u = cst::reserved_row_for_col(cst::stmt_col_offset(su, nvar, npar) + ku, width);
    let row_v = cst::reserved_row_for_col(cst::stmt_col_offset(sv, nvar, npar) + kv, width);
    cand.force_at_least_one(row_u);
    cand.force_at_least_one(row_v);
    let obj = vec![rational::zero(); width];
    match oracle.feasibility_lexmin(&cand, &obj) {
        None => fcg.add_edge(vu, vv),
        Some(sol) => {
            if typed_crosses_parallel && !is_lp_solution_parallel(&sol, npar) {
                fcg.add_edge(vu, vv);
            }
        }
    }
}

/// `Σ sol[0..=npar] == 0`: the hyperplane has no parameter-multiplier
/// contribution *and* no constant translation term, so it runs in parallel
/// across the whole parameter domain. With `npar = 0` this reduces to
/// testing the lone translation column, `sol[0] == 0`.
pub fn is_lp_solution_parallel(sol: &[Rat], npar: usize) -> bool {
    use num_traits::Zero;
    sol[0..=npar].iter().all(Rat::is_zero)
}

/// For each SCC, test whether the orthogonality + bounding +
/// SCC-permutability system admits a parallel witness. An SCC with no
/// uncoloured dim left has nothing to orthogonalise against and is
/// vacuously parallel. Otherwise, if the system is infeasible, retries once
/// against only the dependences still unsatisfied right now (satisfaction
/// state may have gone stale since an earlier colour round) before treating
/// infeasibility as a structural bug.
pub fn mark_parallel_sccs(
    ddg: &mut Ddg,
    stmts: &[Stmt],
    deps: &[Dep],
    nvar: usize,
    npar: usize,
    oracle: &dyn LpOracle,
) {
    let nstmts = stmts.len();
    let width = cst::cst_width(nstmts, nvar, npar);
    let base = cst::coeff_bounding_constraints(nstmts, nvar, npar, cst::DEFAULT_COEFF_BOUND);

    for scc in ddg.sccs.iter_mut() {
        let members: Vec<(StmtId, usize, usize)> = scc
            .vertices
            .iter()
            .map(|&s| (s, stmts[s.as_usize()].d_orig, stmts[s.as_usize()].fcg_stmt_offset))
            .collect();
        // All dims are "uncoloured" from this probe's point of view: the
        // FCG has not assigned a colour map at construction time, so use an
        // all-zero colour vector sized to the largest offset referenced.
        let colour_len = members.iter().map(|&(_, d, off)| off + d).max().unwrap_or(0);
        let colour = vec![0i32; colour_len];

        let ortho = match cst::scc_ortho_constraints(nstmts, nvar, npar, &members, &colour) {
            None => {
                scc.is_parallel = true;
                scc.sol = None;
                continue;
            }
            Some(ortho) => ortho,
        };

        let obj = vec![rational::zero(); width];
        let intra = cst::constraints_within(width, deps.iter(), &scc.vertices);
        let mut cand = base.clone();
        cand.extend_from(&intra);
        cand.extend_from(&ortho);

        let sol = match oracle.feasibility_lexmin(&cand, &obj) {
            Some(sol) => sol,
            None => {
                let unsatisfied = deps.iter().filter(|d| d.is_unsatisfied());
                let intra_precise = cst::constraints_within(width, unsatisfied, &scc.vertices);
                let mut retry = base.clone();
                retry.extend_from(&intra_precise);
                retry.extend_from(&ortho);
                oracle.feasibility_lexmin(&retry, &obj).unwrap_or_else(|| {
                    panic!(
                        "parallelism probe invariant violated: scc {:?} infeasible after the precise-satisfaction retry",
                        scc.id
                    )
                })
            }
        };
        scc.is_parallel = is_lp_solution_parallel(&sol, npar);
        scc.sol = Some(sol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_witness_requires_zero_params_and_translation() {
        let sol = vec![rational::zero(), rational::zero(), rational::zero()];
        assert!(is_lp_solution_parallel(&sol, 2));
        let nonzero_param = vec![rational::int(1), rational::zero(), rational::zero()];
        assert!(!is_lp_solution_parallel(&nonzero_param, 2));
        let nonzero_translation = vec![rational::zero(), rational::zero(), rational::int(3)];
        assert!(!is_lp_solution_parallel(&nonzero_translation, 2));
    }

    #[test]
    fn zero_parameters_reduces_to_checking_the_translation_column() {
        assert!(is_lp_solution_parallel(&[rational::zero()], 0));
        assert!(!is_lp_solution_parallel(&[rational::int(5)], 0));
    }
}
