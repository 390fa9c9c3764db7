//! Dependence graph (DDG)
//!
//! Vertices are statements; edges are *unsatisfied* dependences. The DDG's
//! job beyond simple adjacency is SCC decomposition (Tarjan, iterative so
//! the recursion-depth note in `SPEC_FULL.md` §9 doesn't apply to this
//! specific pass — only the colouring backtracking is meant to recurse)
//! and the two cut operations that realise a distribution as a concrete
//! scalar hyperplane.

use rustc_hash::FxHashSet;

use crate::rational::{self, Rat};
use crate::stmt::{Dep, HProp, SccId, Stmt, StmtId};

/// One strongly connected component of the DDG.
#[derive(Clone, Debug)]
pub struct Scc {
    /// This SCC's id within the current decomposition.
    pub id: SccId,
    /// Member statements.
    pub vertices: Vec<StmtId>,
    /// Largest `d_orig` among member statements; bounds how many FCG
    /// vertices this SCC can own.
    pub max_dim: usize,
    /// Set by [`crate::fcg::mark_parallel_sccs`].
    pub is_parallel: bool,
    /// Set once every member statement has a dim assigned for the current
    /// colour.
    pub is_scc_coloured: bool,
    /// Offset of this SCC's first FCG vertex (SCC-cluster mode only).
    pub fcg_scc_offset: usize,
    /// Rational witness that proved parallelism, owned by the SCC and
    /// dropped whenever the DDG is rebuilt (`SPEC_FULL.md` §5).
    pub sol: Option<Vec<Rat>>,
}

impl Scc {
    /// Documented for lint compliance.
    pub fn size(&self) -> usize {
        self.vertices.len()
    }
}

/// Statement-level dependence graph.
#[derive(Debug)]
pub struct Ddg {
    nstmts: usize,
    /// Symmetric-in-intent but stored directed: `adj[u][v]` true iff some
    /// unsatisfied dep has `u` as source and `v` as destination (or `u==v`
    /// for a self dependence).
    adj: Vec<bool>,
    /// Current SCC decomposition.
    pub sccs: Vec<Scc>,
    /// `stmt_to_scc[s]` = index into `sccs` for statement `s`.
    stmt_to_scc: Vec<usize>,
}

impl Ddg {
    fn idx(&self, u: usize, v: usize) -> usize {
        u * self.nstmts + v
    }

    /// Build a fresh DDG from the current (unsatisfied) dependence set and
    /// immediately decompose it into SCCs.
    pub fn build(nstmts: usize, deps: &[Dep], stmts: &[Stmt]) -> Self {
        let mut ddg =
            Self { nstmts, adj: vec![false; nstmts * nstmts], sccs: Vec::new(), stmt_to_scc: vec![0; nstmts] };
        ddg.update(deps);
        ddg.recompute_sccs(stmts);
        ddg
    }

    /// Rebuild edges from the currently unsatisfied dependences. Does not
    /// touch the SCC decomposition — call `recompute_sccs` afterwards.
    pub fn update(&mut self, deps: &[Dep]) {
        self.adj.iter_mut().for_each(|b| *b = false);
        for dep in deps {
            if dep.is_unsatisfied() {
                let i = self.idx(dep.src.as_usize(), dep.dst.as_usize());
                self.adj[i] = true;
            }
        }
    }

    #[inline]
    /// Documented for lint compliance.
    pub fn is_adjacent(&self, u: StmtId, v: StmtId) -> bool {
        self.adj[self.idx(u.as_usize(), v.as_usize())] || self.adj[self.idx(v.as_usize(), u.as_usize())]
    }

    /// True iff some unsatisfied dependence crosses directly between SCC
    /// `a` and SCC `b` (either direction). `a == b` is always `false` here
    /// (self-SCC connectivity is handled by the intra-SCC edge machinery,
    /// not this query).
    pub fn sccs_direct_connected(&self, a: SccId, b: SccId) -> bool {
        if a == b {
            return false;
        }
        let sa = &self.sccs[a.as_usize()];
        let sb = &self.sccs[b.as_usize()];
        sa.vertices.iter().any(|&u| sb.vertices.iter().any(|&v| self.is_adjacent(u, v)))
    }

    /// Tarjan's algorithm (iterative), then materialise SCC membership
    /// lists and `max_dim` using `stmts`. SCC ids are assigned in
    /// reverse-topological discovery order, same as the classic algorithm;
    /// downstream code relies only on "ids are stable within one
    /// decomposition", not on any particular topological meaning.
    pub fn recompute_sccs(&mut self, stmts: &[Stmt]) {
        let n = self.nstmts;
        if n == 0 {
            self.sccs.clear();
            return;
        }
        let adj = &self.adj;
        let comps = tarjan(n, |u| {
            (0..n).filter(move |&v| adj[u * n + v]).collect::<Vec<_>>()
        });
        self.compute_scc_vertices(comps, stmts);
    }

    /// Materialise SCC membership lists from a raw partition (one Vec of
    /// statement indices per component, in id order) plus per-statement
    /// metadata. Kept as a separate step (mirroring `compute_scc_vertices`
    /// in `SPEC_FULL.md` §4.3) so a caller that already knows the
    /// partition — e.g. the skew pass cloning a DDG — can skip re-running
    /// Tarjan.
    pub fn compute_scc_vertices(&mut self, comps: Vec<Vec<usize>>, stmts: &[Stmt]) {
        self.sccs.clear();
        self.stmt_to_scc = vec![0; self.nstmts];
        for (id, members) in comps.into_iter().enumerate() {
            let vertices: Vec<StmtId> = members.iter().map(|&s| StmtId(s)).collect();
            let max_dim = if stmts.is_empty() {
                0
            } else {
                vertices.iter().map(|v| stmts[v.as_usize()].d_orig).max().unwrap_or(0)
            };
            for &s in &members {
                self.stmt_to_scc[s] = id;
            }
            self.sccs.push(Scc {
                id: SccId(id),
                vertices,
                max_dim,
                is_parallel: false,
                is_scc_coloured: false,
                fcg_scc_offset: 0,
                sol: None,
            });
        }
        self.assign_fcg_scc_offsets();
    }

    fn assign_fcg_scc_offsets(&mut self) {
        let mut off = 0;
        for scc in &mut self.sccs {
            scc.fcg_scc_offset = off;
            off += scc.max_dim;
        }
    }

    /// Documented for lint compliance.
    pub fn scc_of(&self, s: StmtId) -> SccId {
        SccId(self.stmt_to_scc[s.as_usize()])
    }

    /// Documented for lint compliance.
    pub fn nsccs(&self) -> usize {
        self.sccs.len()
    }

    /// Append a scalar (`HProp::HScalar`) hyperplane separating SCCs with
    /// id `< pivot` from SCCs with id `>= pivot`, then mark every
    /// dependence that crosses that boundary (in the forward direction) as
    /// satisfied at the new level. Returns the new level index.
    pub fn cut_between_sccs(
        &self,
        pivot: SccId,
        stmts: &mut [Stmt],
        deps: &mut [Dep],
        nvar: usize,
        npar: usize,
        h_props: &mut Vec<HProp>,
    ) -> usize {
        let level = h_props.len();
        for s in stmts.iter_mut() {
            let mut row = vec![rational::zero(); nvar + npar + 1];
            let scc = self.scc_of(s.id);
            let shift = if scc.as_usize() >= pivot.as_usize() { 1 } else { 0 };
            *row.last_mut().unwrap() = rational::int(shift);
            s.push_row(row);
        }
        h_props.push(HProp::HScalar);
        for dep in deps.iter_mut() {
            if dep.is_unsatisfied() {
                let src_scc = self.scc_of(dep.src).as_usize();
                let dst_scc = self.scc_of(dep.dst).as_usize();
                if src_scc < dst_scc {
                    dep.mark_satisfied(level);
                }
            }
        }
        level
    }

    /// Cut every SCC apart from every other (innermost distribution): the
    /// scalar hyperplane assigns each statement's own SCC id as the
    /// constant shift, so any two statements in different SCCs are
    /// separated at this level.
    pub fn cut_all_sccs(
        &self,
        stmts: &mut [Stmt],
        deps: &mut [Dep],
        nvar: usize,
        npar: usize,
        h_props: &mut Vec<HProp>,
    ) -> usize {
        let level = h_props.len();
        for s in stmts.iter_mut() {
            let mut row = vec![rational::zero(); nvar + npar + 1];
            let scc = self.scc_of(s.id);
            *row.last_mut().unwrap() = rational::int(scc.as_usize() as i64);
            s.push_row(row);
        }
        h_props.push(HProp::HScalar);
        for dep in deps.iter_mut() {
            if dep.is_unsatisfied() {
                let src_scc = self.scc_of(dep.src).as_usize();
                let dst_scc = self.scc_of(dep.dst).as_usize();
                if src_scc != dst_scc {
                    dep.mark_satisfied(level);
                }
            }
        }
        level
    }
}

/// Iterative Tarjan SCC over `0..n`, with `successors(u)` returning `u`'s
/// out-neighbours. Returns components in discovery-root order, each as a
/// `Vec<usize>` of member statement indices.
fn tarjan(n: usize, successors: impl Fn(usize) -> Vec<usize>) -> Vec<Vec<usize>> {
    let succs: Vec<Vec<usize>> = (0..n).map(successors).collect();

    let mut index = vec![usize::MAX; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut comps: Vec<Vec<usize>> = Vec::new();

    // Explicit DFS call stack: (vertex, index into its successor list to
    // try next). When we push a new call frame for `w`, `v`'s frame stays
    // put underneath it with its cursor already advanced, so popping back
    // to `v` resumes exactly where it left off.
    let mut call_stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..n {
        if index[root] != usize::MAX {
            continue;
        }
        call_stack.push((root, 0));
        index[root] = next_index;
        lowlink[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;

        while let Some(&(v, mut i)) = call_stack.last() {
            let mut descended = false;
            while i < succs[v].len() {
                let w = succs[v][i];
                i += 1;
                if index[w] == usize::MAX {
                    index[w] = next_index;
                    lowlink[w] = next_index;
                    next_index += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    call_stack.last_mut().unwrap().1 = i;
                    call_stack.push((w, 0));
                    descended = true;
                    break;
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
            }
            if descended {
                continue;
            }
            call_stack.last_mut().unwrap().1 = i;
            call_stack.pop();
            if lowlink[v] == index[v] {
                let mut comp = Vec::new();
                loop {
                    let w = stack.pop().unwrap();
                    on_stack[w] = false;
                    comp.push(w);
                    if w == v {
                        break;
                    }
                }
                comps.push(comp);
            }
            if let Some(&(parent, _)) = call_stack.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[v]);
            }
        }
    }
    comps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stmt::{Dep, DepKind};

    fn mk_stmt(id: usize, d_orig: usize) -> Stmt {
        Stmt::new(StmtId(id), d_orig)
    }

    fn self_dep(s: usize) -> Dep {
        Dep::new(
            StmtId(s),
            StmtId(s),
            DepKind::Raw,
            crate::cst::uniform_dep_constraints(1, 1, 0, StmtId(s), StmtId(s), &[1]),
        )
    }

    #[test]
    fn two_independent_statements_form_two_sccs() {
        let stmts = vec![mk_stmt(0, 1), mk_stmt(1, 1)];
        let deps: Vec<Dep> = Vec::new();
        let ddg = Ddg::build(2, &deps, &stmts);
        assert_eq!(ddg.nsccs(), 2);
        assert_ne!(ddg.scc_of(StmtId(0)), ddg.scc_of(StmtId(1)));
    }

    #[test]
    fn cyclic_pair_collapses_to_one_scc() {
        let stmts = vec![mk_stmt(0, 1), mk_stmt(1, 1)];
        let d01 =
            Dep::new(StmtId(0), StmtId(1), DepKind::Raw, crate::cst::uniform_dep_constraints(2, 1, 0, StmtId(0), StmtId(1), &[0]));
        let d10 =
            Dep::new(StmtId(1), StmtId(0), DepKind::Raw, crate::cst::uniform_dep_constraints(2, 1, 0, StmtId(1), StmtId(0), &[0]));
        let deps = vec![d01, d10];
        let ddg = Ddg::build(2, &deps, &stmts);
        assert_eq!(ddg.nsccs(), 1);
    }

    #[test]
    fn self_dep_does_not_merge_with_others() {
        let stmts = vec![mk_stmt(0, 2)];
        let deps = vec![self_dep(0)];
        let ddg = Ddg::build(1, &deps, &stmts);
        assert_eq!(ddg.nsccs(), 1);
        assert_eq!(ddg.sccs[0].size(), 1);
    }

    #[test]
    fn cut_all_sccs_satisfies_cross_scc_deps() {
        let mut stmts = vec![mk_stmt(0, 1), mk_stmt(1, 1)];
        let d01 =
            Dep::new(StmtId(0), StmtId(1), DepKind::Raw, crate::cst::uniform_dep_constraints(2, 1, 0, StmtId(0), StmtId(1), &[1]));
        let mut deps = vec![d01];
        let ddg = Ddg::build(2, &deps, &stmts);
        assert_eq!(ddg.nsccs(), 2);
        let mut h_props = Vec::new();
        ddg.cut_all_sccs(&mut stmts, &mut deps, 1, 0, &mut h_props);
        assert!(deps[0].is_unsatisfied() == false);
        assert_eq!(h_props.len(), 1);
        assert_eq!(stmts[0].nrows(), 1);
    }
}

/// Fast statement-id set, shared by the colouring driver's discard lists.
pub type FastIdSet = FxHashSet<usize>;
