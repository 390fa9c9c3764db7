//! Statements and dependences
//!
//! The dense integer ids used everywhere else in the crate (`StmtId`,
//! `SccId`) are newtypes over `usize`, following the same pattern the rest
//! of the workspace uses for block/row/register indices: a thin wrapper
//! catches index-space mixups at compile time without costing anything at
//! runtime.

use crate::cst::ConstraintMatrix;
use crate::rational::Rat;

/// Identifies one statement by its position in `Prog::stmts`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StmtId(pub usize);
impl StmtId {
    /// Access the underlying index.
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// Identifies one strongly connected component by its position in
/// `Ddg::sccs`. SCC ids are reassigned on every `recompute_sccs`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SccId(pub usize);
impl SccId {
    /// Access the underlying index.
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// Kind of data dependence.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DepKind {
    /// Read-after-write (flow dependence).
    Raw,
    /// Write-after-read (anti dependence).
    War,
    /// Write-after-write (output dependence).
    Waw,
    /// Read-after-read. Only tracked when `ScheduleOptions::rar` is set.
    Rar,
}

/// Direction of a dependence's iteration displacement at one schedule
/// level, once the hyperplane at that level has been fixed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    /// `dst - src` is forced strictly positive at this level.
    Plus,
    /// `dst - src` is forced strictly negative — indicates an invariant
    /// violation if observed after the level claims to satisfy the dep.
    Minus,
    /// `dst - src` is forced exactly zero: the dependence is not yet
    /// satisfied by this level alone.
    Zero,
    /// Different instances of the dependence realize different signs at
    /// this level (can occur for dependences carried by outer cuts).
    Star,
}

/// Whether a dependence still constrains the search, or has been
/// discharged by some already-chosen hyperplane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Satisfaction {
    /// Still constrains the search.
    Unsatisfied,
    /// Carried (strictly satisfied) by the hyperplane at this level.
    SatisfiedAt(usize),
}

impl Satisfaction {
    #[inline]
    /// Documented for lint compliance.
    pub fn is_unsatisfied(self) -> bool {
        matches!(self, Satisfaction::Unsatisfied)
    }

    #[inline]
    /// Documented for lint compliance.
    pub fn level(self) -> Option<usize> {
        match self {
            Satisfaction::SatisfiedAt(l) => Some(l),
            Satisfaction::Unsatisfied => None,
        }
    }
}

/// One data dependence between two statement instances.
///
/// `cst` is the dependence's constraint polyhedron already expressed over
/// the shared statement-coefficient space (the Farkas-dualized form): its
/// columns follow the crate-wide [width invariant](crate::cst::cst_width).
/// Constructing this polyhedron from the original iteration domains is the
/// dependence-analysis front end's job and is out of scope for this crate
/// (see `SPEC_FULL.md` §1); the core only ever reads and extends it.
#[derive(Clone, Debug)]
pub struct Dep {
    /// Source statement of the dependence.
    pub src: StmtId,
    /// Destination statement of the dependence.
    pub dst: StmtId,
    /// What kind of data hazard this dependence protects.
    pub kind: DepKind,
    /// Whether (and at which level) this dependence has been carried.
    pub satisfaction: Satisfaction,
    /// The dependence's Farkas-dualized legality polyhedron.
    pub cst: ConstraintMatrix,
    /// Direction per level, filled lazily by the skewing pass
    /// (`crate::skew::dependence_direction`). `None` until first queried.
    dirvec: Vec<Option<Direction>>,
    /// Cached intra-statement/self-dependence permutability constraints
    /// built once per FCG build and invalidated at the end of it (per the
    /// resource-discipline note in SPEC_FULL.md §5). Unused for
    /// inter-statement deps.
    intra_cache: Option<ConstraintMatrix>,
}

impl Dep {
    /// Documented for lint compliance.
    pub fn new(src: StmtId, dst: StmtId, kind: DepKind, cst: ConstraintMatrix) -> Self {
        Self {
            src,
            dst,
            kind,
            satisfaction: Satisfaction::Unsatisfied,
            cst,
            dirvec: Vec::new(),
            intra_cache: None,
        }
    }

    #[inline]
    /// Documented for lint compliance.
    pub fn is_self_dep(&self) -> bool {
        self.src == self.dst
    }

    #[inline]
    /// Documented for lint compliance.
    pub fn is_unsatisfied(&self) -> bool {
        self.satisfaction.is_unsatisfied()
    }

    /// Documented for lint compliance.
    pub fn mark_satisfied(&mut self, level: usize) {
        debug_assert!(
            self.satisfaction.is_unsatisfied(),
            "monotone satisfaction violated: dep already satisfied at {:?}",
            self.satisfaction
        );
        self.satisfaction = Satisfaction::SatisfiedAt(level);
    }

    /// Documented for lint compliance.
    pub fn cached_direction(&self, level: usize) -> Option<Direction> {
        self.dirvec.get(level).copied().flatten()
    }

    /// Documented for lint compliance.
    pub fn cache_direction(&mut self, level: usize, dir: Direction) {
        if self.dirvec.len() <= level {
            self.dirvec.resize(level + 1, None);
        }
        self.dirvec[level] = Some(dir);
    }

    /// Documented for lint compliance.
    pub fn intra_cache(&self) -> Option<&ConstraintMatrix> {
        self.intra_cache.as_ref()
    }

    /// Documented for lint compliance.
    pub fn set_intra_cache(&mut self, cst: ConstraintMatrix) {
        self.intra_cache = Some(cst);
    }

    /// Free the cached intra-statement dependence polyhedron. Called at the
    /// end of `Fcg::build` (see SPEC_FULL.md §4.4 step 7) because the next
    /// coloured hyperplane invalidates it.
    pub fn free_intra_cache(&mut self) {
        self.intra_cache = None;
    }
}

/// Tag recorded per schedule row (hyperplane), mirroring the `hProps`
/// array on `Prog`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HProp {
    /// A genuine loop dimension (at least one statement's row is nonzero on
    /// a loop coefficient).
    HLoop,
    /// A scalar dimension produced by a distribution cut: every statement's
    /// row is zero except for the per-statement constant shift.
    HScalar,
    /// Not yet classified.
    Unknown,
}

/// One program statement.
#[derive(Clone, Debug)]
pub struct Stmt {
    /// Documented for lint compliance.
    pub id: StmtId,
    /// Original loop nest depth, `d_orig <= nvar`.
    pub d_orig: usize,
    /// `is_orig_loop[k]` is true iff dim `k < d_orig` corresponds to a real
    /// source loop (as opposed to a dimension already consumed by a prior
    /// transformation outside this crate's scope).
    pub is_orig_loop: Vec<bool>,
    /// Schedule rows found so far; each row has `nvar + npar + 1` entries.
    pub trans: Vec<Vec<Rat>>,
    /// Which SCC this statement currently belongs to.
    pub scc_id: SccId,
    /// Offset of this statement's first FCG vertex (statement-dim mode).
    pub fcg_stmt_offset: usize,
    intra_stmt_dep_cst: Option<ConstraintMatrix>,
}

impl Stmt {
    /// Documented for lint compliance.
    pub fn new(id: StmtId, d_orig: usize) -> Self {
        Self {
            id,
            d_orig,
            is_orig_loop: vec![true; d_orig],
            trans: Vec::new(),
            scc_id: SccId(0),
            fcg_stmt_offset: 0,
            intra_stmt_dep_cst: None,
        }
    }

    #[inline]
    /// Documented for lint compliance.
    pub fn nrows(&self) -> usize {
        self.trans.len()
    }

    /// Documented for lint compliance.
    pub fn push_row(&mut self, row: Vec<Rat>) {
        self.trans.push(row);
    }

    /// Documented for lint compliance.
    pub fn intra_stmt_dep_cst(&self) -> Option<&ConstraintMatrix> {
        self.intra_stmt_dep_cst.as_ref()
    }

    /// Documented for lint compliance.
    pub fn set_intra_stmt_dep_cst(&mut self, cst: ConstraintMatrix) {
        self.intra_stmt_dep_cst = Some(cst);
    }

    /// Documented for lint compliance.
    pub fn free_intra_stmt_dep_cst(&mut self) {
        self.intra_stmt_dep_cst = None;
    }
}
