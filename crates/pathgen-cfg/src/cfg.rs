use indexmap::IndexMap;
use pathgen_ast::Expr;

/// A unique identifier for a basic block within one function's graph.
pub type BlockId = usize;

/// A non-branching instruction inside a basic block.
///
/// All AST assignment forms (declarations with initializers, plain and
/// compound assignments, increments) lower to `Assign`; randomized
/// inputs lower to `Havoc`. Markers do not appear as instructions: the
/// builder splits blocks at each marker and records the block ids.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Assign { name: String, value: Expr },
    Havoc { name: String },
}

/// Outgoing edges of a basic block.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    /// Single unconditional successor.
    Jump(BlockId),
    /// Two successors gated by a boolean predicate.
    Branch {
        cond: Expr,
        then_blk: BlockId,
        else_blk: BlockId,
    },
    /// Call boundary: control transfers to `callee`'s graph and resumes
    /// at `return_to`, with the returned value (if any) bound to `dest`.
    Call {
        callee: String,
        args: Vec<Expr>,
        dest: Option<String>,
        return_to: BlockId,
    },
    /// Return to the caller frame.
    Return(Option<Expr>),
    /// Function exit with no successors.
    Exit,
}

/// A basic block: straight-line instructions plus one terminator.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub instrs: Vec<Instr>,
    pub terminator: Terminator,
}

/// The control-flow graph of one function.
///
/// Built once, then shared read-only across all path enumerations.
#[derive(Debug, Clone, PartialEq)]
pub struct Cfg {
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
    /// Block whose head is the `path_start` marker (entry function only).
    pub start_block: Option<BlockId>,
    /// Block whose head is the `path_goal` marker (entry function only).
    pub goal_block: Option<BlockId>,
}

impl Cfg {
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id]
    }

    /// Static successor blocks of `id`, in edge order. A call edge
    /// contributes its continuation block.
    pub fn successors(&self, id: BlockId) -> Vec<BlockId> {
        match &self.blocks[id].terminator {
            Terminator::Jump(next) => vec![*next],
            Terminator::Branch {
                then_blk, else_blk, ..
            } => vec![*then_blk, *else_blk],
            Terminator::Call { return_to, .. } => vec![*return_to],
            Terminator::Return(_) | Terminator::Exit => vec![],
        }
    }
}

/// The graphs of every function in a program, plus the designated
/// analysis entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CfgSet {
    pub cfgs: IndexMap<String, Cfg>,
    pub entry: String,
}

impl CfgSet {
    pub fn entry_cfg(&self) -> &Cfg {
        &self.cfgs[&self.entry]
    }

    pub fn get(&self, name: &str) -> Option<&Cfg> {
        self.cfgs.get(name)
    }
}
