use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Which grammar root a piece of logic source is compiled under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RootKind {
    /// A boolean gate: `hp > 0 and not @cellar`.
    Predicate,
    /// A value for interpolation: `gold * 2`.
    Expression,
    /// Semicolon-separated state changes: `gold += 5; seen = 1`.
    Actions,
}

impl RootKind {
    /// The grammar non-terminal this root parses from.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Predicate => "predicate",
            Self::Expression => "expression",
            Self::Actions => "actions",
        }
    }
}

impl fmt::Display for RootKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Expression tree built by the logic grammar's semantic actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Number(f64),
    Bool(bool),
    /// Null-safe quality read; unset qualities are 0.
    Quality(String),
    /// Null-safe visit count of a scene; unvisited scenes are 0.
    Visits(String),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    Negate(Box<Expr>),
    /// Resolved by name against the engine's function table at evaluation time.
    Call { name: String, args: Vec<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

/// One `name OP= expr` step of an action list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub quality: String,
    pub op: AssignOp,
    pub value: Expr,
}

/// The executable form of a compiled logic unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Program {
    Predicate(Expr),
    Expression(Expr),
    Actions(Vec<Command>),
}

impl Program {
    pub fn root(&self) -> RootKind {
        match self {
            Self::Predicate(_) => RootKind::Predicate,
            Self::Expression(_) => RootKind::Expression,
            Self::Actions(_) => RootKind::Actions,
        }
    }

    /// Quality names read or written by this program, sorted.
    pub fn qualities(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        match self {
            Self::Predicate(expr) | Self::Expression(expr) => expr.collect_names(&mut names, false),
            Self::Actions(commands) => {
                for command in commands {
                    names.insert(command.quality.clone());
                    command.value.collect_names(&mut names, false);
                }
            }
        }
        names
    }

    /// Scene ids referenced through `@scene` visit counts, sorted.
    pub fn scenes(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        match self {
            Self::Predicate(expr) | Self::Expression(expr) => expr.collect_names(&mut names, true),
            Self::Actions(commands) => {
                for command in commands {
                    command.value.collect_names(&mut names, true);
                }
            }
        }
        names
    }
}

impl Expr {
    fn collect_names(&self, names: &mut BTreeSet<String>, scenes: bool) {
        match self {
            Self::Number(_) | Self::Bool(_) => {}
            Self::Quality(name) if !scenes => {
                names.insert(name.clone());
            }
            Self::Visits(scene) if scenes => {
                names.insert(scene.clone());
            }
            Self::Quality(_) | Self::Visits(_) => {}
            Self::Binary { lhs, rhs, .. } => {
                lhs.collect_names(names, scenes);
                rhs.collect_names(names, scenes);
            }
            Self::Not(inner) | Self::Negate(inner) => inner.collect_names(names, scenes),
            Self::Call { args, .. } => {
                for arg in args {
                    arg.collect_names(names, scenes);
                }
            }
        }
    }
}

/// Compiled logic together with the source text it was compiled from.
///
/// `source` always suffices to regenerate `program`; a linking pass may
/// rewrite it and recompile in place (see `LogicCompiler::recompile`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledLogicUnit {
    pub source: String,
    pub root: RootKind,
    pub program: Program,
}
