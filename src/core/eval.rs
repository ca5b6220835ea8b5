//! Tree-walking evaluation of compiled logic against runtime state.
//!
//! Quality and visit reads never fail: anything unset reads as zero.
//! Function calls are resolved by name through the `EngineContext` at the
//! moment they run.

use rustc_hash::FxHashMap;
use std::fmt;
use thiserror::Error;

use crate::schema::content::{CompiledContent, DependencyKind, DependencyLogic, StateDependency};
use crate::schema::logic::{AssignOp, BinaryOp, Command, CompiledLogicUnit, Expr, Program, RootKind};
use crate::schema::value::{Qualities, State, Value};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("unknown display formatter '{0}'")]
    UnknownFormatter(String),
    #[error("raw script is not supported here: {0}")]
    RawScriptUnsupported(String),
    #[error("function '{name}' failed: {message}")]
    Function { name: String, message: String },
    #[error("{found} logic cannot be used as {expected}")]
    WrongRoot { expected: RootKind, found: RootKind },
}

/// What the narrative engine makes available to logic while it runs.
pub trait EngineContext {
    fn call(&self, name: &str, args: &[Value]) -> Result<Value, EvalError>;

    /// Apply the named display formatter to an insert's value.
    fn format(&self, formatter: &str, _value: &Value) -> Result<Value, EvalError> {
        Err(EvalError::UnknownFormatter(formatter.to_string()))
    }

    /// Run an opaque raw-script dependency.
    fn run_raw_script(
        &self,
        _kind: DependencyKind,
        source: &str,
        _state: &State,
        _qualities: &Qualities,
    ) -> Result<Value, EvalError> {
        Err(EvalError::RawScriptUnsupported(source.to_string()))
    }
}

type Function = Box<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;
type Formatter = Box<dyn Fn(&Value) -> String + Send + Sync>;

/// A name-keyed table of functions and display formatters.
#[derive(Default)]
pub struct FunctionTable {
    functions: FxHashMap<String, Function>,
    formatters: FxHashMap<String, Formatter>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Numeric helpers most stories want: `min`, `max`, `abs`, `floor`,
    /// `ceil`, `round`.
    pub fn standard() -> Self {
        Self::new()
            .with_function("min", |args| fold_numbers("min", args, f64::min))
            .with_function("max", |args| fold_numbers("max", args, f64::max))
            .with_function("abs", |args| unary(args, f64::abs))
            .with_function("floor", |args| unary(args, f64::floor))
            .with_function("ceil", |args| unary(args, f64::ceil))
            .with_function("round", |args| unary(args, f64::round))
    }

    pub fn with_function(
        mut self,
        name: &str,
        function: impl Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        self.functions.insert(name.to_string(), Box::new(function));
        self
    }

    pub fn with_formatter(
        mut self,
        name: &str,
        formatter: impl Fn(&Value) -> String + Send + Sync + 'static,
    ) -> Self {
        self.formatters.insert(name.to_string(), Box::new(formatter));
        self
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<_> = self.functions.keys().collect();
        functions.sort();
        let mut formatters: Vec<_> = self.formatters.keys().collect();
        formatters.sort();
        f.debug_struct("FunctionTable")
            .field("functions", &functions)
            .field("formatters", &formatters)
            .finish()
    }
}

impl EngineContext for FunctionTable {
    fn call(&self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;
        function(args).map_err(|message| EvalError::Function {
            name: name.to_string(),
            message,
        })
    }

    fn format(&self, formatter: &str, value: &Value) -> Result<Value, EvalError> {
        let format = self
            .formatters
            .get(formatter)
            .ok_or_else(|| EvalError::UnknownFormatter(formatter.to_string()))?;
        Ok(Value::Text(format(value)))
    }
}

fn fold_numbers(name: &str, args: &[Value], f: fn(f64, f64) -> f64) -> Result<Value, String> {
    let mut numbers = args.iter().map(Value::as_number);
    let first = numbers.next().ok_or_else(|| format!("{} needs at least one argument", name))?;
    Ok(Value::Number(numbers.fold(first, f)))
}

fn unary(args: &[Value], f: fn(f64) -> f64) -> Result<Value, String> {
    match args {
        [arg] => Ok(Value::Number(f(arg.as_number()))),
        _ => Err(format!("expected 1 argument, got {}", args.len())),
    }
}

/// Result of running a compiled unit under its own root.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicOutcome {
    Test(bool),
    Value(Value),
    /// Number of commands applied.
    Applied(usize),
}

impl Expr {
    pub fn evaluate(
        &self,
        ctx: &dyn EngineContext,
        state: &State,
        qualities: &Qualities,
    ) -> Result<Value, EvalError> {
        Ok(match self {
            Self::Number(n) => Value::Number(*n),
            Self::Bool(b) => Value::Bool(*b),
            Self::Quality(name) => qualities.get(name).cloned().unwrap_or_default(),
            Self::Visits(scene) => Value::Number(f64::from(state.visits(scene))),
            Self::Not(inner) => Value::Bool(!inner.evaluate(ctx, state, qualities)?.is_truthy()),
            Self::Negate(inner) => {
                Value::Number(-inner.evaluate(ctx, state, qualities)?.as_number())
            }
            Self::Binary { op: BinaryOp::And, lhs, rhs } => Value::Bool(
                lhs.evaluate(ctx, state, qualities)?.is_truthy()
                    && rhs.evaluate(ctx, state, qualities)?.is_truthy(),
            ),
            Self::Binary { op: BinaryOp::Or, lhs, rhs } => Value::Bool(
                lhs.evaluate(ctx, state, qualities)?.is_truthy()
                    || rhs.evaluate(ctx, state, qualities)?.is_truthy(),
            ),
            Self::Binary { op, lhs, rhs } => {
                let lhs = lhs.evaluate(ctx, state, qualities)?;
                let rhs = rhs.evaluate(ctx, state, qualities)?;
                apply_binary(*op, &lhs, &rhs)
            }
            Self::Call { name, args } => {
                let args = args
                    .iter()
                    .map(|arg| arg.evaluate(ctx, state, qualities))
                    .collect::<Result<Vec<_>, _>>()?;
                ctx.call(name, &args)?
            }
        })
    }
}

fn apply_binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Value {
    let (a, b) = (lhs.as_number(), rhs.as_number());
    match op {
        BinaryOp::Add => Value::Number(a + b),
        BinaryOp::Sub => Value::Number(a - b),
        BinaryOp::Mul => Value::Number(a * b),
        BinaryOp::Div => Value::Number(a / b),
        BinaryOp::Mod => Value::Number(a % b),
        BinaryOp::Eq => Value::Bool(values_equal(lhs, rhs)),
        BinaryOp::NotEq => Value::Bool(!values_equal(lhs, rhs)),
        BinaryOp::Lt => Value::Bool(a < b),
        BinaryOp::Le => Value::Bool(a <= b),
        BinaryOp::Gt => Value::Bool(a > b),
        BinaryOp::Ge => Value::Bool(a >= b),
        BinaryOp::And => Value::Bool(lhs.is_truthy() && rhs.is_truthy()),
        BinaryOp::Or => Value::Bool(lhs.is_truthy() || rhs.is_truthy()),
    }
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Text(a), Value::Text(b)) => a == b,
        _ => lhs.as_number() == rhs.as_number(),
    }
}

impl Command {
    pub fn apply(
        &self,
        ctx: &dyn EngineContext,
        state: &State,
        qualities: &mut Qualities,
    ) -> Result<(), EvalError> {
        let value = self.value.evaluate(ctx, state, qualities)?;
        let next = match self.op {
            AssignOp::Set => value,
            op => {
                let current = qualities.get(&self.quality).map(Value::as_number).unwrap_or(0.0);
                let rhs = value.as_number();
                Value::Number(match op {
                    AssignOp::Add => current + rhs,
                    AssignOp::Sub => current - rhs,
                    AssignOp::Mul => current * rhs,
                    AssignOp::Div => current / rhs,
                    AssignOp::Set => rhs,
                })
            }
        };
        qualities.insert(self.quality.clone(), next);
        Ok(())
    }
}

impl Program {
    pub fn evaluate(
        &self,
        ctx: &dyn EngineContext,
        state: &State,
        qualities: &mut Qualities,
    ) -> Result<LogicOutcome, EvalError> {
        match self {
            Self::Predicate(expr) => {
                let value = expr.evaluate(ctx, state, qualities)?;
                Ok(LogicOutcome::Test(value.is_truthy()))
            }
            Self::Expression(expr) => {
                Ok(LogicOutcome::Value(expr.evaluate(ctx, state, qualities)?))
            }
            Self::Actions(commands) => {
                for command in commands {
                    command.apply(ctx, state, qualities)?;
                }
                Ok(LogicOutcome::Applied(commands.len()))
            }
        }
    }
}

impl CompiledLogicUnit {
    /// Run the unit under its own root.
    pub fn evaluate(
        &self,
        ctx: &dyn EngineContext,
        state: &State,
        qualities: &mut Qualities,
    ) -> Result<LogicOutcome, EvalError> {
        self.program.evaluate(ctx, state, qualities)
    }

    /// Evaluate as a gate. Expressions count as true when nonzero.
    pub fn test(
        &self,
        ctx: &dyn EngineContext,
        state: &State,
        qualities: &Qualities,
    ) -> Result<bool, EvalError> {
        match &self.program {
            Program::Predicate(expr) | Program::Expression(expr) => {
                Ok(expr.evaluate(ctx, state, qualities)?.is_truthy())
            }
            Program::Actions(_) => Err(EvalError::WrongRoot {
                expected: RootKind::Predicate,
                found: RootKind::Actions,
            }),
        }
    }

    pub fn value(
        &self,
        ctx: &dyn EngineContext,
        state: &State,
        qualities: &Qualities,
    ) -> Result<Value, EvalError> {
        match &self.program {
            Program::Predicate(expr) => {
                Ok(Value::Bool(expr.evaluate(ctx, state, qualities)?.is_truthy()))
            }
            Program::Expression(expr) => expr.evaluate(ctx, state, qualities),
            Program::Actions(_) => Err(EvalError::WrongRoot {
                expected: RootKind::Expression,
                found: RootKind::Actions,
            }),
        }
    }

    pub fn apply(
        &self,
        ctx: &dyn EngineContext,
        state: &State,
        qualities: &mut Qualities,
    ) -> Result<(), EvalError> {
        match &self.program {
            Program::Actions(commands) => {
                for command in commands {
                    command.apply(ctx, state, qualities)?;
                }
                Ok(())
            }
            other => Err(EvalError::WrongRoot {
                expected: RootKind::Actions,
                found: other.root(),
            }),
        }
    }
}

impl StateDependency {
    /// Resolve against one runtime state; predicates yield booleans.
    pub fn resolve(
        &self,
        ctx: &dyn EngineContext,
        state: &State,
        qualities: &Qualities,
    ) -> Result<Value, EvalError> {
        let value = match &self.logic {
            DependencyLogic::Structured(unit) => match self.kind {
                DependencyKind::Predicate => Value::Bool(unit.test(ctx, state, qualities)?),
                DependencyKind::Insert => unit.value(ctx, state, qualities)?,
            },
            DependencyLogic::RawScript(source) => {
                let value = ctx.run_raw_script(self.kind, source, state, qualities)?;
                match self.kind {
                    DependencyKind::Predicate => Value::Bool(value.is_truthy()),
                    DependencyKind::Insert => value,
                }
            }
        };
        match &self.formatter {
            Some(name) => ctx.format(name, &value),
            None => Ok(value),
        }
    }
}

impl CompiledContent {
    /// Resolve every dependency; the result is indexed like `dependencies`.
    pub fn resolve(
        &self,
        ctx: &dyn EngineContext,
        state: &State,
        qualities: &Qualities,
    ) -> Result<Vec<Value>, EvalError> {
        self.dependencies
            .iter()
            .map(|dependency| dependency.resolve(ctx, state, qualities))
            .collect()
    }
}
