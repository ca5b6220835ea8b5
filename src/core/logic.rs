//! The logic language: predicates, expressions and action lists.
//!
//! Source is tokenized with the logic token table, parsed by the Earley
//! engine under one of three roots, and the grammar's semantic actions build
//! the `Program` tree directly.

use thiserror::Error;
use tracing::debug;

use super::compiler::CompilerError;
use super::earley::{Child, Grammar, ParseError, Production, Symbol};
use super::tokenizer::{Token, TokenRule, Tokenizer, TokenizeError, DEFAULT_MAX_ITERATIONS};
use crate::schema::logic::{
    AssignOp, BinaryOp, Command, CompiledLogicUnit, Expr, Program, RootKind,
};

/// Longest token stream a single logic unit may have.
pub const DEFAULT_MAX_TOKENS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicToken {
    And,
    Or,
    Not,
    True,
    False,
    /// `=`: equality in predicates, assignment in actions.
    Equals,
    NotEquals,
    Less,
    LessEquals,
    Greater,
    GreaterEquals,
    PlusEquals,
    MinusEquals,
    TimesEquals,
    DivideEquals,
    Plus,
    Minus,
    Times,
    Divide,
    Modulo,
    Number,
    Identifier,
    /// `@scene.id`
    Visit,
    OpenParen,
    CloseParen,
    Comma,
    Semicolon,
}

/// Which stage rejected the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lex,
    Parse,
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("lex error at offset {offset}: {source}")]
    Lex {
        offset: usize,
        #[source]
        source: TokenizeError,
    },
    #[error("parse error at offset {offset}: {source}")]
    Parse {
        offset: usize,
        #[source]
        source: ParseError,
    },
}

impl CompileError {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Lex { .. } => Phase::Lex,
            Self::Parse { .. } => Phase::Parse,
        }
    }

    pub fn offset(&self) -> usize {
        match self {
            Self::Lex { offset, .. } | Self::Parse { offset, .. } => *offset,
        }
    }
}

/// Intermediate results of the logic grammar's semantic actions.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicNode {
    Expr(Expr),
    Command(Command),
    Commands(Vec<Command>),
    Args(Vec<Expr>),
}

type LogicChild = Child<LogicToken, LogicNode>;

/// The logic token table, in priority order.
pub fn logic_tokenizer(max_iterations: usize) -> Result<Tokenizer<LogicToken>, TokenizeError> {
    use LogicToken::*;
    let rules = vec![
        TokenRule::emit("(?i)and", And)?,
        TokenRule::emit("(?i)or", Or)?,
        TokenRule::emit("(?i)not", Not)?,
        TokenRule::emit("(?i)true", True)?,
        TokenRule::emit("(?i)false", False)?,
        TokenRule::emit("!=", NotEquals)?,
        TokenRule::emit("<=", LessEquals)?,
        TokenRule::emit(">=", GreaterEquals)?,
        TokenRule::emit("<", Less)?,
        TokenRule::emit(">", Greater)?,
        TokenRule::emit(r"\+=", PlusEquals)?,
        TokenRule::emit("-=", MinusEquals)?,
        TokenRule::emit(r"\*=", TimesEquals)?,
        TokenRule::emit("/=", DivideEquals)?,
        TokenRule::emit("=", Equals)?,
        TokenRule::emit(r"\+", Plus)?,
        TokenRule::emit("-", Minus)?,
        TokenRule::emit(r"\*", Times)?,
        TokenRule::emit("/", Divide)?,
        TokenRule::emit("%", Modulo)?,
        TokenRule::emit(r"[0-9]+(?:\.[0-9]+)?", Number)?,
        TokenRule::emit("[A-Za-z_][A-Za-z0-9_]*", Identifier)?,
        TokenRule::emit(r"@[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*", Visit)?,
        TokenRule::emit(r"\(", OpenParen)?,
        TokenRule::emit(r"\)", CloseParen)?,
        TokenRule::emit(",", Comma)?,
        TokenRule::emit(";", Semicolon)?,
        TokenRule::discard(r"\s+")?,
    ];
    Ok(Tokenizer::new(rules).with_max_iterations(max_iterations))
}

/// The logic grammar with its three roots.
///
/// Precedence, loosest first: `or`, `and`, `not`, comparison, additive,
/// multiplicative, unary minus, atom. `strict` is a boolean expression that
/// is not a bare arithmetic term; only it may sit inside boolean
/// parentheses, which keeps `(x)` from having two derivations.
pub fn logic_grammar() -> Result<Grammar<LogicToken, LogicNode>, super::earley::GrammarError> {
    use LogicToken::*;
    use Symbol::{NonTerminal as N, Terminal as T};

    let productions = vec![
        // actions
        Production::new("actions", vec![N("commands")], pass),
        Production::new("actions", vec![N("commands"), T(Semicolon)], pass),
        Production::new("commands", vec![N("command")], commands_start),
        Production::new("commands", vec![N("commands"), T(Semicolon), N("command")], commands_push),
        Production::new("command", vec![T(Identifier), T(Equals), N("sum")], |c| {
            command(c, AssignOp::Set)
        }),
        Production::new("command", vec![T(Identifier), T(PlusEquals), N("sum")], |c| {
            command(c, AssignOp::Add)
        }),
        Production::new("command", vec![T(Identifier), T(MinusEquals), N("sum")], |c| {
            command(c, AssignOp::Sub)
        }),
        Production::new("command", vec![T(Identifier), T(TimesEquals), N("sum")], |c| {
            command(c, AssignOp::Mul)
        }),
        Production::new("command", vec![T(Identifier), T(DivideEquals), N("sum")], |c| {
            command(c, AssignOp::Div)
        }),
        // roots over expressions
        Production::new("predicate", vec![N("or_expr")], pass),
        Production::new("expression", vec![N("sum")], pass),
        // boolean layers
        Production::new("or_expr", vec![N("or_expr"), T(Or), N("and_expr")], |c| {
            binary(c, BinaryOp::Or)
        }),
        Production::new("or_expr", vec![N("and_expr")], pass),
        Production::new("and_expr", vec![N("and_expr"), T(And), N("not_expr")], |c| {
            binary(c, BinaryOp::And)
        }),
        Production::new("and_expr", vec![N("not_expr")], pass),
        Production::new("not_expr", vec![T(Not), N("not_expr")], not),
        Production::new("not_expr", vec![N("bool_atom")], pass),
        Production::new("bool_atom", vec![N("sum")], pass),
        Production::new("bool_atom", vec![N("comparison")], pass),
        Production::new("bool_atom", vec![T(True)], |_| Ok(LogicNode::Expr(Expr::Bool(true)))),
        Production::new("bool_atom", vec![T(False)], |_| Ok(LogicNode::Expr(Expr::Bool(false)))),
        Production::new("bool_atom", vec![T(OpenParen), N("strict"), T(CloseParen)], parenthesized),
        Production::new("strict", vec![N("or_expr"), T(Or), N("and_expr")], |c| {
            binary(c, BinaryOp::Or)
        }),
        Production::new("strict", vec![N("and_expr"), T(And), N("not_expr")], |c| {
            binary(c, BinaryOp::And)
        }),
        Production::new("strict", vec![T(Not), N("not_expr")], not),
        Production::new("strict", vec![N("comparison")], pass),
        Production::new("strict", vec![T(True)], |_| Ok(LogicNode::Expr(Expr::Bool(true)))),
        Production::new("strict", vec![T(False)], |_| Ok(LogicNode::Expr(Expr::Bool(false)))),
        Production::new("strict", vec![T(OpenParen), N("strict"), T(CloseParen)], parenthesized),
        // comparisons
        Production::new("comparison", vec![N("sum"), T(Equals), N("sum")], |c| {
            binary(c, BinaryOp::Eq)
        }),
        Production::new("comparison", vec![N("sum"), T(NotEquals), N("sum")], |c| {
            binary(c, BinaryOp::NotEq)
        }),
        Production::new("comparison", vec![N("sum"), T(Less), N("sum")], |c| {
            binary(c, BinaryOp::Lt)
        }),
        Production::new("comparison", vec![N("sum"), T(LessEquals), N("sum")], |c| {
            binary(c, BinaryOp::Le)
        }),
        Production::new("comparison", vec![N("sum"), T(Greater), N("sum")], |c| {
            binary(c, BinaryOp::Gt)
        }),
        Production::new("comparison", vec![N("sum"), T(GreaterEquals), N("sum")], |c| {
            binary(c, BinaryOp::Ge)
        }),
        // arithmetic
        Production::new("sum", vec![N("sum"), T(Plus), N("product")], |c| binary(c, BinaryOp::Add)),
        Production::new("sum", vec![N("sum"), T(Minus), N("product")], |c| {
            binary(c, BinaryOp::Sub)
        }),
        Production::new("sum", vec![N("product")], pass),
        Production::new("product", vec![N("product"), T(Times), N("unary")], |c| {
            binary(c, BinaryOp::Mul)
        }),
        Production::new("product", vec![N("product"), T(Divide), N("unary")], |c| {
            binary(c, BinaryOp::Div)
        }),
        Production::new("product", vec![N("product"), T(Modulo), N("unary")], |c| {
            binary(c, BinaryOp::Mod)
        }),
        Production::new("product", vec![N("unary")], pass),
        Production::new("unary", vec![T(Minus), N("unary")], negate),
        Production::new("unary", vec![N("atom")], pass),
        Production::new("atom", vec![T(Number)], number),
        Production::new("atom", vec![T(Identifier)], quality),
        Production::new("atom", vec![T(Visit)], visits),
        Production::new("atom", vec![T(OpenParen), N("sum"), T(CloseParen)], parenthesized),
        Production::new("atom", vec![T(Identifier), T(OpenParen), T(CloseParen)], call),
        Production::new("atom", vec![T(Identifier), T(OpenParen), N("args"), T(CloseParen)], call),
        Production::new("args", vec![N("sum")], args_start),
        Production::new("args", vec![N("args"), T(Comma), N("sum")], args_push),
    ];

    Grammar::new(&["actions", "predicate", "expression"], productions)
}

fn token(child: LogicChild) -> Result<Token<LogicToken>, String> {
    match child {
        Child::Token(token) => Ok(token),
        Child::Value(node) => Err(format!("expected a token, found {:?}", node)),
    }
}

fn expr(child: LogicChild) -> Result<Expr, String> {
    match child {
        Child::Value(LogicNode::Expr(expr)) => Ok(expr),
        other => Err(format!("expected an expression, found {:?}", other)),
    }
}

fn take<const N: usize>(children: Vec<LogicChild>) -> Result<[LogicChild; N], String> {
    let found = children.len();
    children
        .try_into()
        .map_err(|_| format!("expected {} children, found {}", N, found))
}

fn pass(children: Vec<LogicChild>) -> Result<LogicNode, String> {
    match children.into_iter().next() {
        Some(Child::Value(node)) => Ok(node),
        Some(Child::Token(token)) => Err(format!("unexpected token '{}'", token.text)),
        None => Err("empty rule".to_string()),
    }
}

fn parenthesized(children: Vec<LogicChild>) -> Result<LogicNode, String> {
    let [_, inner, _] = take::<3>(children)?;
    Ok(LogicNode::Expr(expr(inner)?))
}

fn binary(children: Vec<LogicChild>, op: BinaryOp) -> Result<LogicNode, String> {
    let [lhs, _, rhs] = take::<3>(children)?;
    Ok(LogicNode::Expr(Expr::Binary {
        op,
        lhs: Box::new(expr(lhs)?),
        rhs: Box::new(expr(rhs)?),
    }))
}

fn not(children: Vec<LogicChild>) -> Result<LogicNode, String> {
    let [_, inner] = take::<2>(children)?;
    Ok(LogicNode::Expr(Expr::Not(Box::new(expr(inner)?))))
}

fn negate(children: Vec<LogicChild>) -> Result<LogicNode, String> {
    let [_, inner] = take::<2>(children)?;
    Ok(LogicNode::Expr(match expr(inner)? {
        Expr::Number(n) => Expr::Number(-n),
        other => Expr::Negate(Box::new(other)),
    }))
}

fn number(children: Vec<LogicChild>) -> Result<LogicNode, String> {
    let [literal] = take::<1>(children)?;
    let literal = token(literal)?;
    let value = literal
        .text
        .parse::<f64>()
        .map_err(|e| format!("bad number '{}': {}", literal.text, e))?;
    Ok(LogicNode::Expr(Expr::Number(value)))
}

fn quality(children: Vec<LogicChild>) -> Result<LogicNode, String> {
    let [name] = take::<1>(children)?;
    Ok(LogicNode::Expr(Expr::Quality(token(name)?.text)))
}

fn visits(children: Vec<LogicChild>) -> Result<LogicNode, String> {
    let [scene] = take::<1>(children)?;
    let scene = token(scene)?.text;
    Ok(LogicNode::Expr(Expr::Visits(scene.trim_start_matches('@').to_string())))
}

fn call(children: Vec<LogicChild>) -> Result<LogicNode, String> {
    let mut children = children.into_iter();
    let name = children.next().ok_or("missing function name")?;
    let name = token(name)?.text;
    let args = match children.nth(1) {
        Some(Child::Value(LogicNode::Args(args))) => args,
        _ => Vec::new(),
    };
    Ok(LogicNode::Expr(Expr::Call { name, args }))
}

fn args_start(children: Vec<LogicChild>) -> Result<LogicNode, String> {
    let [first] = take::<1>(children)?;
    Ok(LogicNode::Args(vec![expr(first)?]))
}

fn args_push(children: Vec<LogicChild>) -> Result<LogicNode, String> {
    let [args, _, next] = take::<3>(children)?;
    match args {
        Child::Value(LogicNode::Args(mut args)) => {
            args.push(expr(next)?);
            Ok(LogicNode::Args(args))
        }
        other => Err(format!("expected an argument list, found {:?}", other)),
    }
}

fn command(children: Vec<LogicChild>, op: AssignOp) -> Result<LogicNode, String> {
    let [name, _, value] = take::<3>(children)?;
    Ok(LogicNode::Command(Command {
        quality: token(name)?.text,
        op,
        value: expr(value)?,
    }))
}

fn commands_start(children: Vec<LogicChild>) -> Result<LogicNode, String> {
    let [first] = take::<1>(children)?;
    match first {
        Child::Value(LogicNode::Command(command)) => Ok(LogicNode::Commands(vec![command])),
        other => Err(format!("expected a command, found {:?}", other)),
    }
}

fn commands_push(children: Vec<LogicChild>) -> Result<LogicNode, String> {
    let [commands, _, next] = take::<3>(children)?;
    match (commands, next) {
        (
            Child::Value(LogicNode::Commands(mut commands)),
            Child::Value(LogicNode::Command(command)),
        ) => {
            commands.push(command);
            Ok(LogicNode::Commands(commands))
        }
        other => Err(format!("expected commands, found {:?}", other)),
    }
}

/// Compiles logic source into executable units.
///
/// Holds one validated grammar; safe to share between threads.
pub struct LogicCompiler {
    tokenizer: Tokenizer<LogicToken>,
    grammar: Grammar<LogicToken, LogicNode>,
    max_tokens: usize,
}

impl LogicCompiler {
    pub fn new() -> Result<Self, CompilerError> {
        Self::with_max_iterations(DEFAULT_MAX_ITERATIONS)
    }

    pub fn with_max_iterations(max_iterations: usize) -> Result<Self, CompilerError> {
        Ok(Self::from_parts(logic_tokenizer(max_iterations)?, logic_grammar()?))
    }

    pub fn from_parts(
        tokenizer: Tokenizer<LogicToken>,
        grammar: Grammar<LogicToken, LogicNode>,
    ) -> Self {
        Self {
            tokenizer,
            grammar,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Reject sources that tokenize to more than `max_tokens` tokens.
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn compile(&self, source: &str, root: RootKind) -> Result<CompiledLogicUnit, CompileError> {
        let tokens = self.tokenizer.tokenize(source, false).map_err(|error| CompileError::Lex {
            offset: match &error {
                TokenizeError::Unrecognized { offset, .. } => *offset,
                _ => 0,
            },
            source: error,
        })?;
        debug!(root = %root, tokens = tokens.len(), "compiling logic");
        if let Some(first_over) = tokens.get(self.max_tokens) {
            return Err(CompileError::Parse {
                offset: first_over.start,
                source: ParseError::TooLong {
                    offset: first_over.start,
                    limit: self.max_tokens,
                },
            });
        }

        let node = self
            .grammar
            .parse(root.symbol(), &tokens)
            .map_err(|error| CompileError::Parse {
                offset: error.offset(),
                source: error,
            })?;

        let program = match (root, node) {
            (RootKind::Predicate, LogicNode::Expr(expr)) => Program::Predicate(expr),
            (RootKind::Expression, LogicNode::Expr(expr)) => Program::Expression(expr),
            (RootKind::Actions, LogicNode::Commands(commands)) => Program::Actions(commands),
            (root, node) => {
                return Err(CompileError::Parse {
                    offset: 0,
                    source: ParseError::Action {
                        rule: root.symbol().to_string(),
                        message: format!("unexpected result {:?}", node),
                    },
                })
            }
        };

        Ok(CompiledLogicUnit {
            source: source.to_string(),
            root,
            program,
        })
    }

    /// Replace a unit's source and program in place, keeping its root.
    ///
    /// On error the unit is left untouched.
    pub fn recompile(
        &self,
        unit: &mut CompiledLogicUnit,
        source: &str,
    ) -> Result<(), CompileError> {
        *unit = self.compile(source, unit.root)?;
        Ok(())
    }
}
