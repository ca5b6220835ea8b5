//! Earley chart parser with grammar-supplied semantic actions.
//!
//! A `Grammar` is validated once at construction. Parsing builds one chart
//! column per token boundary; items live in a single arena and record how
//! they were reached as `(previous item, child)` back-links, which is what
//! tree reconstruction walks. Exactly one derivation must survive, otherwise
//! the parse is reported as ambiguous.
//!
//! Reconstruction and reduction walk explicit stacks, so input length never
//! turns into call depth.

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use thiserror::Error;
use tracing::trace;

use super::tokenizer::Token;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GrammarError {
    #[error("rule '{rule}' references undefined non-terminal '{symbol}'")]
    UndefinedNonTerminal { rule: String, symbol: String },
    #[error("rule '{0}' is not reachable from any root")]
    UnreachableRule(String),
    #[error("no rule produces root '{0}'")]
    MissingRoot(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unexpected {found} at offset {offset}")]
    NoParse { offset: usize, found: String },
    #[error("input has more than one '{root}' derivation, diverging at offset {offset}")]
    Ambiguous { root: String, offset: usize },
    #[error("input exceeds {limit} tokens at offset {offset}")]
    TooLong { offset: usize, limit: usize },
    #[error("'{0}' is not a root of this grammar")]
    UnknownRoot(String),
    #[error("rule '{rule}' rejected its children: {message}")]
    Action { rule: String, message: String },
}

impl ParseError {
    /// Byte offset the error points at, where one is known.
    pub fn offset(&self) -> usize {
        match self {
            Self::NoParse { offset, .. }
            | Self::Ambiguous { offset, .. }
            | Self::TooLong { offset, .. } => *offset,
            Self::UnknownRoot(_) | Self::Action { .. } => 0,
        }
    }
}

/// A right-hand-side symbol.
#[derive(Debug, Clone, PartialEq)]
pub enum Symbol<T> {
    /// Matches one token whose tag equals this one.
    Terminal(T),
    NonTerminal(&'static str),
}

/// Input to a semantic action: a scanned token or a reduced sub-result.
#[derive(Debug, Clone, PartialEq)]
pub enum Child<T, R> {
    Token(Token<T>),
    Value(R),
}

/// Builds a rule's result from its children, in right-hand-side order.
pub type SemanticAction<T, R> = fn(Vec<Child<T, R>>) -> Result<R, String>;

pub struct Production<T, R> {
    pub lhs: &'static str,
    pub rhs: Vec<Symbol<T>>,
    pub action: SemanticAction<T, R>,
}

impl<T, R> Production<T, R> {
    pub fn new(lhs: &'static str, rhs: Vec<Symbol<T>>, action: SemanticAction<T, R>) -> Self {
        Self { lhs, rhs, action }
    }
}

/// A validated, immutable rule set.
pub struct Grammar<T, R> {
    productions: Vec<Production<T, R>>,
    by_lhs: FxHashMap<&'static str, Vec<usize>>,
    roots: Vec<&'static str>,
}

impl<T, R> Grammar<T, R> {
    /// Validate `productions` against the given roots.
    ///
    /// Every referenced non-terminal must have a producing rule, and every
    /// rule must be reachable from a root.
    pub fn new(
        roots: &[&'static str],
        productions: Vec<Production<T, R>>,
    ) -> Result<Self, GrammarError> {
        let mut by_lhs: FxHashMap<&'static str, Vec<usize>> = FxHashMap::default();
        for (idx, production) in productions.iter().enumerate() {
            by_lhs.entry(production.lhs).or_default().push(idx);
        }

        for root in roots {
            if !by_lhs.contains_key(root) {
                return Err(GrammarError::MissingRoot(root.to_string()));
            }
        }

        for production in &productions {
            for symbol in &production.rhs {
                if let Symbol::NonTerminal(name) = symbol {
                    if !by_lhs.contains_key(name) {
                        return Err(GrammarError::UndefinedNonTerminal {
                            rule: production.lhs.to_string(),
                            symbol: name.to_string(),
                        });
                    }
                }
            }
        }

        let mut reached: FxHashSet<&'static str> = roots.iter().copied().collect();
        let mut queue: VecDeque<&'static str> = roots.iter().copied().collect();
        while let Some(name) = queue.pop_front() {
            for &idx in &by_lhs[name] {
                for symbol in &productions[idx].rhs {
                    if let Symbol::NonTerminal(next) = symbol {
                        if reached.insert(*next) {
                            queue.push_back(*next);
                        }
                    }
                }
            }
        }
        if let Some(orphan) = productions.iter().find(|p| !reached.contains(p.lhs)) {
            return Err(GrammarError::UnreachableRule(orphan.lhs.to_string()));
        }

        Ok(Self {
            productions,
            by_lhs,
            roots: roots.to_vec(),
        })
    }

    pub fn roots(&self) -> &[&'static str] {
        &self.roots
    }
}

impl<T: Clone + PartialEq, R> Grammar<T, R> {
    /// Parse `tokens` as `root` and reduce the single derivation through the
    /// rules' semantic actions.
    pub fn parse(&self, root: &str, tokens: &[Token<T>]) -> Result<R, ParseError> {
        let Some(&root) = self.roots.iter().find(|r| **r == root) else {
            return Err(ParseError::UnknownRoot(root.to_string()));
        };

        let chart = self.build_chart(root, tokens);
        let end = tokens.len();
        let finals: Vec<usize> = chart.columns[end]
            .items
            .iter()
            .copied()
            .filter(|&id| {
                let item = &chart.items[id];
                let production = &self.productions[item.production];
                item.origin == 0 && production.lhs == root && item.dot == production.rhs.len()
            })
            .collect();

        let mut forest = Forest::new(&chart);
        let mut trees = Vec::new();
        for id in finals {
            trees.extend(forest.trees(id));
            if trees.len() >= DERIVATION_LIMIT {
                break;
            }
        }

        match trees.len() {
            0 => Err(no_parse(&chart, tokens)),
            1 => self.reduce(&forest, trees[0], tokens),
            _ => {
                let origin = forest.ambiguous_origin.unwrap_or(0);
                Err(ParseError::Ambiguous {
                    root: root.to_string(),
                    offset: offset_of(tokens, origin),
                })
            }
        }
    }

    fn build_chart(&self, root: &'static str, tokens: &[Token<T>]) -> Chart {
        let mut chart = Chart::new(tokens.len() + 1);
        for &production in &self.by_lhs[root] {
            chart.add(0, production, 0, 0, None);
        }
        chart.columns[0].predicted.insert(root);

        for col in 0..=tokens.len() {
            let mut next = 0;
            while next < chart.columns[col].items.len() {
                let id = chart.columns[col].items[next];
                next += 1;
                let (production, dot, origin) = {
                    let item = &chart.items[id];
                    (item.production, item.dot, item.origin)
                };
                match self.productions[production].rhs.get(dot) {
                    None => self.complete(&mut chart, col, id),
                    Some(Symbol::NonTerminal(name)) => self.predict(&mut chart, col, id, *name),
                    Some(Symbol::Terminal(tag)) => {
                        if tokens.get(col).and_then(|t| t.tag.as_ref()) == Some(tag) {
                            let link = Link {
                                prev: id,
                                child: LinkChild::Token(col),
                            };
                            chart.add(col + 1, production, dot + 1, origin, Some(link));
                        }
                    }
                }
            }
            trace!(column = col, items = chart.columns[col].items.len(), "earley column");
        }
        chart
    }

    fn predict(&self, chart: &mut Chart, col: usize, id: usize, name: &'static str) {
        chart.columns[col].waiting.entry(name).or_default().push(id);

        // Rules that already completed empty in this column.
        let (production, dot, origin) = {
            let item = &chart.items[id];
            (item.production, item.dot, item.origin)
        };
        let finished: Vec<usize> = chart.columns[col]
            .empty_completions
            .iter()
            .filter(|(lhs, _)| *lhs == name)
            .map(|(_, done)| *done)
            .collect();
        for done in finished {
            let link = Link {
                prev: id,
                child: LinkChild::Item(done),
            };
            chart.add(col, production, dot + 1, origin, Some(link));
        }

        if chart.columns[col].predicted.insert(name) {
            for &predicted in &self.by_lhs[name] {
                chart.add(col, predicted, 0, col, None);
            }
        }
    }

    fn complete(&self, chart: &mut Chart, col: usize, id: usize) {
        let (lhs, origin) = {
            let item = &chart.items[id];
            (self.productions[item.production].lhs, item.origin)
        };
        if origin == col {
            chart.columns[col].empty_completions.push((lhs, id));
        }
        let waiting = chart.columns[origin].waiting.get(lhs).cloned().unwrap_or_default();
        for parent in waiting {
            let (production, dot, parent_origin) = {
                let item = &chart.items[parent];
                (item.production, item.dot, item.origin)
            };
            let link = Link {
                prev: parent,
                child: LinkChild::Item(id),
            };
            chart.add(col, production, dot + 1, parent_origin, Some(link));
        }
    }

    /// Run semantic actions bottom-up over derivation `root`.
    fn reduce(
        &self,
        forest: &Forest<'_>,
        root: usize,
        tokens: &[Token<T>],
    ) -> Result<R, ParseError> {
        let mut pending = vec![(root, false)];
        let mut values: Vec<R> = Vec::new();
        while let Some((node, children_done)) = pending.pop() {
            let derivation = &forest.nodes[node];
            if !children_done {
                pending.push((node, true));
                for child in derivation.children.iter().rev() {
                    if let DerivationChild::Node(inner) = child {
                        pending.push((*inner, false));
                    }
                }
                continue;
            }

            let production = &self.productions[derivation.production];
            let reduced_count = derivation
                .children
                .iter()
                .filter(|child| matches!(child, DerivationChild::Node(_)))
                .count();
            let split = values.len().saturating_sub(reduced_count);
            let mut reduced = values.split_off(split).into_iter();
            let mut children = Vec::with_capacity(derivation.children.len());
            for child in &derivation.children {
                match child {
                    DerivationChild::Token(pos) => {
                        children.push(Child::Token(tokens[*pos].clone()))
                    }
                    DerivationChild::Node(_) => {
                        if let Some(value) = reduced.next() {
                            children.push(Child::Value(value));
                        }
                    }
                }
            }
            let value = (production.action)(children).map_err(|message| ParseError::Action {
                rule: production.lhs.to_string(),
                message,
            })?;
            values.push(value);
        }
        values.pop().ok_or_else(|| ParseError::Action {
            rule: self.productions[forest.nodes[root].production].lhs.to_string(),
            message: "reduction produced no value".to_string(),
        })
    }
}

fn offset_of<T>(tokens: &[Token<T>], column: usize) -> usize {
    match tokens.get(column) {
        Some(token) => token.start,
        None => tokens.last().map(Token::end).unwrap_or(0),
    }
}

fn no_parse<T>(chart: &Chart, tokens: &[Token<T>]) -> ParseError {
    let furthest = chart
        .columns
        .iter()
        .rposition(|column| !column.items.is_empty())
        .unwrap_or(0);
    match tokens.get(furthest) {
        Some(token) => ParseError::NoParse {
            offset: token.start,
            found: format!("'{}'", token.text),
        },
        None => ParseError::NoParse {
            offset: tokens.last().map(Token::end).unwrap_or(0),
            found: "end of input".to_string(),
        },
    }
}

/// Two derivations are enough to prove ambiguity.
const DERIVATION_LIMIT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkChild {
    Token(usize),
    Item(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Link {
    prev: usize,
    child: LinkChild,
}

#[derive(Debug)]
struct Item {
    production: usize,
    dot: usize,
    origin: usize,
    links: Vec<Link>,
}

#[derive(Debug, Default)]
struct Column {
    items: Vec<usize>,
    index: FxHashMap<(usize, usize, usize), usize>,
    /// Items in this column waiting on a non-terminal, by that non-terminal.
    waiting: FxHashMap<&'static str, Vec<usize>>,
    predicted: FxHashSet<&'static str>,
    empty_completions: Vec<(&'static str, usize)>,
}

#[derive(Debug)]
struct Chart {
    items: Vec<Item>,
    columns: Vec<Column>,
}

impl Chart {
    fn new(columns: usize) -> Self {
        Self {
            items: Vec::new(),
            columns: (0..columns).map(|_| Column::default()).collect(),
        }
    }

    /// Add an item, or record a new back-link on the existing one.
    fn add(
        &mut self,
        col: usize,
        production: usize,
        dot: usize,
        origin: usize,
        link: Option<Link>,
    ) -> usize {
        let key = (production, dot, origin);
        if let Some(&id) = self.columns[col].index.get(&key) {
            if let Some(link) = link {
                if !self.items[id].links.contains(&link) {
                    self.items[id].links.push(link);
                }
            }
            return id;
        }
        let id = self.items.len();
        self.items.push(Item {
            production,
            dot,
            origin,
            links: link.into_iter().collect(),
        });
        let column = &mut self.columns[col];
        column.index.insert(key, id);
        column.items.push(id);
        id
    }
}

#[derive(Debug)]
struct Derivation {
    production: usize,
    children: Vec<DerivationChild>,
}

/// `Node` indexes `Forest::nodes`.
#[derive(Debug, Clone, Copy)]
enum DerivationChild {
    Token(usize),
    Node(usize),
}

type Sequence = Vec<DerivationChild>;

/// Enumerates up to `DERIVATION_LIMIT` derivations per item.
struct Forest<'c> {
    chart: &'c Chart,
    nodes: Vec<Derivation>,
    /// Child sequences matched so far, per item; `None` until resolved.
    sequences: Vec<Option<Vec<Sequence>>>,
    trees: Vec<Option<Vec<usize>>>,
    active: Vec<bool>,
    /// Origin column of the first completed item found with two derivations.
    ambiguous_origin: Option<usize>,
}

impl<'c> Forest<'c> {
    fn new(chart: &'c Chart) -> Self {
        Self {
            chart,
            nodes: Vec::new(),
            sequences: vec![None; chart.items.len()],
            trees: vec![None; chart.items.len()],
            active: vec![false; chart.items.len()],
            ambiguous_origin: None,
        }
    }

    /// Derivations of completed item `id`, as indices into `nodes`.
    fn trees(&mut self, id: usize) -> Vec<usize> {
        self.resolve(id);
        self.trees_of(id)
    }

    fn trees_of(&mut self, id: usize) -> Vec<usize> {
        if let Some(done) = &self.trees[id] {
            return done.clone();
        }
        // Still being resolved: a cyclic derivation contributes nothing new.
        let Some(sequences) = self.sequences[id].clone() else {
            return Vec::new();
        };
        let chart = self.chart;
        let item = &chart.items[id];
        let ids: Vec<usize> = sequences
            .into_iter()
            .map(|children| {
                self.nodes.push(Derivation {
                    production: item.production,
                    children,
                });
                self.nodes.len() - 1
            })
            .collect();
        if ids.len() >= DERIVATION_LIMIT && self.ambiguous_origin.is_none() {
            self.ambiguous_origin = Some(item.origin);
        }
        self.trees[id] = Some(ids.clone());
        ids
    }

    /// Resolve the sequences of `root` and everything it depends on,
    /// dependencies first.
    fn resolve(&mut self, root: usize) {
        let chart = self.chart;
        let mut stack = vec![(root, false)];
        while let Some((id, deps_done)) = stack.pop() {
            if self.sequences[id].is_some() {
                continue;
            }
            let item = &chart.items[id];
            if item.dot == 0 {
                self.sequences[id] = Some(vec![Vec::new()]);
                continue;
            }
            if !deps_done {
                if self.active[id] {
                    continue;
                }
                self.active[id] = true;
                stack.push((id, true));
                for link in item.links.iter().rev() {
                    if let LinkChild::Item(child) = link.child {
                        stack.push((child, false));
                    }
                    stack.push((link.prev, false));
                }
                continue;
            }
            let out = self.combine(id);
            self.active[id] = false;
            self.sequences[id] = Some(out);
        }
    }

    fn combine(&mut self, id: usize) -> Vec<Sequence> {
        let chart = self.chart;
        let mut out: Vec<Sequence> = Vec::new();
        'links: for link in &chart.items[id].links {
            let children: Vec<DerivationChild> = match link.child {
                LinkChild::Token(pos) => vec![DerivationChild::Token(pos)],
                LinkChild::Item(child) => self
                    .trees_of(child)
                    .into_iter()
                    .map(DerivationChild::Node)
                    .collect(),
            };
            if children.is_empty() {
                continue;
            }
            let prefixes = self.sequences[link.prev].clone().unwrap_or_default();
            for prefix in &prefixes {
                for child in &children {
                    let mut sequence = prefix.clone();
                    sequence.push(*child);
                    out.push(sequence);
                    if out.len() >= DERIVATION_LIMIT {
                        break 'links;
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Tag {
        Num,
        Plus,
        Times,
        Open,
        Close,
        X,
    }

    fn tokens(pairs: &[(Tag, &str)]) -> Vec<Token<Tag>> {
        let mut start = 0;
        pairs
            .iter()
            .map(|(tag, text)| {
                let token = Token {
                    tag: Some(*tag),
                    start,
                    text: text.to_string(),
                };
                start += text.len();
                token
            })
            .collect()
    }

    fn value(child: Child<Tag, f64>) -> Result<f64, String> {
        match child {
            Child::Value(v) => Ok(v),
            Child::Token(t) => t.text.parse().map_err(|_| format!("not a number: {}", t.text)),
        }
    }

    fn first(children: Vec<Child<Tag, f64>>) -> Result<f64, String> {
        children.into_iter().next().map(value).unwrap_or(Err("empty".to_string()))
    }

    fn fold(children: Vec<Child<Tag, f64>>, f: fn(f64, f64) -> f64) -> Result<f64, String> {
        let mut it = children.into_iter();
        let lhs = it.next().map(value).unwrap_or(Err("missing lhs".to_string()))?;
        let rhs = it.nth(1).map(value).unwrap_or(Err("missing rhs".to_string()))?;
        Ok(f(lhs, rhs))
    }

    fn arithmetic() -> Grammar<Tag, f64> {
        use Symbol::{NonTerminal as N, Terminal as T};
        Grammar::new(
            &["sum"],
            vec![
                Production::new("sum", vec![N("sum"), T(Tag::Plus), N("product")], |c| {
                    fold(c, |a, b| a + b)
                }),
                Production::new("sum", vec![N("product")], first),
                Production::new("product", vec![N("product"), T(Tag::Times), N("atom")], |c| {
                    fold(c, |a, b| a * b)
                }),
                Production::new("product", vec![N("atom")], first),
                Production::new("atom", vec![T(Tag::Num)], first),
                Production::new("atom", vec![T(Tag::Open), N("sum"), T(Tag::Close)], |c| {
                    c.into_iter().nth(1).map(value).unwrap_or(Err("missing".to_string()))
                }),
            ],
        )
        .unwrap()
    }

    #[test]
    fn parenthesized_arithmetic() {
        let input = tokens(&[
            (Tag::Num, "2"),
            (Tag::Plus, "+"),
            (Tag::Open, "("),
            (Tag::Num, "3"),
            (Tag::Times, "*"),
            (Tag::Num, "4"),
            (Tag::Close, ")"),
        ]);
        assert_eq!(arithmetic().parse("sum", &input).unwrap(), 14.0);
    }

    #[test]
    fn precedence_from_grammar_shape() {
        let input = tokens(&[
            (Tag::Num, "2"),
            (Tag::Times, "*"),
            (Tag::Num, "3"),
            (Tag::Plus, "+"),
            (Tag::Num, "4"),
        ]);
        assert_eq!(arithmetic().parse("sum", &input).unwrap(), 10.0);
    }

    #[test]
    fn failure_reports_offending_token() {
        let input = tokens(&[(Tag::Num, "2"), (Tag::Plus, "+"), (Tag::Close, ")")]);
        let err = arithmetic().parse("sum", &input).unwrap_err();
        assert_eq!(
            err,
            ParseError::NoParse {
                offset: 2,
                found: "')'".to_string()
            }
        );
    }

    #[test]
    fn truncated_input_reports_end() {
        let input = tokens(&[(Tag::Num, "2"), (Tag::Plus, "+")]);
        let err = arithmetic().parse("sum", &input).unwrap_err();
        assert!(matches!(
            err,
            ParseError::NoParse { offset: 2, ref found } if found == "end of input"
        ));
    }

    #[test]
    fn unknown_root_is_rejected() {
        assert_eq!(
            arithmetic().parse("atom", &[]).unwrap_err(),
            ParseError::UnknownRoot("atom".to_string())
        );
    }

    #[test]
    fn ambiguous_grammar_detected() {
        use Symbol::{NonTerminal as N, Terminal as T};
        let grammar: Grammar<Tag, f64> = Grammar::new(
            &["e"],
            vec![
                Production::new("e", vec![N("e"), T(Tag::Plus), N("e")], |c| fold(c, |a, b| a + b)),
                Production::new("e", vec![T(Tag::Num)], first),
            ],
        )
        .unwrap();
        let input = tokens(&[
            (Tag::Num, "1"),
            (Tag::Plus, "+"),
            (Tag::Num, "2"),
            (Tag::Plus, "+"),
            (Tag::Num, "3"),
        ]);
        assert_eq!(
            grammar.parse("e", &input),
            Err(ParseError::Ambiguous {
                root: "e".to_string(),
                offset: 0
            })
        );

        let unambiguous = tokens(&[(Tag::Num, "1"), (Tag::Plus, "+"), (Tag::Num, "2")]);
        assert_eq!(grammar.parse("e", &unambiguous).unwrap(), 3.0);
    }

    #[test]
    fn ambiguity_reports_where_it_starts() {
        use Symbol::{NonTerminal as N, Terminal as T};
        let grammar: Grammar<Tag, f64> = Grammar::new(
            &["s"],
            vec![
                Production::new("s", vec![T(Tag::X), N("e")], |c| {
                    c.into_iter().nth(1).map(value).unwrap_or(Err("missing".to_string()))
                }),
                Production::new("e", vec![N("e"), T(Tag::Plus), N("e")], |c| fold(c, |a, b| a + b)),
                Production::new("e", vec![T(Tag::Num)], first),
            ],
        )
        .unwrap();
        let input = tokens(&[
            (Tag::X, "x"),
            (Tag::Num, "1"),
            (Tag::Plus, "+"),
            (Tag::Num, "2"),
            (Tag::Plus, "+"),
            (Tag::Num, "3"),
        ]);
        let err = grammar.parse("s", &input).unwrap_err();
        assert_eq!(
            err,
            ParseError::Ambiguous {
                root: "s".to_string(),
                offset: 1
            }
        );
        assert_eq!(err.offset(), 1);
    }

    #[test]
    fn long_left_recursive_chain_parses() {
        let mut pairs = vec![(Tag::Num, "1")];
        for _ in 1..5000 {
            pairs.push((Tag::Plus, "+"));
            pairs.push((Tag::Num, "1"));
        }
        assert_eq!(arithmetic().parse("sum", &tokens(&pairs)).unwrap(), 5000.0);
    }

    #[test]
    fn deep_parentheses_parse() {
        let mut pairs = vec![(Tag::Open, "("); 400];
        pairs.push((Tag::Num, "7"));
        pairs.extend(vec![(Tag::Close, ")"); 400]);
        assert_eq!(arithmetic().parse("sum", &tokens(&pairs)).unwrap(), 7.0);
    }

    #[test]
    fn empty_rules_complete_in_place() {
        use Symbol::{NonTerminal as N, Terminal as T};
        let grammar: Grammar<Tag, f64> = Grammar::new(
            &["s"],
            vec![
                Production::new("s", vec![N("opt"), T(Tag::X)], |_| Ok(1.0)),
                Production::new("opt", vec![], |_| Ok(0.0)),
                Production::new("opt", vec![T(Tag::Num)], first),
            ],
        )
        .unwrap();
        assert_eq!(grammar.parse("s", &tokens(&[(Tag::X, "x")])).unwrap(), 1.0);
        assert_eq!(grammar.parse("s", &tokens(&[(Tag::Num, "5"), (Tag::X, "x")])).unwrap(), 1.0);
    }

    #[test]
    fn undefined_non_terminal_rejected() {
        use Symbol::NonTerminal as N;
        let result: Result<Grammar<Tag, f64>, _> =
            Grammar::new(&["s"], vec![Production::new("s", vec![N("missing")], first)]);
        assert_eq!(
            result.err(),
            Some(GrammarError::UndefinedNonTerminal {
                rule: "s".to_string(),
                symbol: "missing".to_string()
            })
        );
    }

    #[test]
    fn unreferenced_rule_rejected() {
        use Symbol::Terminal as T;
        let result: Result<Grammar<Tag, f64>, _> = Grammar::new(
            &["s"],
            vec![
                Production::new("s", vec![T(Tag::Num)], first),
                Production::new("foo", vec![T(Tag::X)], first),
            ],
        );
        assert_eq!(result.err(), Some(GrammarError::UnreachableRule("foo".to_string())));
    }

    #[test]
    fn missing_root_rejected() {
        use Symbol::Terminal as T;
        let result: Result<Grammar<Tag, f64>, _> =
            Grammar::new(&["s", "t"], vec![Production::new("s", vec![T(Tag::Num)], first)]);
        assert_eq!(result.err(), Some(GrammarError::MissingRoot("t".to_string())));
    }

    #[test]
    fn action_errors_surface() {
        use Symbol::Terminal as T;
        let grammar: Grammar<Tag, f64> =
            Grammar::new(
                &["s"],
                vec![Production::new("s", vec![T(Tag::Num)], |_| Err("nope".to_string()))],
            )
                .unwrap();
        let err = grammar.parse("s", &tokens(&[(Tag::Num, "1")])).unwrap_err();
        assert!(matches!(err, ParseError::Action { ref rule, .. } if rule == "s"));
    }
}
