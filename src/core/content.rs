//! Content markup compiler: turns authored rich text into a content tree
//! plus the indexed list of state dependencies it refers to.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use super::compiler::CompilerError;
use super::logic::{CompileError, LogicCompiler};
use super::markup::{self, Feature, MarkupError, Range, RangeKind, RangeNode};
use super::tokenizer::{TokenizeError, Tokenizer};
use crate::schema::content::{
    CompiledContent, ContentNode, DependencyKind, DependencyLogic, StateDependency,
};
use crate::schema::logic::{CompiledLogicUnit, RootKind};

static CONDITION_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?i:if)\b\s*([^:]*?)\s*:").unwrap());
static DISPLAY_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").unwrap());

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("markup error: {0}")]
    Markup(#[from] MarkupError),
    #[error("failed to compile '{source_text}': {error}")]
    Logic {
        source_text: String,
        #[source]
        error: CompileError,
    },
    #[error("feature scan failed: {0}")]
    Tokenize(#[from] TokenizeError),
}

pub struct ContentCompiler {
    inline: Tokenizer<Feature>,
    paragraphs: Tokenizer<Feature>,
    max_nesting_depth: usize,
}

impl ContentCompiler {
    pub fn new(max_lex_iterations: usize, max_nesting_depth: usize) -> Result<Self, CompilerError> {
        Ok(Self {
            inline: markup::feature_tokenizer(false, max_lex_iterations)?,
            paragraphs: markup::feature_tokenizer(true, max_lex_iterations)?,
            max_nesting_depth,
        })
    }

    /// Compile markup, compiling each dependency's logic with `logic`.
    ///
    /// Without `collect_paragraphs` the result is the body of the single
    /// implicit paragraph.
    pub fn compile(
        &self,
        logic: &LogicCompiler,
        source: &str,
        collect_paragraphs: bool,
    ) -> Result<CompiledContent, ContentError> {
        let tokenizer = if collect_paragraphs {
            &self.paragraphs
        } else {
            &self.inline
        };
        let tokens = tokenizer.tokenize(source, true)?;
        debug!(features = tokens.len(), collect_paragraphs, "compiling content");

        let events = markup::resolve_boundaries(&tokens)?;
        let tree = markup::build_ranges(events, self.max_nesting_depth)?;
        let tree = markup::tidy(tree).unwrap_or_else(|| RangeNode::new(RangeKind::Root));
        extract(tree, logic, collect_paragraphs)
    }
}

/// Replace conditional and insert ranges by dependency indices, then
/// normalize the root.
pub(crate) fn extract(
    tree: RangeNode,
    logic: &LogicCompiler,
    collect_paragraphs: bool,
) -> Result<CompiledContent, ContentError> {
    let mut extractor = Extractor {
        logic,
        dependencies: Vec::new(),
    };
    let mut top = extractor.children(tree.children)?;
    if !collect_paragraphs {
        if let [ContentNode::Paragraph(_)] = top.as_slice() {
            if let Some(ContentNode::Paragraph(children)) = top.pop() {
                top = children;
            }
        }
    }
    let root = if top.len() == 1 {
        top.remove(0)
    } else {
        ContentNode::Sequence(top)
    };
    Ok(CompiledContent {
        root,
        dependencies: extractor.dependencies,
    })
}

struct Extractor<'a> {
    logic: &'a LogicCompiler,
    dependencies: Vec<StateDependency>,
}

impl Extractor<'_> {
    fn children(&mut self, children: Vec<Range>) -> Result<Vec<ContentNode>, ContentError> {
        children
            .into_iter()
            .map(|child| match child {
                Range::Text(text) => Ok(ContentNode::Text(text)),
                Range::Node(node) => self.node(node),
            })
            .collect()
    }

    fn node(&mut self, node: RangeNode) -> Result<ContentNode, ContentError> {
        Ok(match node.kind {
            RangeKind::Conditional => return self.conditional(node.children),
            RangeKind::Insert => return self.insert(node.children),
            RangeKind::RawScript => ContentNode::RawScript(raw_source(&node.children)),
            RangeKind::LineBreak => ContentNode::LineBreak,
            RangeKind::HorizontalRule => ContentNode::HorizontalRule,
            RangeKind::Root => ContentNode::Sequence(self.children(node.children)?),
            RangeKind::Paragraph => ContentNode::Paragraph(self.children(node.children)?),
            RangeKind::Quotation => ContentNode::Quotation(self.children(node.children)?),
            RangeKind::Attribution => ContentNode::Attribution(self.children(node.children)?),
            RangeKind::Heading => ContentNode::Heading(self.children(node.children)?),
            RangeKind::Emphasis => ContentNode::Emphasis(self.children(node.children)?),
            RangeKind::StrongEmphasis => ContentNode::StrongEmphasis(self.children(node.children)?),
            RangeKind::Hidden => ContentNode::Hidden(self.children(node.children)?),
        })
    }

    fn conditional(&mut self, mut children: Vec<Range>) -> Result<ContentNode, ContentError> {
        if matches!(children.first(), Some(child) if is_blank(child)) && children.len() > 1 {
            children.remove(0);
        }
        let (logic, rest, consumed) = match children.first() {
            Some(Range::Text(text)) => {
                let captures = CONDITION_PREFIX
                    .captures(text)
                    .ok_or(MarkupError::MalformedConditional)?;
                let condition = captures.get(1).map_or("", |m| m.as_str());
                let taken = captures.get(0).map_or(0, |m| m.end());
                if condition.is_empty() {
                    return Err(MarkupError::MalformedConditional.into());
                }
                let unit = self.compile_logic(condition, RootKind::Predicate)?;
                (DependencyLogic::Structured(unit), text[taken..].to_string(), 1)
            }
            Some(Range::Node(raw)) if raw.kind == RangeKind::RawScript => {
                let rest = match children.get(1) {
                    Some(Range::Text(text)) => {
                        text.trim_start().strip_prefix(':').map(str::to_string)
                    }
                    _ => None,
                };
                let rest = rest.ok_or(MarkupError::MalformedConditional)?;
                let source = raw_source(&raw.children).trim().to_string();
                (DependencyLogic::RawScript(source), rest, 2)
            }
            _ => return Err(MarkupError::MalformedConditional.into()),
        };

        let dependency = self.push(StateDependency {
            kind: DependencyKind::Predicate,
            logic,
            formatter: None,
        });

        children.drain(..consumed);
        children.insert(0, Range::Text(rest));
        if let Some(Range::Text(text)) = children.first_mut() {
            *text = text.trim_start().to_string();
        }
        if let Some(Range::Text(text)) = children.last_mut() {
            text.truncate(text.trim_end().len());
        }
        children.retain(|child| !matches!(child, Range::Text(text) if text.is_empty()));

        Ok(ContentNode::Conditional {
            dependency,
            content: self.children(children)?,
        })
    }

    fn insert(&mut self, mut children: Vec<Range>) -> Result<ContentNode, ContentError> {
        children.retain(|child| !is_blank(child));
        let (logic, formatter) = match children.as_slice() {
            [Range::Node(raw)] if raw.kind == RangeKind::RawScript => {
                (DependencyLogic::RawScript(raw_source(&raw.children).trim().to_string()), None)
            }
            [Range::Node(raw), Range::Text(text)] if raw.kind == RangeKind::RawScript => {
                let name = text
                    .trim_start()
                    .strip_prefix(':')
                    .ok_or(MarkupError::MalformedInsert)?;
                let source = raw_source(&raw.children).trim().to_string();
                (DependencyLogic::RawScript(source), Some(display_name(name)?))
            }
            [Range::Text(text)] => {
                let (expression, name) = match text.split_once(':') {
                    Some((expression, name)) => (expression, Some(display_name(name)?)),
                    None => (text.as_str(), None),
                };
                let expression = expression.trim();
                if expression.is_empty() {
                    return Err(MarkupError::MalformedInsert.into());
                }
                let unit = self.compile_logic(expression, RootKind::Expression)?;
                (DependencyLogic::Structured(unit), name)
            }
            _ => return Err(MarkupError::MalformedInsert.into()),
        };

        let dependency = self.push(StateDependency {
            kind: DependencyKind::Insert,
            logic,
            formatter,
        });
        Ok(ContentNode::Insert { dependency })
    }

    fn compile_logic(
        &self,
        source: &str,
        root: RootKind,
    ) -> Result<CompiledLogicUnit, ContentError> {
        self.logic.compile(source, root).map_err(|error| ContentError::Logic {
            source_text: source.to_string(),
            error,
        })
    }

    fn push(&mut self, dependency: StateDependency) -> usize {
        self.dependencies.push(dependency);
        self.dependencies.len() - 1
    }
}

fn is_blank(child: &Range) -> bool {
    matches!(child, Range::Text(text) if text.trim().is_empty())
}

fn raw_source(children: &[Range]) -> String {
    children
        .iter()
        .filter_map(|child| match child {
            Range::Text(text) => Some(text.as_str()),
            Range::Node(_) => None,
        })
        .collect()
}

fn display_name(name: &str) -> Result<String, MarkupError> {
    let name = name.trim();
    if DISPLAY_NAME.is_match(name) {
        Ok(name.to_string())
    } else {
        Err(MarkupError::InvalidDisplayName(name.to_string()))
    }
}

impl CompiledContent {
    /// Rewrite every dependency's source and recompile it in place.
    ///
    /// Dependency indices never change. Raw scripts are rewritten textually.
    /// If any dependency fails to recompile, the content is left unchanged.
    pub fn relink(
        &mut self,
        compiler: &LogicCompiler,
        mut rewrite: impl FnMut(&str) -> String,
    ) -> Result<(), ContentError> {
        let mut relinked = self.dependencies.clone();
        for dependency in &mut relinked {
            match &mut dependency.logic {
                DependencyLogic::Structured(unit) => {
                    let source = rewrite(&unit.source);
                    compiler
                        .recompile(unit, &source)
                        .map_err(|error| ContentError::Logic {
                            source_text: source,
                            error,
                        })?;
                }
                DependencyLogic::RawScript(source) => *source = rewrite(source),
            }
        }
        self.dependencies = relinked;
        Ok(())
    }
}
