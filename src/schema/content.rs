use serde::{Deserialize, Serialize};

use super::logic::CompiledLogicUnit;

/// A node of compiled rich-text content.
///
/// State-dependent nodes never hold their logic directly: they carry an
/// index into `CompiledContent::dependencies`, so one tree can be replayed
/// against any number of runtime states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContentNode {
    Text(String),
    Paragraph(Vec<ContentNode>),
    Quotation(Vec<ContentNode>),
    Attribution(Vec<ContentNode>),
    Heading(Vec<ContentNode>),
    /// `*x*`
    Emphasis(Vec<ContentNode>),
    /// `**x**`
    StrongEmphasis(Vec<ContentNode>),
    /// `[x]`
    Hidden(Vec<ContentNode>),
    /// `[? if cond : x ?]`; `content` is shown when dependency `dependency` holds.
    Conditional {
        dependency: usize,
        content: Vec<ContentNode>,
    },
    /// `[+ expr +]`; replaced by the resolved value of dependency `dependency`.
    Insert { dependency: usize },
    /// `{! ... !}` outside any conditional or insert, passed through untouched.
    RawScript(String),
    LineBreak,
    HorizontalRule,
    /// Several top-level nodes. Only ever appears as the root.
    Sequence(Vec<ContentNode>),
}

impl ContentNode {
    /// Child nodes, for the variants that have them.
    pub fn children(&self) -> &[ContentNode] {
        match self {
            Self::Paragraph(c)
            | Self::Quotation(c)
            | Self::Attribution(c)
            | Self::Heading(c)
            | Self::Emphasis(c)
            | Self::StrongEmphasis(c)
            | Self::Hidden(c)
            | Self::Sequence(c) => c,
            Self::Conditional { content, .. } => content,
            Self::Text(_)
            | Self::Insert { .. }
            | Self::RawScript(_)
            | Self::LineBreak
            | Self::HorizontalRule => &[],
        }
    }

    /// Dependency indices referenced by this subtree, in pre-order.
    pub fn dependency_indices(&self) -> Vec<usize> {
        let mut out = Vec::new();
        self.collect_dependencies(&mut out);
        out
    }

    fn collect_dependencies(&self, out: &mut Vec<usize>) {
        match self {
            Self::Conditional { dependency, .. } | Self::Insert { dependency } => {
                out.push(*dependency)
            }
            _ => {}
        }
        for child in self.children() {
            child.collect_dependencies(out);
        }
    }
}

/// What a dependency's resolved value is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyKind {
    /// Gates a conditional span; resolves to a boolean.
    Predicate,
    /// Replaces an insert span; resolves to a displayable value.
    Insert,
}

/// How a dependency is evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DependencyLogic {
    /// Logic-language source compiled into an executable unit.
    Structured(CompiledLogicUnit),
    /// Opaque raw script handed to the engine as-is.
    RawScript(String),
}

/// A state-dependent fragment extracted from content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDependency {
    pub kind: DependencyKind,
    pub logic: DependencyLogic,
    /// Named display formatter for inserts (`[+ gold : coins +]`).
    pub formatter: Option<String>,
}

impl StateDependency {
    pub fn source(&self) -> &str {
        match &self.logic {
            DependencyLogic::Structured(unit) => &unit.source,
            DependencyLogic::RawScript(source) => source,
        }
    }

    pub fn is_raw_script(&self) -> bool {
        matches!(self.logic, DependencyLogic::RawScript(_))
    }
}

/// A compiled content tree and the dependencies its nodes index into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledContent {
    pub root: ContentNode,
    /// In discovery order (pre-order, left to right).
    pub dependencies: Vec<StateDependency>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_indices_in_preorder() {
        let root = ContentNode::Sequence(vec![
            ContentNode::Conditional {
                dependency: 0,
                content: vec![ContentNode::Insert { dependency: 1 }],
            },
            ContentNode::Emphasis(vec![ContentNode::Insert { dependency: 2 }]),
        ]);
        assert_eq!(root.dependency_indices(), vec![0, 1, 2]);
    }

    #[test]
    fn leaves_have_no_children() {
        assert!(ContentNode::Text("x".to_string()).children().is_empty());
        assert!(ContentNode::LineBreak.children().is_empty());
    }
}
