//! Content markup front half: feature scan, boundary resolution, range
//! building and tidying.
//!
//! The feature tokenizer finds markers; everything between them is text.
//! The boundary resolver decides what each marker means given the spans
//! currently open and turns the stream into start/end/single events. The
//! range builder folds those events into a tree, and `tidy` cleans it up
//! for extraction.

use thiserror::Error;
use tracing::warn;

use super::tokenizer::{Token, TokenRule, Tokenizer, TokenizeError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
    #[error("insert opened inside another insert at offset {offset}")]
    NestedInsert { offset: usize },
    #[error("hidden span opened inside {within} at offset {offset}")]
    NestedHidden { offset: usize, within: &'static str },
    #[error("{kind} opened at offset {offset} is never closed")]
    Unclosed { kind: &'static str, offset: usize },
    #[error("{kind} opened at offset {opened} is still open at paragraph break {offset}")]
    UnclosedAtBreak {
        kind: &'static str,
        opened: usize,
        offset: usize,
    },
    #[error("markup nested deeper than {limit} levels")]
    TooDeep { limit: usize },
    #[error("conditional must begin with 'if <condition>:' or a raw script followed by ':'")]
    MalformedConditional,
    #[error("insert must hold one expression or raw script, optionally followed by ': formatter'")]
    MalformedInsert,
    #[error("invalid display formatter name '{0}'")]
    InvalidDisplayName(String),
}

/// Markers recognized by the feature scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Emphasis,
    StrongEmphasis,
    InsertOpen,
    InsertClose,
    ConditionalOpen,
    ConditionalClose,
    HiddenOpen,
    HiddenClose,
    RawOpen,
    RawClose,
    LineBreak,
    ParagraphBreak,
    HorizontalRule,
    Quotation,
    Attribution,
    Heading,
}

/// Feature table; paragraph-level markers are only scanned when collecting
/// paragraphs.
pub fn feature_tokenizer(
    collect_paragraphs: bool,
    max_iterations: usize,
) -> Result<Tokenizer<Feature>, TokenizeError> {
    let mut rules = vec![
        TokenRule::emit(r"\*\*", Feature::StrongEmphasis)?,
        TokenRule::emit(r"\*", Feature::Emphasis)?,
        TokenRule::emit(r"\[\+", Feature::InsertOpen)?,
        TokenRule::emit(r"\+\]", Feature::InsertClose)?,
        TokenRule::emit(r"\[\?", Feature::ConditionalOpen)?,
        TokenRule::emit(r"\?\]", Feature::ConditionalClose)?,
        TokenRule::emit(r"\[", Feature::HiddenOpen)?,
        TokenRule::emit(r"\]", Feature::HiddenClose)?,
        TokenRule::emit(r"\{!", Feature::RawOpen)?,
        TokenRule::emit(r"!\}", Feature::RawClose)?,
        TokenRule::emit(r"//[ \t]*(?:\r?\n|\z)", Feature::LineBreak)?,
    ];
    if collect_paragraphs {
        rules.extend([
            TokenRule::emit(r"\r?\n(?:[ \t]*\r?\n)+", Feature::ParagraphBreak)?,
            TokenRule::emit(r"(?m)^[ \t]*---[ \t]*$", Feature::HorizontalRule)?,
            TokenRule::emit(r"(?m)^[ \t]*>>", Feature::Attribution)?,
            TokenRule::emit(r"(?m)^[ \t]*>", Feature::Quotation)?,
            TokenRule::emit(r"(?m)^[ \t]*=", Feature::Heading)?,
        ]);
    }
    Ok(Tokenizer::new(rules).with_max_iterations(max_iterations))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeKind {
    Root,
    Paragraph,
    Quotation,
    Attribution,
    Heading,
    Emphasis,
    StrongEmphasis,
    Hidden,
    Conditional,
    Insert,
    RawScript,
    LineBreak,
    HorizontalRule,
}

impl RangeKind {
    pub fn is_paragraph_like(self) -> bool {
        matches!(self, Self::Paragraph | Self::Quotation | Self::Attribution | Self::Heading)
    }

    /// Leaf kinds carry no children and survive tidying empty.
    pub fn is_single(self) -> bool {
        matches!(self, Self::LineBreak | Self::HorizontalRule)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Root => "document",
            Self::Paragraph => "paragraph",
            Self::Quotation => "quotation",
            Self::Attribution => "attribution",
            Self::Heading => "heading",
            Self::Emphasis => "emphasis",
            Self::StrongEmphasis => "strong emphasis",
            Self::Hidden => "hidden span",
            Self::Conditional => "conditional",
            Self::Insert => "insert",
            Self::RawScript => "raw script",
            Self::LineBreak => "line break",
            Self::HorizontalRule => "horizontal rule",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Range {
    Text(String),
    Node(RangeNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeNode {
    pub kind: RangeKind,
    pub children: Vec<Range>,
}

impl RangeNode {
    pub fn new(kind: RangeKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }

    fn push_text(&mut self, text: &str) {
        match self.children.last_mut() {
            Some(Range::Text(prev)) => prev.push_str(text),
            _ => self.children.push(Range::Text(text.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Text(String),
    Start(RangeKind),
    End(RangeKind),
    Single(RangeKind),
}

#[derive(Debug)]
struct OpenSpan {
    kind: RangeKind,
    offset: usize,
    /// Conditionals read their condition up to the first `:`.
    awaiting_colon: bool,
}

/// Turns the feature stream into range events.
struct BoundaryResolver {
    /// Open emphasis levels, outermost first.
    styles: Vec<RangeKind>,
    open: Vec<OpenSpan>,
    paragraph: RangeKind,
    events: Vec<Event>,
}

/// Resolve what each marker means and produce range events.
pub fn resolve_boundaries(tokens: &[Token<Feature>]) -> Result<Vec<Event>, MarkupError> {
    let mut resolver = BoundaryResolver {
        styles: Vec::new(),
        open: Vec::new(),
        paragraph: RangeKind::Paragraph,
        events: vec![Event::Start(RangeKind::Paragraph)],
    };
    for token in tokens {
        match token.tag {
            None => resolver.text(&token.text),
            Some(feature) => resolver.feature(feature, token)?,
        }
    }
    resolver.finish()
}

impl BoundaryResolver {
    fn inside(&self, kind: RangeKind) -> bool {
        self.open.iter().any(|span| span.kind == kind)
    }

    fn text(&mut self, text: &str) {
        if let Some(top) = self.open.last_mut() {
            if top.awaiting_colon && text.contains(':') {
                top.awaiting_colon = false;
            }
        }
        match self.events.last_mut() {
            Some(Event::Text(prev)) => prev.push_str(text),
            _ => self.events.push(Event::Text(text.to_string())),
        }
    }

    fn open(&mut self, kind: RangeKind, offset: usize) {
        self.open.push(OpenSpan {
            kind,
            offset,
            awaiting_colon: kind == RangeKind::Conditional,
        });
        self.events.push(Event::Start(kind));
    }

    fn close(&mut self, kind: RangeKind) {
        if let Some(pos) = self.open.iter().rposition(|span| span.kind == kind) {
            self.open.remove(pos);
        }
        self.events.push(Event::End(kind));
    }

    /// Emphasis markers are plain text where only logic can appear.
    fn in_logic(&self) -> bool {
        self.open
            .last()
            .is_some_and(|top| top.kind == RangeKind::Insert || top.awaiting_colon)
    }

    fn feature(&mut self, feature: Feature, token: &Token<Feature>) -> Result<(), MarkupError> {
        if self.inside(RangeKind::RawScript) {
            if feature == Feature::RawClose {
                self.close(RangeKind::RawScript);
            } else {
                self.text(&token.text);
            }
            return Ok(());
        }

        match feature {
            Feature::Emphasis | Feature::StrongEmphasis if self.in_logic() => {
                self.text(&token.text)
            }
            Feature::Emphasis => self.toggle(RangeKind::Emphasis),
            Feature::StrongEmphasis => self.toggle(RangeKind::StrongEmphasis),
            Feature::InsertOpen => {
                if self.inside(RangeKind::Insert) {
                    return Err(MarkupError::NestedInsert { offset: token.start });
                }
                self.open(RangeKind::Insert, token.start);
            }
            Feature::HiddenOpen => {
                if self.inside(RangeKind::Insert) {
                    return Err(MarkupError::NestedHidden {
                        offset: token.start,
                        within: RangeKind::Insert.name(),
                    });
                }
                if self.inside(RangeKind::Hidden) {
                    return Err(MarkupError::NestedHidden {
                        offset: token.start,
                        within: RangeKind::Hidden.name(),
                    });
                }
                self.open(RangeKind::Hidden, token.start);
            }
            Feature::ConditionalOpen => self.open(RangeKind::Conditional, token.start),
            Feature::RawOpen => self.open(RangeKind::RawScript, token.start),
            Feature::InsertClose => self.close_or_hidden(RangeKind::Insert, "+", token),
            Feature::ConditionalClose => {
                self.close_or_hidden(RangeKind::Conditional, "?", token)
            }
            Feature::HiddenClose => {
                if self.inside(RangeKind::Hidden) {
                    self.close(RangeKind::Hidden);
                } else {
                    self.text(&token.text);
                }
            }
            Feature::RawClose => self.text(&token.text),
            Feature::LineBreak => self.events.push(Event::Single(RangeKind::LineBreak)),
            Feature::ParagraphBreak => self.new_paragraph(RangeKind::Paragraph, None, token)?,
            Feature::HorizontalRule => self.new_paragraph(
                RangeKind::Paragraph,
                Some(RangeKind::HorizontalRule),
                token,
            )?,
            Feature::Quotation => self.continue_or_start(RangeKind::Quotation, token)?,
            Feature::Attribution => self.continue_or_start(RangeKind::Attribution, token)?,
            Feature::Heading => self.continue_or_start(RangeKind::Heading, token)?,
        }
        Ok(())
    }

    fn toggle(&mut self, kind: RangeKind) {
        if let Some(pos) = self.styles.iter().rposition(|style| *style == kind) {
            self.styles.remove(pos);
            self.events.push(Event::End(kind));
        } else {
            self.styles.push(kind);
            self.events.push(Event::Start(kind));
        }
    }

    fn close_styles(&mut self) {
        for style in self.styles.iter().rev() {
            self.events.push(Event::End(*style));
        }
    }

    /// `+]` and `?]` close their own span, or else a hidden span with the
    /// first character kept as text.
    fn close_or_hidden(&mut self, kind: RangeKind, prefix: &str, token: &Token<Feature>) {
        if self.inside(kind) {
            self.close(kind);
        } else if self.inside(RangeKind::Hidden) {
            self.text(prefix);
            self.close(RangeKind::Hidden);
        } else {
            self.text(&token.text);
        }
    }

    /// End the current paragraph-type span, optionally emit a leaf between
    /// the two, and start `kind`. Open emphasis is carried across.
    fn new_paragraph(
        &mut self,
        kind: RangeKind,
        between: Option<RangeKind>,
        token: &Token<Feature>,
    ) -> Result<(), MarkupError> {
        if let Some(span) = self.open.first() {
            return Err(MarkupError::UnclosedAtBreak {
                kind: span.kind.name(),
                opened: span.offset,
                offset: token.start,
            });
        }
        self.close_styles();
        self.events.push(Event::End(self.paragraph));
        if let Some(leaf) = between {
            self.events.push(Event::Single(leaf));
        }
        self.events.push(Event::Start(kind));
        self.events.extend(self.styles.iter().map(|style| Event::Start(*style)));
        self.paragraph = kind;
        Ok(())
    }

    fn continue_or_start(
        &mut self,
        kind: RangeKind,
        token: &Token<Feature>,
    ) -> Result<(), MarkupError> {
        if self.paragraph != kind {
            self.new_paragraph(kind, None, token)?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<Event>, MarkupError> {
        if let Some(span) = self.open.first() {
            return Err(MarkupError::Unclosed {
                kind: span.kind.name(),
                offset: span.offset,
            });
        }
        self.close_styles();
        self.events.push(Event::End(self.paragraph));
        Ok(self.events)
    }
}

/// Fold events into a tree under a `Root` node.
///
/// An end event closes the innermost node of its kind; nodes opened inside
/// it and still open are closed with it and reopened afterwards.
pub fn build_ranges(events: Vec<Event>, max_depth: usize) -> Result<RangeNode, MarkupError> {
    let mut stack = vec![RangeNode::new(RangeKind::Root)];
    for event in events {
        match event {
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    top.push_text(&text);
                }
            }
            Event::Start(kind) => {
                if stack.len() > max_depth {
                    return Err(MarkupError::TooDeep { limit: max_depth });
                }
                stack.push(RangeNode::new(kind));
            }
            Event::End(kind) => end_range(&mut stack, kind),
            Event::Single(kind) => {
                if let Some(top) = stack.last_mut() {
                    top.children.push(Range::Node(RangeNode::new(kind)));
                }
            }
        }
    }
    while stack.len() > 1 {
        pop_into_parent(&mut stack);
    }
    Ok(stack.pop().unwrap_or_else(|| RangeNode::new(RangeKind::Root)))
}

fn pop_into_parent(stack: &mut Vec<RangeNode>) -> Option<RangeKind> {
    if stack.len() < 2 {
        return None;
    }
    let node = stack.pop()?;
    let kind = node.kind;
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Range::Node(node));
    }
    Some(kind)
}

fn end_range(stack: &mut Vec<RangeNode>, kind: RangeKind) {
    if !stack.iter().skip(1).any(|node| node.kind == kind) {
        return;
    }
    let mut reopened = Vec::new();
    while let Some(closed) = pop_into_parent(stack) {
        if closed == kind {
            break;
        }
        reopened.push(closed);
    }
    if !reopened.is_empty() {
        warn!(
            closing = kind.name(),
            reopened = reopened.len(),
            "markup closed out of order; reopening inner spans"
        );
    }
    for kind in reopened.into_iter().rev() {
        stack.push(RangeNode::new(kind));
    }
}

/// Collapse every whitespace run to a single space.
pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

/// Post-order cleanup of a built tree.
///
/// Merges adjacent text, normalizes whitespace (except in raw script),
/// trims paragraph-like nodes and text before line breaks, and drops nodes
/// left empty. Returns `None` when the node itself is dropped.
pub fn tidy(node: RangeNode) -> Option<RangeNode> {
    let kind = node.kind;
    if kind.is_single() {
        return Some(RangeNode::new(kind));
    }
    if kind == RangeKind::RawScript {
        let source: String = node
            .children
            .into_iter()
            .filter_map(|child| match child {
                Range::Text(text) => Some(text),
                Range::Node(_) => None,
            })
            .collect();
        if source.trim().is_empty() {
            return None;
        }
        return Some(RangeNode {
            kind,
            children: vec![Range::Text(source)],
        });
    }

    let mut children: Vec<Range> = Vec::with_capacity(node.children.len());
    for child in node.children {
        match child {
            Range::Text(text) => match children.last_mut() {
                Some(Range::Text(prev)) => prev.push_str(&text),
                _ => children.push(Range::Text(text)),
            },
            Range::Node(inner) => {
                if let Some(inner) = tidy(inner) {
                    children.push(Range::Node(inner));
                }
            }
        }
    }

    for child in children.iter_mut() {
        if let Range::Text(text) = child {
            *text = collapse_whitespace(text);
        }
    }
    for i in 1..children.len() {
        if matches!(&children[i], Range::Node(n) if n.kind == RangeKind::LineBreak) {
            if let Range::Text(text) = &mut children[i - 1] {
                text.truncate(text.trim_end().len());
            }
        }
    }
    if kind.is_paragraph_like() {
        if let Some(Range::Text(text)) = children.first_mut() {
            *text = text.trim_start().to_string();
        }
        if let Some(Range::Text(text)) = children.last_mut() {
            text.truncate(text.trim_end().len());
        }
    }
    children.retain(|child| !matches!(child, Range::Text(text) if text.is_empty()));

    if children.is_empty() && kind != RangeKind::Root {
        return None;
    }
    Some(RangeNode { kind, children })
}
