//! Longest-match, priority-ordered tokenizer over caller-supplied rule tables.
//!
//! From the current offset, the rule whose match starts earliest wins; ties
//! go to the longest match, then to the earlier rule. Text no rule claims is
//! either emitted as an untagged token or reported as an error, so the
//! produced tokens always tile the input exactly.

use regex::Regex;
use thiserror::Error;

/// Upper bound on scan steps when no limit is configured.
pub const DEFAULT_MAX_ITERATIONS: usize = 100_000;

#[derive(Debug, Error)]
pub enum TokenizeError {
    #[error("invalid token pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("unrecognized input at offset {offset}: '{text}'")]
    Unrecognized { offset: usize, text: String },
    #[error("tokenizer made no progress within {0} iterations")]
    Runaway(usize),
}

/// What happens to text matched by a rule.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenAction<T> {
    /// Append a token with this tag.
    Emit(T),
    /// Consume the text without producing a token (whitespace).
    Discard,
    /// Keep the text as an untagged placeholder token.
    Unrecognized,
}

#[derive(Debug, Clone)]
pub struct TokenRule<T> {
    pattern: Regex,
    action: TokenAction<T>,
}

impl<T> TokenRule<T> {
    pub fn new(pattern: &str, action: TokenAction<T>) -> Result<Self, TokenizeError> {
        let pattern = Regex::new(pattern).map_err(|source| TokenizeError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { pattern, action })
    }

    pub fn emit(pattern: &str, tag: T) -> Result<Self, TokenizeError> {
        Self::new(pattern, TokenAction::Emit(tag))
    }

    pub fn discard(pattern: &str) -> Result<Self, TokenizeError> {
        Self::new(pattern, TokenAction::Discard)
    }

    pub fn unrecognized(pattern: &str) -> Result<Self, TokenizeError> {
        Self::new(pattern, TokenAction::Unrecognized)
    }
}

/// A tagged slice of the input. `tag` is `None` for unrecognized text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<T> {
    pub tag: Option<T>,
    pub start: usize,
    pub text: String,
}

impl<T> Token<T> {
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }
}

#[derive(Debug, Clone)]
pub struct Tokenizer<T> {
    rules: Vec<TokenRule<T>>,
    max_iterations: usize,
}

impl<T: Clone> Tokenizer<T> {
    /// Rules are listed in priority order.
    pub fn new(rules: Vec<TokenRule<T>>) -> Self {
        Self {
            rules,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Split `input` into tokens.
    ///
    /// With `emit_unrecognized`, spans no rule matches become untagged tokens;
    /// otherwise the first such span is an error.
    pub fn tokenize(
        &self,
        input: &str,
        emit_unrecognized: bool,
    ) -> Result<Vec<Token<T>>, TokenizeError> {
        let mut tokens = Vec::new();
        let mut pos = 0;
        let mut iterations = 0;

        while pos < input.len() {
            iterations += 1;
            if iterations > self.max_iterations {
                return Err(TokenizeError::Runaway(self.max_iterations));
            }

            let Some((start, end, rule)) = self.best_match(input, pos) else {
                push_unrecognized(&mut tokens, input, pos, input.len(), emit_unrecognized)?;
                break;
            };

            if start > pos {
                push_unrecognized(&mut tokens, input, pos, start, emit_unrecognized)?;
            }

            match &rule.action {
                TokenAction::Emit(tag) => tokens.push(Token {
                    tag: Some(tag.clone()),
                    start,
                    text: input[start..end].to_string(),
                }),
                TokenAction::Discard => {}
                TokenAction::Unrecognized => tokens.push(Token {
                    tag: None,
                    start,
                    text: input[start..end].to_string(),
                }),
            }
            pos = end;
        }

        Ok(tokens)
    }

    fn best_match(&self, input: &str, pos: usize) -> Option<(usize, usize, &TokenRule<T>)> {
        let mut best: Option<(usize, usize, &TokenRule<T>)> = None;
        for rule in &self.rules {
            let Some(m) = rule.pattern.find_at(input, pos) else {
                continue;
            };
            let better = match best {
                None => true,
                Some((start, end, _)) => {
                    m.start() < start || (m.start() == start && m.len() > end - start)
                }
            };
            if better {
                best = Some((m.start(), m.end(), rule));
            }
        }
        best
    }
}

fn push_unrecognized<T>(
    tokens: &mut Vec<Token<T>>,
    input: &str,
    from: usize,
    to: usize,
    emit: bool,
) -> Result<(), TokenizeError> {
    if !emit {
        return Err(TokenizeError::Unrecognized {
            offset: from,
            text: input[from..to].to_string(),
        });
    }
    tokens.push(Token {
        tag: None,
        start: from,
        text: input[from..to].to_string(),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Tag {
        And,
        Name,
        Number,
    }

    fn tokenizer() -> Tokenizer<Tag> {
        Tokenizer::new(vec![
            TokenRule::emit("(?i)and", Tag::And).unwrap(),
            TokenRule::emit("[A-Za-z_][A-Za-z0-9_]*", Tag::Name).unwrap(),
            TokenRule::emit("[0-9]+", Tag::Number).unwrap(),
            TokenRule::discard(r"\s+").unwrap(),
        ])
    }

    #[test]
    fn longest_match_beats_keyword() {
        let tokens = tokenizer().tokenize("andy", false).unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].tag, Some(Tag::Name));
        assert_eq!(tokens[0].len(), 4);
    }

    #[test]
    fn earlier_rule_breaks_equal_length_tie() {
        let tokens = tokenizer().tokenize("AND", false).unwrap();
        assert_eq!(tokens[0].tag, Some(Tag::And));
    }

    #[test]
    fn whitespace_is_discarded() {
        let tokens = tokenizer().tokenize("a  12", false).unwrap();
        let tags: Vec<_> = tokens.iter().map(|t| t.tag).collect();
        assert_eq!(tags, vec![Some(Tag::Name), Some(Tag::Number)]);
        assert_eq!(tokens[1].start, 3);
    }

    #[test]
    fn unrecognized_span_is_an_error_by_default() {
        let err = tokenizer().tokenize("a $ b", false).unwrap_err();
        assert!(matches!(err, TokenizeError::Unrecognized { offset: 2, ref text } if text == "$"));
    }

    #[test]
    fn unrecognized_spans_become_placeholders() {
        let tokens = tokenizer().tokenize("a$$b!", true).unwrap();
        let texts: Vec<_> = tokens.iter().map(|t| (t.tag, t.text.as_str())).collect();
        assert_eq!(
            texts,
            vec![
                (Some(Tag::Name), "a"),
                (None, "$$"),
                (Some(Tag::Name), "b"),
                (None, "!"),
            ]
        );
    }

    #[test]
    fn tokens_tile_input_without_discards() {
        let t = Tokenizer::new(vec![TokenRule::emit("[0-9]+", Tag::Number).unwrap()]);
        let input = "ab12cd345";
        let tokens = t.tokenize(input, true).unwrap();
        let joined: String = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(joined, input);
        for pair in tokens.windows(2) {
            assert_eq!(pair[0].end(), pair[1].start);
        }
    }

    #[test]
    fn zero_width_rule_hits_iteration_cap() {
        let t = Tokenizer::new(vec![TokenRule::emit("x*", Tag::Name).unwrap()])
            .with_max_iterations(50);
        let err = t.tokenize("yyy", true).unwrap_err();
        assert!(matches!(err, TokenizeError::Runaway(50)));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        assert!(matches!(
            TokenRule::emit("(", Tag::Name),
            Err(TokenizeError::InvalidPattern { .. })
        ));
    }
}
