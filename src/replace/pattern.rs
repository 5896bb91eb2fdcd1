//! Wildcard name patterns and replacement templates.
//!
//! In a pattern `?` matches one character other than `/`, `*` matches any
//! run of characters within one segment and `**` matches anything,
//! separators included. Every wildcard captures what it matched, numbered
//! from 1. A template refers to captures with `<n>` placeholders or with
//! its own wildcards, the k-th of which takes the k-th capture.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("placeholder <{index}> in \"{template}\" refers to a missing capture ({captures} available)")]
    PlaceholderOutOfRange {
        template: String,
        index: usize,
        captures: usize,
    },
    #[error("unterminated placeholder in \"{template}\"")]
    UnterminatedPlaceholder { template: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Literal(Vec<char>),
    AnyChar,
    Segment,
    Any,
}

fn tokenize_wildcards(pattern: &str) -> Vec<Token> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::new();
    let mut literal = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let token = match chars[i] {
            '?' => Token::AnyChar,
            '*' if chars.get(i + 1) == Some(&'*') => {
                i += 1;
                Token::Any
            }
            '*' => Token::Segment,
            c => {
                literal.push(c);
                i += 1;
                continue;
            }
        };
        if !literal.is_empty() {
            tokens.push(Token::Literal(std::mem::take(&mut literal)));
        }
        tokens.push(token);
        i += 1;
    }
    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    tokens
}

/// A compiled matching pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatternMatcher {
    pattern: String,
    tokens: Vec<Token>,
}

impl PatternMatcher {
    pub fn new(pattern: &str) -> Self {
        PatternMatcher {
            pattern: pattern.to_string(),
            tokens: tokenize_wildcards(pattern),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn capture_count(&self) -> usize {
        self.tokens
            .iter()
            .filter(|t| !matches!(t, Token::Literal(_)))
            .count()
    }

    pub fn has_wildcards(&self) -> bool {
        self.capture_count() > 0
    }

    pub fn matches(&self, name: &str) -> bool {
        self.captures(name).is_some()
    }

    /// The substrings captured by each wildcard, if `name` matches.
    pub fn captures(&self, name: &str) -> Option<Vec<String>> {
        let chars: Vec<char> = name.chars().collect();
        let mut spans = Vec::with_capacity(self.capture_count());
        if match_tokens(&self.tokens, &chars, 0, &mut spans) {
            Some(
                spans
                    .into_iter()
                    .map(|(start, end)| chars[start..end].iter().collect())
                    .collect(),
            )
        } else {
            None
        }
    }
}

fn match_tokens(
    tokens: &[Token],
    name: &[char],
    pos: usize,
    spans: &mut Vec<(usize, usize)>,
) -> bool {
    let Some((token, rest)) = tokens.split_first() else {
        return pos == name.len();
    };
    match token {
        Token::Literal(literal) => {
            name[pos..].starts_with(literal) && match_tokens(rest, name, pos + literal.len(), spans)
        }
        Token::AnyChar => {
            if pos < name.len() && name[pos] != '/' {
                spans.push((pos, pos + 1));
                if match_tokens(rest, name, pos + 1, spans) {
                    return true;
                }
                spans.pop();
            }
            false
        }
        Token::Segment | Token::Any => {
            let mut end = pos;
            loop {
                spans.push((pos, end));
                if match_tokens(rest, name, end, spans) {
                    return true;
                }
                spans.pop();
                if end == name.len() || (*token == Token::Segment && name[end] == '/') {
                    return false;
                }
                end += 1;
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum TemplatePart {
    Literal(String),
    /// 0-based capture index.
    Capture(usize),
}

/// A replacement template compiled against the matcher whose captures it uses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    source: String,
    parts: Vec<TemplatePart>,
}

impl Template {
    pub fn compile(template: &str, matcher: &PatternMatcher) -> Result<Template, PatternError> {
        let available = matcher.capture_count();
        let chars: Vec<char> = template.chars().collect();
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut next_wildcard = 0;
        let capture = |index: usize, literal: &mut String, parts: &mut Vec<TemplatePart>| {
            if index >= available {
                return Err(PatternError::PlaceholderOutOfRange {
                    template: template.to_string(),
                    index: index + 1,
                    captures: available,
                });
            }
            if !literal.is_empty() {
                parts.push(TemplatePart::Literal(std::mem::take(literal)));
            }
            parts.push(TemplatePart::Capture(index));
            Ok(())
        };

        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '<' if chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()) => {
                    let digits: String = chars[i + 1..]
                        .iter()
                        .take_while(|c| c.is_ascii_digit())
                        .collect();
                    let close = i + 1 + digits.len();
                    if chars.get(close) != Some(&'>') {
                        return Err(PatternError::UnterminatedPlaceholder {
                            template: template.to_string(),
                        });
                    }
                    let number: usize = digits.parse().unwrap_or(0);
                    if number == 0 {
                        return Err(PatternError::PlaceholderOutOfRange {
                            template: template.to_string(),
                            index: 0,
                            captures: available,
                        });
                    }
                    capture(number - 1, &mut literal, &mut parts)?;
                    i = close + 1;
                }
                '?' | '*' => {
                    if chars[i] == '*' && chars.get(i + 1) == Some(&'*') {
                        i += 1;
                    }
                    capture(next_wildcard, &mut literal, &mut parts)?;
                    next_wildcard += 1;
                    i += 1;
                }
                c => {
                    literal.push(c);
                    i += 1;
                }
            }
        }
        if !literal.is_empty() {
            parts.push(TemplatePart::Literal(literal));
        }
        Ok(Template {
            source: template.to_string(),
            parts,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// True when the template has no placeholders or wildcards.
    pub fn is_concrete(&self) -> bool {
        self.parts
            .iter()
            .all(|p| matches!(p, TemplatePart::Literal(_)))
    }

    /// Fill the template from the captures of its matcher.
    pub fn substitute(&self, captures: &[String]) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                TemplatePart::Literal(text) => out.push_str(text),
                TemplatePart::Capture(index) => {
                    if let Some(captured) = captures.get(*index) {
                        out.push_str(captured);
                    }
                }
            }
        }
        out
    }
}
