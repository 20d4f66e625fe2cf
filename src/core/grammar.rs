/// Stochastic template grammar: parsing, loading, and expansion.
///
/// Used by the offline storyteller to produce tile text, story context and
/// end-of-game narratives.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Nested rule references deeper than this are treated as a cycle.
pub const MAX_EXPANSION_DEPTH: usize = 16;

#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("template parse error: {0}")]
    TemplateParse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("rule not found: {0}")]
    RuleNotFound(String),
    #[error("no eligible alternative for rule: {0}")]
    NoEligibleAlternative(String),
    #[error("unbound value: ${0}")]
    UnboundValue(String),
    #[error("expansion exceeded depth {0} (cyclic rules?)")]
    TooDeep(usize),
}

/// A segment of a parsed template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemplateSegment {
    /// Literal text, emitted as-is.
    Literal(String),
    /// Reference to another grammar rule: `{rule_name}`.
    RuleRef(String),
    /// A value supplied by the caller: `{$name}`.
    Binding(String),
}

/// A parsed template: a sequence of segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub segments: Vec<TemplateSegment>,
}

impl Template {
    /// Parse a template string into a sequence of segments.
    ///
    /// Syntax:
    /// - `{rule_name}` → `RuleRef`
    /// - `{$name}` → `Binding`
    /// - `{{` / `}}` → literal braces
    /// - Everything else → `Literal`
    pub fn parse(input: &str) -> Result<Template, GrammarError> {
        let mut segments = Vec::new();
        let mut literal_buf = String::new();
        let mut chars = input.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal_buf.push('{');
                }
                '{' => {
                    if !literal_buf.is_empty() {
                        segments.push(TemplateSegment::Literal(std::mem::take(&mut literal_buf)));
                    }
                    let mut content = String::new();
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        match inner {
                            '{' => {
                                return Err(GrammarError::TemplateParse(
                                    "nested braces are not allowed".to_string(),
                                ))
                            }
                            '}' => {
                                closed = true;
                                break;
                            }
                            other => content.push(other),
                        }
                    }
                    if !closed {
                        return Err(GrammarError::TemplateParse("unclosed brace".to_string()));
                    }
                    segments.push(Self::parse_segment(&content)?);
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal_buf.push('}');
                }
                '}' => {
                    return Err(GrammarError::TemplateParse(
                        "unmatched closing brace".to_string(),
                    ))
                }
                other => literal_buf.push(other),
            }
        }

        if !literal_buf.is_empty() {
            segments.push(TemplateSegment::Literal(literal_buf));
        }

        Ok(Template { segments })
    }

    fn parse_segment(content: &str) -> Result<TemplateSegment, GrammarError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(GrammarError::TemplateParse("empty braces".to_string()));
        }
        if let Some(name) = content.strip_prefix('$') {
            if name.is_empty() {
                return Err(GrammarError::TemplateParse(
                    "empty binding name".to_string(),
                ));
            }
            return Ok(TemplateSegment::Binding(name.to_string()));
        }
        Ok(TemplateSegment::RuleRef(content.to_string()))
    }
}

/// A weighted text alternative within a grammar rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alternative {
    pub weight: u32,
    pub requires: Vec<String>,
    pub excludes: Vec<String>,
    pub template: Template,
}

/// A single grammar rule with tag preconditions and weighted alternatives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrammarRule {
    pub name: String,
    pub requires: Vec<String>,
    pub excludes: Vec<String>,
    pub alternatives: Vec<Alternative>,
}

fn tags_match(requires: &[String], excludes: &[String], tags: &FxHashSet<String>) -> bool {
    requires.iter().all(|t| tags.contains(t)) && !excludes.iter().any(|t| tags.contains(t))
}

impl GrammarRule {
    pub fn is_available(&self, tags: &FxHashSet<String>) -> bool {
        tags_match(&self.requires, &self.excludes, tags)
    }
}

/// Tags and bound values in effect during one expansion.
#[derive(Debug, Clone, Default)]
pub struct ExpansionContext {
    pub tags: FxHashSet<String>,
    pub bindings: HashMap<String, String>,
}

impl ExpansionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn bind(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.bindings.insert(name.into(), value.into());
        self
    }
}

/// A set of named grammar rules.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GrammarSet {
    pub rules: HashMap<String, GrammarRule>,
}

// The RON format is flatter than the internal types.

#[derive(Debug, Deserialize)]
struct RonAlternative {
    weight: u32,
    #[serde(default)]
    requires: Vec<String>,
    #[serde(default)]
    excludes: Vec<String>,
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Rule")]
struct RonRule {
    #[serde(default)]
    requires: Vec<String>,
    #[serde(default)]
    excludes: Vec<String>,
    alternatives: Vec<RonAlternative>,
}

impl GrammarSet {
    /// Load a grammar set from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<GrammarSet, GrammarError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a grammar set from a RON string.
    pub fn parse_ron(input: &str) -> Result<GrammarSet, GrammarError> {
        let raw: HashMap<String, RonRule> = ron::from_str(input)?;
        let mut rules = HashMap::new();

        for (name, ron_rule) in raw {
            let mut alternatives = Vec::with_capacity(ron_rule.alternatives.len());
            for alt in ron_rule.alternatives {
                alternatives.push(Alternative {
                    weight: alt.weight,
                    requires: alt.requires,
                    excludes: alt.excludes,
                    template: Template::parse(&alt.text)?,
                });
            }
            rules.insert(
                name.clone(),
                GrammarRule {
                    name,
                    requires: ron_rule.requires,
                    excludes: ron_rule.excludes,
                    alternatives,
                },
            );
        }

        Ok(GrammarSet { rules })
    }

    /// Merge another grammar set into this one. Rules from `other`
    /// override rules in `self` with the same name.
    pub fn merge(&mut self, other: GrammarSet) {
        for (name, rule) in other.rules {
            self.rules.insert(name, rule);
        }
    }

    /// Expand `rule_name` into text.
    ///
    /// The entry rule must exist and be available under `ctx.tags`. Nested
    /// references to rules whose own tag filters fail expand to nothing.
    pub fn expand<R: Rng + ?Sized>(
        &self,
        rule_name: &str,
        ctx: &ExpansionContext,
        rng: &mut R,
    ) -> Result<String, GrammarError> {
        let rule = self
            .rules
            .get(rule_name)
            .ok_or_else(|| GrammarError::RuleNotFound(rule_name.to_string()))?;
        if !rule.is_available(&ctx.tags) {
            return Err(GrammarError::NoEligibleAlternative(rule_name.to_string()));
        }
        let mut out = String::new();
        self.expand_rule(rule, ctx, rng, 0, &mut out)?;
        Ok(tidy(&out))
    }

    fn expand_rule<R: Rng + ?Sized>(
        &self,
        rule: &GrammarRule,
        ctx: &ExpansionContext,
        rng: &mut R,
        depth: usize,
        out: &mut String,
    ) -> Result<(), GrammarError> {
        if depth >= MAX_EXPANSION_DEPTH {
            return Err(GrammarError::TooDeep(MAX_EXPANSION_DEPTH));
        }

        let eligible: Vec<&Alternative> = rule
            .alternatives
            .iter()
            .filter(|alt| alt.weight > 0 && tags_match(&alt.requires, &alt.excludes, &ctx.tags))
            .collect();
        let dist = WeightedIndex::new(eligible.iter().map(|alt| alt.weight))
            .map_err(|_| GrammarError::NoEligibleAlternative(rule.name.clone()))?;
        let chosen = eligible[dist.sample(rng)];

        for segment in &chosen.template.segments {
            match segment {
                TemplateSegment::Literal(text) => out.push_str(text),
                TemplateSegment::Binding(name) => {
                    let value = ctx
                        .bindings
                        .get(name)
                        .ok_or_else(|| GrammarError::UnboundValue(name.clone()))?;
                    out.push_str(value);
                }
                TemplateSegment::RuleRef(name) => {
                    let nested = self
                        .rules
                        .get(name)
                        .ok_or_else(|| GrammarError::RuleNotFound(name.clone()))?;
                    if nested.is_available(&ctx.tags) {
                        self.expand_rule(nested, ctx, rng, depth + 1, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Rule references that point at rules missing from this set.
    pub fn dangling_references(&self) -> Vec<(String, String)> {
        let mut missing = Vec::new();
        for rule in self.rules.values() {
            for alt in &rule.alternatives {
                for segment in &alt.template.segments {
                    if let TemplateSegment::RuleRef(target) = segment {
                        if !self.rules.contains_key(target) {
                            missing.push((rule.name.clone(), target.clone()));
                        }
                    }
                }
            }
        }
        missing.sort();
        missing
    }
}

/// Collapse the double spaces left behind by empty nested expansions.
fn tidy(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
