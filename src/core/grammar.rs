/// Tracery grammar runtime: template parsing, rule loading, and expansion.

use rand::rngs::StdRng;
use rand::Rng;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::core::modifiers::{Modifier, ModifierSet};

/// Expansion nested deeper than this fails instead of recursing forever.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("template parse error: {0}")]
    TemplateParse(String),
    #[error("rule not found: {0}")]
    RuleNotFound(String),
    #[error("rule '{0}' has no alternatives")]
    EmptyRule(String),
    #[error("unknown modifier: {0}")]
    UnknownModifier(String),
    #[error("cannot pop '{0}': nothing was pushed")]
    PopWithoutPush(String),
    #[error("expansion nested deeper than {0} levels")]
    RecursionLimit(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON deserialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// A segment of a parsed template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateSegment {
    /// Literal text, emitted as-is.
    Literal(String),
    /// A symbol expansion: `#symbol.mod#`, optionally led by actions.
    Tag(Tag),
    /// A bare action: `[key:rule]` or `[key:POP]`. Emits nothing.
    Action(Action),
}

/// The contents of a `#...#` tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    /// Actions run before the symbol is expanded. Pushes made here are
    /// popped once the tag is done.
    pub actions: Vec<Action>,
    /// Empty when the tag only carries actions.
    pub symbol: String,
    pub modifiers: Vec<ModifierCall>,
}

/// A modifier reference inside a tag, e.g. `.replace(a,b)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModifierCall {
    pub name: String,
    pub params: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Expand each rule now and push the results as the new top of `key`.
    Push { key: String, rules: Vec<Template> },
    /// Drop the most recent push of `key`.
    Pop { key: String },
}

/// A parsed template, a sequence of segments.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    pub segments: Vec<TemplateSegment>,
}

impl Template {
    /// Parse a template string into a sequence of segments.
    ///
    /// Syntax:
    /// - `#symbol#` / `#symbol.mod1.mod2#` / `#symbol.replace(a,b)#` → `Tag`
    /// - `#[key:rule]symbol#` → `Tag` with a scoped push
    /// - `[key:rule]` / `[key:POP]` → `Action`
    /// - `\x` → literal `x`
    /// - Everything else → `Literal`, including a `#` with no closing
    ///   partner and a `]` with no opening one
    pub fn parse(input: &str) -> Result<Template, GrammarError> {
        let chars: Vec<char> = input.chars().collect();
        let len = chars.len();
        let mut segments = Vec::new();
        let mut literal_buf = String::new();
        let mut i = 0;

        while i < len {
            match chars[i] {
                '\\' => match chars.get(i + 1) {
                    Some(&escaped) => {
                        literal_buf.push(escaped);
                        i += 2;
                    }
                    None => {
                        literal_buf.push('\\');
                        i += 1;
                    }
                },
                '#' => match find_tag_end(&chars, i + 1) {
                    Some(end) => {
                        flush_literal(&mut segments, &mut literal_buf);
                        let content: String = chars[i + 1..end].iter().collect();
                        segments.push(TemplateSegment::Tag(Tag::parse(&content)?));
                        i = end + 1;
                    }
                    // A `#` with no partner is text ("We're #1").
                    None => {
                        literal_buf.push('#');
                        i += 1;
                    }
                },
                '[' => {
                    flush_literal(&mut segments, &mut literal_buf);
                    let end = find_bracket_end(&chars, i)?;
                    let content: String = chars[i + 1..end].iter().collect();
                    segments.push(TemplateSegment::Action(Action::parse(&content)?));
                    i = end + 1;
                }
                c => {
                    literal_buf.push(c);
                    i += 1;
                }
            }
        }

        flush_literal(&mut segments, &mut literal_buf);
        Ok(Template { segments })
    }

    /// A template that always produces `text`.
    pub fn literal(text: impl Into<String>) -> Template {
        Template {
            segments: vec![TemplateSegment::Literal(text.into())],
        }
    }

    /// True if the template contains no tags or actions.
    pub fn is_plain(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, TemplateSegment::Literal(_)))
    }

    /// Visit every tag in this template, including tags nested in the
    /// rules of push actions.
    pub fn visit_tags<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&'a Tag),
    {
        for segment in &self.segments {
            match segment {
                TemplateSegment::Literal(_) => {}
                TemplateSegment::Tag(tag) => {
                    for action in &tag.actions {
                        action.visit_tags(f);
                    }
                    f(tag);
                }
                TemplateSegment::Action(action) => action.visit_tags(f),
            }
        }
    }

    /// Keys pushed by actions anywhere in this template.
    pub fn pushed_keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        for segment in &self.segments {
            let actions: &[Action] = match segment {
                TemplateSegment::Literal(_) => &[],
                TemplateSegment::Tag(tag) => &tag.actions,
                TemplateSegment::Action(action) => std::slice::from_ref(action),
            };
            for action in actions {
                if let Action::Push { key, rules } = action {
                    keys.push(key.as_str());
                    for rule in rules {
                        keys.extend(rule.pushed_keys());
                    }
                }
            }
        }
        keys
    }
}

impl Tag {
    fn parse(content: &str) -> Result<Tag, GrammarError> {
        let chars: Vec<char> = content.chars().collect();
        let mut actions = Vec::new();
        let mut i = 0;

        while i < chars.len() && chars[i] == '[' {
            let end = find_bracket_end(&chars, i)?;
            let action: String = chars[i + 1..end].iter().collect();
            actions.push(Action::parse(&action)?);
            i = end + 1;
        }

        let rest: String = chars[i..].iter().collect();
        if has_unescaped(&rest, &['[', ']']) {
            return Err(GrammarError::TemplateParse(format!(
                "actions must precede the symbol in tag '#{}#'",
                content
            )));
        }
        if rest.is_empty() {
            if actions.is_empty() {
                return Err(GrammarError::TemplateParse("empty tag".to_string()));
            }
            return Ok(Tag {
                actions,
                symbol: String::new(),
                modifiers: Vec::new(),
            });
        }

        let mut parts = split_top_level(&rest, '.').into_iter();
        let symbol = unescape(&parts.next().unwrap_or_default());
        if symbol.is_empty() {
            return Err(GrammarError::TemplateParse(format!(
                "missing symbol name in tag '#{}#'",
                content
            )));
        }
        let modifiers = parts
            .map(|raw| ModifierCall::parse(&raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Tag {
            actions,
            symbol,
            modifiers,
        })
    }
}

impl ModifierCall {
    fn parse(raw: &str) -> Result<ModifierCall, GrammarError> {
        let (name, params) = match raw.find('(') {
            None => (raw, Vec::new()),
            Some(open) => {
                let inner = raw[open + 1..].strip_suffix(')').ok_or_else(|| {
                    GrammarError::TemplateParse(format!(
                        "unclosed parameter list in modifier '{}'",
                        raw
                    ))
                })?;
                let params = if inner.is_empty() {
                    Vec::new()
                } else {
                    split_top_level(inner, ',')
                        .iter()
                        .map(|param| unescape(param))
                        .collect()
                };
                (&raw[..open], params)
            }
        };
        if name.is_empty() {
            return Err(GrammarError::TemplateParse(
                "empty modifier name".to_string(),
            ));
        }
        Ok(ModifierCall {
            name: name.to_string(),
            params,
        })
    }
}

impl Action {
    fn parse(content: &str) -> Result<Action, GrammarError> {
        let Some((key, value)) = content.split_once(':') else {
            return Err(GrammarError::TemplateParse(format!(
                "action '[{}]' must be [key:rule] or [key:POP]",
                content
            )));
        };
        if key.is_empty() {
            return Err(GrammarError::TemplateParse(format!(
                "action '[{}]' has an empty key",
                content
            )));
        }
        if value == "POP" {
            return Ok(Action::Pop {
                key: key.to_string(),
            });
        }
        let rules = split_top_level(value, ',')
            .iter()
            .map(|rule| Template::parse(rule))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Action::Push {
            key: key.to_string(),
            rules,
        })
    }

    pub fn key(&self) -> &str {
        match self {
            Action::Push { key, .. } | Action::Pop { key } => key,
        }
    }

    fn visit_tags<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&'a Tag),
    {
        if let Action::Push { rules, .. } = self {
            for rule in rules {
                rule.visit_tags(f);
            }
        }
    }
}

fn flush_literal(segments: &mut Vec<TemplateSegment>, literal_buf: &mut String) {
    if !literal_buf.is_empty() {
        segments.push(TemplateSegment::Literal(std::mem::take(literal_buf)));
    }
}

/// Index of the `#` closing a tag that opened just before `start`.
/// `#` inside brackets belongs to a nested action and does not close.
fn find_tag_end(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                i += 2;
                continue;
            }
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '#' if depth == 0 => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// True if `input` contains any of `targets` outside a `\x` escape.
fn has_unescaped(input: &str, targets: &[char]) -> bool {
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            chars.next();
        } else if targets.contains(&c) {
            return true;
        }
    }
    false
}

/// Drop the backslash from each `\x` escape.
fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push(chars.next().unwrap_or('\\')),
            c => out.push(c),
        }
    }
    out
}

/// Index of the `]` matching the `[` at `open`.
fn find_bracket_end(chars: &[char], open: usize) -> Result<usize, GrammarError> {
    let mut depth = 0usize;
    let mut i = open;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                i += 2;
                continue;
            }
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    Err(GrammarError::TemplateParse("unclosed bracket".to_string()))
}

/// Split on `sep`, ignoring separators nested in tags, brackets, or
/// parentheses. Escapes are kept for the next parse.
fn split_top_level(input: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut in_tag = false;
    let mut escaped = false;

    for c in input.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => {
                escaped = true;
                current.push(c);
            }
            '[' | '(' => {
                depth += 1;
                current.push(c);
            }
            ']' | ')' => {
                depth -= 1;
                current.push(c);
            }
            '#' if depth == 0 => {
                in_tag = !in_tag;
                current.push(c);
            }
            c if c == sep && depth == 0 && !in_tag => {
                parts.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// A single grammar rule: a symbol and its candidate expansions.
#[derive(Debug, Clone)]
pub struct GrammarRule {
    pub name: String,
    pub alternatives: Vec<Template>,
}

/// A set of named grammar rules plus the modifiers usable in their tags.
#[derive(Debug, Clone)]
pub struct GrammarSet {
    pub rules: HashMap<String, GrammarRule>,
    modifiers: ModifierSet,
}

impl Default for GrammarSet {
    fn default() -> Self {
        Self {
            rules: HashMap::new(),
            modifiers: ModifierSet::base_english(),
        }
    }
}

// Rule files may give a symbol one string or a list of strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRule {
    One(String),
    Many(Vec<String>),
}

impl RawRule {
    fn into_vec(self) -> Vec<String> {
        match self {
            RawRule::One(text) => vec![text],
            RawRule::Many(texts) => texts,
        }
    }
}

impl GrammarSet {
    /// An empty set with the base English modifiers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a grammar set from `symbol → [template, ...]` pairs.
    /// Every template is parsed up front.
    pub fn from_rules<I, K, V, S>(rules: I) -> Result<GrammarSet, GrammarError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = GrammarSet::default();
        for (name, alternatives) in rules {
            set.insert_rule(name, alternatives)?;
        }
        Ok(set)
    }

    /// Parse and insert a rule, replacing any rule with the same name.
    pub fn insert_rule<K, V, S>(&mut self, name: K, alternatives: V) -> Result<(), GrammarError>
    where
        K: Into<String>,
        V: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let name = name.into();
        let alternatives = alternatives
            .into_iter()
            .map(|text| Template::parse(text.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        self.rules.insert(
            name.clone(),
            GrammarRule { name, alternatives },
        );
        Ok(())
    }

    /// Load a grammar set from a file, picking the format from the
    /// extension (`.ron`, anything else is read as JSON).
    pub fn load(path: &Path) -> Result<GrammarSet, GrammarError> {
        match path.extension().and_then(|s| s.to_str()) {
            Some("ron") => Self::load_from_ron(path),
            _ => Self::load_from_json(path),
        }
    }

    /// Load a grammar set from a Tracery JSON file.
    pub fn load_from_json(path: &Path) -> Result<GrammarSet, GrammarError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_json(&contents)
    }

    /// Parse a grammar set from a Tracery JSON string.
    pub fn parse_json(input: &str) -> Result<GrammarSet, GrammarError> {
        let raw: HashMap<String, RawRule> = serde_json::from_str(input)?;
        Self::from_rules(raw.into_iter().map(|(name, rule)| (name, rule.into_vec())))
    }

    /// Load a grammar set from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<GrammarSet, GrammarError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a grammar set from a RON string.
    pub fn parse_ron(input: &str) -> Result<GrammarSet, GrammarError> {
        let raw: HashMap<String, RawRule> = ron::from_str(input)?;
        Self::from_rules(raw.into_iter().map(|(name, rule)| (name, rule.into_vec())))
    }

    /// Merge another grammar set into this one. Rules from `other`
    /// override rules in `self` with the same name.
    pub fn merge(&mut self, other: GrammarSet) {
        for (name, rule) in other.rules {
            self.rules.insert(name, rule);
        }
    }

    /// Register an extra modifier for use in tags.
    pub fn add_modifier(&mut self, name: impl Into<String>, modifier: Modifier) {
        self.modifiers.register(name, modifier);
    }

    pub fn modifiers(&self) -> &ModifierSet {
        &self.modifiers
    }

    /// Flatten `origin` into plain text, expanding every tag it contains.
    pub fn flatten(&self, origin: &str, rng: &mut StdRng) -> Result<String, GrammarError> {
        let template = Template::parse(origin)?;
        Expansion::new(self).expand_template(&template, 0, rng)
    }

    /// Expand a single symbol, as if flattening `#symbol#`.
    pub fn expand(&self, symbol: &str, rng: &mut StdRng) -> Result<String, GrammarError> {
        let template = Template {
            segments: vec![TemplateSegment::Tag(Tag {
                actions: Vec::new(),
                symbol: symbol.to_string(),
                modifiers: Vec::new(),
            })],
        };
        Expansion::new(self).expand_template(&template, 0, rng)
    }
}

/// Per-call expansion state. Pushed rules shadow the grammar's own and
/// vanish when the call returns.
struct Expansion<'g> {
    grammar: &'g GrammarSet,
    pushed: FxHashMap<String, Vec<Vec<Template>>>,
}

impl<'g> Expansion<'g> {
    fn new(grammar: &'g GrammarSet) -> Self {
        Self {
            grammar,
            pushed: FxHashMap::default(),
        }
    }

    fn expand_template(
        &mut self,
        template: &Template,
        depth: usize,
        rng: &mut StdRng,
    ) -> Result<String, GrammarError> {
        if depth > MAX_DEPTH {
            return Err(GrammarError::RecursionLimit(MAX_DEPTH));
        }

        let mut out = String::new();
        for segment in &template.segments {
            match segment {
                TemplateSegment::Literal(text) => out.push_str(text),
                TemplateSegment::Tag(tag) => {
                    let text = self.expand_tag(tag, depth, rng)?;
                    out.push_str(&text);
                }
                TemplateSegment::Action(action) => self.run_action(action, depth, rng)?,
            }
        }
        Ok(out)
    }

    fn expand_tag(
        &mut self,
        tag: &Tag,
        depth: usize,
        rng: &mut StdRng,
    ) -> Result<String, GrammarError> {
        let mut scoped = Vec::new();
        for action in &tag.actions {
            self.run_action(action, depth, rng)?;
            if let Action::Push { key, .. } = action {
                scoped.push(key.as_str());
            }
        }

        let mut text = if tag.symbol.is_empty() {
            String::new()
        } else {
            let alternative = self.select(&tag.symbol, rng)?;
            self.expand_template(&alternative, depth + 1, rng)?
        };

        for call in &tag.modifiers {
            text = self
                .grammar
                .modifiers
                .apply(&call.name, &text, &call.params)
                .ok_or_else(|| GrammarError::UnknownModifier(call.name.clone()))?;
        }

        for key in scoped.into_iter().rev() {
            self.pop(key)?;
        }
        Ok(text)
    }

    fn run_action(
        &mut self,
        action: &Action,
        depth: usize,
        rng: &mut StdRng,
    ) -> Result<(), GrammarError> {
        match action {
            Action::Push { key, rules } => {
                let mut finished = Vec::with_capacity(rules.len());
                for rule in rules {
                    let text = self.expand_template(rule, depth + 1, rng)?;
                    finished.push(Template::literal(text));
                }
                self.pushed.entry(key.clone()).or_default().push(finished);
                Ok(())
            }
            Action::Pop { key } => self.pop(key),
        }
    }

    fn pop(&mut self, key: &str) -> Result<(), GrammarError> {
        let stack = self
            .pushed
            .get_mut(key)
            .ok_or_else(|| GrammarError::PopWithoutPush(key.to_string()))?;
        stack.pop();
        if stack.is_empty() {
            self.pushed.remove(key);
        }
        Ok(())
    }

    /// Pick one alternative uniformly, preferring pushed rules.
    fn select(&self, symbol: &str, rng: &mut StdRng) -> Result<Template, GrammarError> {
        let alternatives = match self.pushed.get(symbol).and_then(|stack| stack.last()) {
            Some(top) => top.as_slice(),
            None => self
                .grammar
                .rules
                .get(symbol)
                .map(|rule| rule.alternatives.as_slice())
                .ok_or_else(|| GrammarError::RuleNotFound(symbol.to_string()))?,
        };
        if alternatives.is_empty() {
            return Err(GrammarError::EmptyRule(symbol.to_string()));
        }
        let idx = rng.gen_range(0..alternatives.len());
        Ok(alternatives[idx].clone())
    }
}
