/// Text modifiers applied inside grammar tags: `#animal.a.capitalize#`.
use std::collections::HashMap;

/// A modifier takes the expanded text and any parameters given in
/// `name(p1,p2)` form, and returns the transformed text.
pub type Modifier = fn(&str, &[String]) -> String;

/// A named collection of modifiers available during expansion.
#[derive(Debug, Clone, Default)]
pub struct ModifierSet {
    modifiers: HashMap<String, Modifier>,
}

impl ModifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard English set: `capitalize`, `capitalizeAll`,
    /// `uppercase`, `lowercase`, `a`, `s`, `firstS`, `ed` and `replace`.
    pub fn base_english() -> Self {
        let mut set = Self::new();
        set.register("capitalize", capitalize);
        set.register("capitalizeAll", capitalize_all);
        set.register("uppercase", uppercase);
        set.register("lowercase", lowercase);
        set.register("a", a);
        set.register("s", s);
        set.register("firstS", first_s);
        set.register("ed", ed);
        set.register("replace", replace);
        set
    }

    /// Register a modifier, replacing any existing one with the same name.
    pub fn register(&mut self, name: impl Into<String>, modifier: Modifier) {
        self.modifiers.insert(name.into(), modifier);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modifiers.contains_key(name)
    }

    /// Apply the named modifier. Returns `None` if it is not registered.
    pub fn apply(&self, name: &str, text: &str, params: &[String]) -> Option<String> {
        self.modifiers.get(name).map(|modifier| modifier(text, params))
    }

    pub fn len(&self) -> usize {
        self.modifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }
}

fn is_vowel(c: char) -> bool {
    matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u')
}

fn capitalize(text: &str, _params: &[String]) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn capitalize_all(text: &str, _params: &[String]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cap_next = true;
    for c in text.chars() {
        if !c.is_alphanumeric() {
            cap_next = true;
            out.push(c);
        } else if cap_next {
            out.extend(c.to_uppercase());
            cap_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn uppercase(text: &str, _params: &[String]) -> String {
    text.to_uppercase()
}

fn lowercase(text: &str, _params: &[String]) -> String {
    text.to_lowercase()
}

/// Indefinite article. "unicorn" and friends keep "a" despite the vowel.
fn a(text: &str, _params: &[String]) -> String {
    let chars: Vec<char> = text.chars().collect();
    if let Some(&first) = chars.first() {
        if matches!(first, 'u' | 'U') && chars.len() > 2 && matches!(chars[2], 'i' | 'I') {
            return format!("a {}", text);
        }
        if is_vowel(first) {
            return format!("an {}", text);
        }
    }
    format!("a {}", text)
}

fn s(text: &str, _params: &[String]) -> String {
    let chars: Vec<char> = text.chars().collect();
    let Some(&last) = chars.last() else {
        return String::new();
    };
    match last {
        's' | 'h' | 'x' | 'S' | 'H' | 'X' => format!("{}es", text),
        'y' | 'Y' if chars.len() > 1 && !is_vowel(chars[chars.len() - 2]) => {
            let stem: String = chars[..chars.len() - 1].iter().collect();
            format!("{}ies", stem)
        }
        _ => format!("{}s", text),
    }
}

fn first_s(text: &str, params: &[String]) -> String {
    match text.split_once(' ') {
        Some((first, rest)) => format!("{} {}", s(first, params), rest),
        None => s(text, params),
    }
}

/// Past tense of the first word; the rest of the text is left alone.
fn ed(text: &str, _params: &[String]) -> String {
    let (word, rest) = match text.find(' ') {
        Some(idx) => text.split_at(idx),
        None => (text, ""),
    };
    let chars: Vec<char> = word.chars().collect();
    let Some(&last) = chars.last() else {
        return text.to_string();
    };
    match last {
        'e' => format!("{}d{}", word, rest),
        'y' if chars.len() > 1 && !is_vowel(chars[chars.len() - 2]) => {
            let stem: String = chars[..chars.len() - 1].iter().collect();
            format!("{}ied{}", stem, rest)
        }
        _ => format!("{}ed{}", word, rest),
    }
}

fn replace(text: &str, params: &[String]) -> String {
    match params {
        [from, to, ..] if !from.is_empty() => text.replace(from.as_str(), to),
        _ => text.to_string(),
    }
}
