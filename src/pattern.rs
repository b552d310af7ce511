use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenClass {
    Literal,
    /// Produced by normalization, e.g. `<NUM>` or a named variable.
    Placeholder,
}

/// Equality and hashing look at `text` and `class` only; the raw value a
/// placeholder replaced never affects matching.
#[derive(Debug, Clone)]
pub struct Token {
    text: String,
    class: TokenClass,
    raw: Option<String>,
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class && self.text == other.text
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
        self.class.hash(state);
    }
}

impl Token {
    pub fn literal(text: impl Into<String>) -> Self {
        Self { text: text.into(), class: TokenClass::Literal, raw: None }
    }

    /// Placeholder named `name`, rendered as `<name>`.
    pub fn placeholder(name: &str) -> Self {
        Self { text: format!("<{name}>"), class: TokenClass::Placeholder, raw: None }
    }

    /// Placeholder `<name>` that remembers the text it replaced.
    pub fn variable(name: &str, raw: impl Into<String>) -> Self {
        Self { raw: Some(raw.into()), ..Self::placeholder(name) }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Text as it appeared in the line: the replaced value for a variable,
    /// `text()` otherwise.
    pub fn value(&self) -> &str {
        self.raw.as_deref().unwrap_or(&self.text)
    }

    pub fn class(&self) -> TokenClass {
        self.class
    }

    pub fn is_placeholder(&self) -> bool {
        self.class == TokenClass::Placeholder
    }
}

/// One position of a record or pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Element {
    Token(Token),
    Wildcard,
}

impl Element {
    pub fn literal(text: impl Into<String>) -> Self {
        Element::Token(Token::literal(text))
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Element::Wildcard)
    }

    pub fn as_token(&self) -> Option<&Token> {
        match self {
            Element::Token(t) => Some(t),
            Element::Wildcard => None,
        }
    }

    /// Generalization of two aligned elements: identical tokens survive,
    /// anything else collapses to a wildcard.
    pub fn generalize(&self, other: &Element) -> Element {
        match (self, other) {
            (Element::Token(a), Element::Token(b)) if a == b => self.clone(),
            _ => Element::Wildcard,
        }
    }
}

impl From<Token> for Element {
    fn from(t: Token) -> Self {
        Element::Token(t)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Token(t) => f.write_str(t.text()),
            Element::Wildcard => f.write_str("*"),
        }
    }
}

/// Generalized sequence summarizing every member folded into a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Pattern {
    elements: Vec<Element>,
}

impl Pattern {
    pub fn new(elements: Vec<Element>) -> Self {
        Self { elements }
    }

    pub fn from_words<S: AsRef<str>>(words: &[S]) -> Self {
        Self::new(words.iter().map(|w| Element::literal(w.as_ref())).collect())
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn into_elements(self) -> Vec<Element> {
        self.elements
    }

    /// Number of positions still holding a concrete token.
    pub fn concrete_count(&self) -> usize {
        self.elements.iter().filter(|e| !e.is_wildcard()).count()
    }

    pub fn wildcard_count(&self) -> usize {
        self.elements.len() - self.concrete_count()
    }

    /// `None` marks a wildcard position.
    pub fn to_texts(&self) -> Vec<Option<String>> {
        self.elements
            .iter()
            .map(|e| e.as_token().map(|t| t.text().to_string()))
            .collect()
    }

    /// Tokens as they appeared in the input, variables restored.
    pub fn render_values(&self, placeholder: &str) -> String {
        self.elements
            .iter()
            .map(|e| match e {
                Element::Token(t) => t.value(),
                Element::Wildcard => placeholder,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn render(&self, placeholder: &str) -> String {
        let mut out = String::new();
        for (i, e) in self.elements.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            match e {
                Element::Token(t) => out.push_str(t.text()),
                Element::Wildcard => out.push_str(placeholder),
            }
        }
        out
    }
}

impl Deref for Pattern {
    type Target = [Element];

    fn deref(&self) -> &[Element] {
        &self.elements
    }
}

impl From<Vec<Element>> for Pattern {
    fn from(elements: Vec<Element>) -> Self {
        Self::new(elements)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render("*"))
    }
}
