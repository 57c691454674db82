//! Naming Helper Functions
//!
//! Slugs, English inflection and the derived field names of relationships.
//!
//! ## Relationship names
//!
//! When a relationship is created without explicit field names, both names
//! are derived from the singular slugs of the two entities:
//!
//! - **One-to-One**: `article_tag` / `tag_article`
//! - **One-to-Many**: `article_tags` / `tag_article`
//! - **Many-to-Many**: `article_tags` / `tag_articles`

use deunicode::deunicode_with_tofu;
use morphic_core::RelationType;

// ============================================================================
// Slugs
// ============================================================================

/// Build a URL-safe slug from a display name
///
/// The name is transliterated to ASCII first, so non-Latin scripts keep
/// their letters. Everything is lowercased, whitespace, `-` and `_` become a
/// single `-`, `@` is spelled `at`, and other punctuation is dropped.
///
/// # Examples
///
/// - "My Product" -> "my-product"
/// - "Crème Brûlée" -> "creme-brulee"
/// - "Продукт" -> "produkt"
/// - "user_profile" -> "user-profile"
pub fn slugify(name: &str) -> String {
    let ascii = deunicode_with_tofu(name, "");
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_separator = false;

    for c in ascii.chars().map(|c| c.to_ascii_lowercase()) {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c);
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_separator = true;
        } else if c == '@' {
            if !slug.is_empty() {
                slug.push('-');
            }
            slug.push_str("at");
            pending_separator = true;
        }
    }

    slug
}

/// Check that a slug is already in canonical form
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty() && slugify(slug) == slug
}

// ============================================================================
// Inflection
// ============================================================================

const UNCOUNTABLE: &[&str] = &[
    "data",
    "equipment",
    "feedback",
    "fish",
    "information",
    "media",
    "metadata",
    "money",
    "news",
    "rice",
    "series",
    "sheep",
    "species",
];

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("foot", "feet"),
    ("tooth", "teeth"),
    ("goose", "geese"),
    ("mouse", "mice"),
];

/// Plural endings that singularize back to `f`/`fe`
const F_PLURALS: &[(&str, &str)] = &[
    ("knives", "knife"),
    ("wives", "wife"),
    ("lives", "life"),
    ("leaves", "leaf"),
    ("loaves", "loaf"),
    ("halves", "half"),
    ("calves", "calf"),
    ("shelves", "shelf"),
    ("wolves", "wolf"),
    ("thieves", "thief"),
];

/// Words ending in `f`/`fe` that only take an `s`
const PLAIN_F: &[&str] = &["belief", "chef", "chief", "proof", "roof", "safe"];

/// Split off the last word of a slug-like string, keeping the separator in the head
fn split_last_word(s: &str) -> (&str, &str) {
    match s.rfind(['-', '_', ' ']) {
        Some(pos) => s.split_at(pos + 1),
        None => ("", s),
    }
}

/// Simple English pluralization of the last word
///
/// # Examples
///
/// - "tag" -> "tags"
/// - "category" -> "categories"
/// - "blog-post" -> "blog-posts"
pub fn pluralize(s: &str) -> String {
    let (head, word) = split_last_word(s);
    format!("{}{}", head, plural_word(word))
}

/// Simple English singularization of the last word
///
/// # Examples
///
/// - "tags" -> "tag"
/// - "categories" -> "category"
/// - "article" -> "article"
pub fn singularize(s: &str) -> String {
    let (head, word) = split_last_word(s);
    format!("{}{}", head, singular_word(word))
}

fn plural_word(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    let lower = s.to_ascii_lowercase();
    if UNCOUNTABLE.contains(&lower.as_str()) {
        return s.to_string();
    }
    if let Some((_, plural)) = IRREGULAR.iter().find(|(single, _)| *single == lower) {
        return plural.to_string();
    }
    if IRREGULAR.iter().any(|(_, plural)| *plural == lower) {
        return s.to_string();
    }

    // sibilant endings take -es
    if s.ends_with('s')
        || s.ends_with('x')
        || s.ends_with('z')
        || s.ends_with("ch")
        || s.ends_with("sh")
    {
        return format!("{}es", s);
    }

    // consonant + y
    if let Some(stem) = s.strip_suffix('y') {
        if stem.chars().last().is_some_and(|c| !"aeiou".contains(c)) {
            return format!("{}ies", stem);
        }
    }

    if !PLAIN_F.contains(&lower.as_str()) {
        if let Some(stem) = s.strip_suffix("fe") {
            return format!("{}ves", stem);
        }
        if let Some(stem) = s.strip_suffix('f') {
            return format!("{}ves", stem);
        }
    }

    format!("{}s", s)
}

fn singular_word(s: &str) -> String {
    let lower = s.to_ascii_lowercase();
    if lower.len() < 3 || UNCOUNTABLE.contains(&lower.as_str()) {
        return s.to_string();
    }
    if let Some((single, _)) = IRREGULAR.iter().find(|(_, plural)| *plural == lower) {
        return single.to_string();
    }
    if IRREGULAR.iter().any(|(single, _)| *single == lower) {
        return s.to_string();
    }

    if let Some(stem) = s.strip_suffix("ies") {
        if stem.len() > 1 {
            return format!("{}y", stem);
        }
    }
    if let Some((plural, single)) = F_PLURALS.iter().find(|(plural, _)| lower.ends_with(plural)) {
        return format!("{}{}", &s[..s.len() - plural.len()], single);
    }
    for suffix in ["sses", "shes", "ches", "xes", "zzes", "uses"] {
        if s.ends_with(suffix) {
            return s[..s.len() - 2].to_string();
        }
    }
    if s.ends_with("ss") || s.ends_with("us") || s.ends_with("is") {
        return s.to_string();
    }
    if let Some(stem) = s.strip_suffix('s') {
        return stem.to_string();
    }

    s.to_string()
}

// ============================================================================
// Relationship Field Names
// ============================================================================

/// Derive the forward and inverse field names of a relationship
///
/// Both entity slugs are singularized first, so plural slugs such as
/// `articles` behave like their singular forms.
///
/// # Examples
///
/// - (OneToMany, "article", "tag") -> ("article_tags", "tag_article")
/// - (ManyToMany, "article", "tag") -> ("article_tags", "tag_articles")
pub fn relationship_names(
    relation_type: RelationType,
    from_slug: &str,
    to_slug: &str,
) -> (String, String) {
    let from = singularize(from_slug);
    let to = singularize(to_slug);

    match relation_type {
        RelationType::OneToOne => (format!("{}_{}", from, to), format!("{}_{}", to, from)),
        RelationType::OneToMany => (
            format!("{}_{}", from, pluralize(&to)),
            format!("{}_{}", to, from),
        ),
        RelationType::ManyToMany => (
            format!("{}_{}", from, pluralize(&to)),
            format!("{}_{}", to, pluralize(&from)),
        ),
    }
}

/// Turn a field name into a label: underscores become spaces, first letter upper-cased
///
/// # Examples
///
/// - "article_tags" -> "Article tags"
pub fn humanize(field_name: &str) -> String {
    let spaced = field_name.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().chain(chars).collect(),
    }
}

// ============================================================================
// Tests
// ============================================================================
