//! Naming convention.
//!
//! - column: `snake_case(field)`
//! - table: `snake_case(type)` pluralised (`Story` → `stories`, `Box` → `boxes`)
//! - alias: `snake_case(type)` (`Story` → `story`); joined relations use their path
//!   joined by `__` (`author__profile`)
//! - foreign keys: `<snake>_id`

use heck::ToSnakeCase;

pub fn column_name(field: &str) -> String {
    field.to_snake_case()
}

pub fn alias_name(type_name: &str) -> String {
    type_name.to_snake_case()
}

pub fn table_name(type_name: &str) -> String {
    pluralize(&type_name.to_snake_case())
}

/// Conventional foreign key column for a name (`author` → `author_id`).
pub fn foreign_key(name: &str) -> String {
    format!("{}_id", name.to_snake_case())
}

/// Output alias for a joined column (`author`, `id` → `author__id`).
pub fn joined_column_alias(table_alias: &str, column: &str) -> String {
    format!("{table_alias}__{column}")
}

pub fn path_alias(path: &[&str]) -> String {
    path.join("__")
}

/// English plural of a snake_case word, applied to its last segment.
pub fn pluralize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if lower.ends_with("ch")
        || lower.ends_with("sh")
        || lower.ends_with('s')
        || lower.ends_with('x')
        || lower.ends_with('z')
    {
        return format!("{word}es");
    }
    let mut chars = lower.chars().rev();
    if let (Some('y'), Some(prev)) = (chars.next(), chars.next()) {
        if !matches!(prev, 'a' | 'e' | 'i' | 'o' | 'u') {
            return format!("{}ies", &word[..word.len() - 1]);
        }
    }
    format!("{word}s")
}
