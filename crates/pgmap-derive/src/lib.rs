//! Derive macros for pgmap
//!
//! Provides `#[derive(Model)]`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod attrs;
mod model;

/// Derive `pgmap::Model` for a struct with named fields.
///
/// # Example
///
/// ```ignore
/// use pgmap::Model;
///
/// #[derive(Debug, Default, Model)]
/// #[orm(table = "stories")]
/// struct Story {
///     #[orm(pk)]
///     id: i64,
///     title: String,
///     author_id: i64,
///     author: Option<User>,
///     #[orm(has_many, fk = "story_id")]
///     comments: Vec<Comment>,
///     #[orm(many_to_many = "story_tags")]
///     tags: Vec<Tag>,
///     #[orm(skip)]
///     cached_score: f64,
/// }
/// ```
///
/// The derive also implements `pgmap::Field` so the struct can be a relation target.
///
/// # Struct attributes
///
/// - `#[orm(table = "name")]` - table name (default: pluralized snake case)
/// - `#[orm(alias = "name")]` - SQL alias (default: snake case)
///
/// # Field attributes
///
/// - `#[orm(column = "name")]` - column name (default: snake case)
/// - `#[orm(pk)]` - primary key member (default: a field named `id`)
/// - `#[orm(skip)]` - not mapped; filled with `Default::default()` on decode
/// - `#[orm(belongs_to)]`, `#[orm(has_one)]`, `#[orm(has_many)]` - relation kind
/// - `#[orm(many_to_many = "join_table")]` - many-to-many through a join table
/// - `#[orm(fk = "col")]` - relation foreign key; comma-separated for composite keys
/// - `#[orm(join_fk = "col")]`, `#[orm(join_target_fk = "col")]` - join table columns
#[proc_macro_derive(Model, attributes(orm))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    model::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
