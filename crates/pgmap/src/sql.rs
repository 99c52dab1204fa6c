//! Parameterized SQL assembly.
//!
//! [`Sql`] stores SQL pieces and bound values separately and numbers placeholders
//! (`$1, $2, ...`) only when rendered, so fragments can be composed without tracking
//! indices. Caller-supplied fragments use `?` placeholders and are carried as
//! [`Fragment`]s until they are appended to a statement.
//!
//! ```ignore
//! use pgmap::{Sql, Value};
//!
//! let mut q = Sql::new("SELECT ");
//! q.push_qualified("user", "id").push(" FROM ").push_quoted("users");
//! q.push(" WHERE ").push_qualified("user", "name").push(" = ").push_bind("admin");
//! assert_eq!(q.to_sql(), r#"SELECT "user"."id" FROM "users" WHERE "user"."name" = $1"#);
//! ```

use crate::condition::Condition;
use crate::error::{OrmError, OrmResult};
use crate::ident::{self, Ident, IntoIdent};
use crate::monitor::QueryType;
use crate::value::Value;

#[derive(Debug, Clone)]
enum SqlPart {
    Raw(String),
    Param,
}

/// A parameter-safe SQL builder.
#[must_use]
#[derive(Debug, Clone, Default)]
pub struct Sql {
    parts: Vec<SqlPart>,
    params: Vec<Value>,
    tag: Option<String>,
}

impl Sql {
    /// Create a new builder with an initial SQL fragment.
    pub fn new(initial_sql: impl Into<String>) -> Self {
        Self {
            parts: vec![SqlPart::Raw(initial_sql.into())],
            params: Vec::new(),
            tag: None,
        }
    }

    /// Create an empty builder.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Associate a tag for monitoring.
    pub fn tag(&mut self, tag: impl Into<String>) -> &mut Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(|p| match p {
            SqlPart::Raw(s) => s.is_empty(),
            SqlPart::Param => false,
        })
    }

    /// Append raw SQL (no parameters).
    pub fn push(&mut self, sql: &str) -> &mut Self {
        if sql.is_empty() {
            return self;
        }
        match self.parts.last_mut() {
            Some(SqlPart::Raw(last)) => last.push_str(sql),
            _ => self.parts.push(SqlPart::Raw(sql.to_string())),
        }
        self
    }

    /// Append a parameter placeholder and bind its value.
    pub fn push_bind(&mut self, value: impl Into<Value>) -> &mut Self {
        self.parts.push(SqlPart::Param);
        self.params.push(value.into());
        self
    }

    /// Append a comma-separated list of placeholders and bind all values.
    ///
    /// An empty list appends `NULL`, so `IN (NULL)` stays valid SQL and matches nothing.
    pub fn push_bind_list<V: Into<Value>>(
        &mut self,
        values: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        let mut iter = values.into_iter();
        let Some(first) = iter.next() else {
            return self.push("NULL");
        };
        self.push_bind(first);
        for v in iter {
            self.push(", ");
            self.push_bind(v);
        }
        self
    }

    /// Append another `Sql` fragment, consuming it.
    pub fn push_sql(&mut self, mut other: Sql) -> &mut Self {
        self.parts.append(&mut other.parts);
        self.params.append(&mut other.params);
        if self.tag.is_none() {
            self.tag = other.tag;
        }
        self
    }

    /// Append a caller-supplied identifier after validating it.
    pub fn push_ident<I: IntoIdent>(&mut self, ident: I) -> OrmResult<&mut Self> {
        let ident = ident.into_ident()?;
        Ok(self.push_ident_ref(&ident))
    }

    /// Append a pre-validated [`Ident`].
    pub fn push_ident_ref(&mut self, ident: &Ident) -> &mut Self {
        let mut s = String::new();
        ident.write_sql(&mut s);
        self.push(&s)
    }

    /// Append a descriptor-produced name, double-quoted.
    pub fn push_quoted(&mut self, name: &str) -> &mut Self {
        self.push(&ident::quote(name))
    }

    /// Append `"alias"."column"`.
    pub fn push_qualified(&mut self, alias: &str, column: &str) -> &mut Self {
        self.push(&ident::qualified(alias, column))
    }

    /// Append a [`Condition`], numbering its values after the ones already bound.
    pub fn push_condition(&mut self, condition: &Condition) -> &mut Self {
        condition.append_to_sql(self);
        self
    }

    /// Append a caller fragment, turning each `?` into a bound placeholder.
    ///
    /// `table` names the statement in the error returned on a placeholder/argument
    /// count mismatch.
    pub fn push_fragment(&mut self, fragment: &Fragment, table: &str) -> OrmResult<&mut Self> {
        let pieces = fragment.split().map_err(|m| OrmError::query_build(table, m))?;
        let mut args = fragment.args.iter();
        for piece in pieces {
            match piece {
                Piece::Text(text) => {
                    self.push(&text);
                }
                Piece::Placeholder => {
                    // `split` verified the counts, so an argument is always available.
                    let value = args.next().cloned().unwrap_or_default();
                    self.push_bind(value);
                }
            }
        }
        Ok(self)
    }

    /// Render SQL with `$1, $2, ...` placeholders.
    pub fn to_sql(&self) -> String {
        let mut out = String::new();
        let mut idx = 0usize;
        for part in &self.parts {
            match part {
                SqlPart::Raw(s) => out.push_str(s),
                SqlPart::Param => {
                    idx += 1;
                    out.push('$');
                    out.push_str(&idx.to_string());
                }
            }
        }
        out
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Finish the builder into an executable statement.
    pub fn into_statement(self, kind: QueryType) -> Statement {
        Statement {
            sql: self.to_sql(),
            params: self.params,
            kind,
            tag: self.tag,
        }
    }
}

/// A rendered statement ready for the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
    pub kind: QueryType,
    pub tag: Option<String>,
}

/// An opaque caller-supplied SQL fragment with `?` placeholders.
///
/// `??` produces a literal `?` (for jsonb operators). A `?` inside a string literal, a
/// quoted identifier, a dollar-quoted string or a comment is left alone.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    sql: String,
    args: Vec<Value>,
}

#[derive(Debug, PartialEq)]
enum Piece {
    Text(String),
    Placeholder,
}

impl Fragment {
    pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    fn split(&self) -> Result<Vec<Piece>, String> {
        let sql = self.sql.as_str();
        let mut pieces = Vec::new();
        let mut text = String::new();
        let mut placeholders = 0usize;
        let mut i = 0usize;

        while let Some(c) = sql[i..].chars().next() {
            let rest = &sql[i..];
            if let Some(region) = skipped_region(rest) {
                let len = region.map_err(|what| format!("{what} in fragment `{sql}`"))?;
                text.push_str(&rest[..len]);
                i += len;
            } else if rest.starts_with("??") {
                text.push('?');
                i += 2;
            } else if c == '?' {
                if !text.is_empty() {
                    pieces.push(Piece::Text(std::mem::take(&mut text)));
                }
                pieces.push(Piece::Placeholder);
                placeholders += 1;
                i += 1;
            } else {
                text.push(c);
                i += c.len_utf8();
            }
        }
        if placeholders != self.args.len() {
            return Err(format!(
                "fragment `{}` has {} placeholders but {} arguments",
                self.sql,
                placeholders,
                self.args.len()
            ));
        }
        if !text.is_empty() {
            pieces.push(Piece::Text(text));
        }
        Ok(pieces)
    }
}

/// Byte length of the literal, quoted identifier, comment or dollar-quoted string that
/// starts `rest`; `None` when `rest` starts with none of them.
fn skipped_region(rest: &str) -> Option<Result<usize, &'static str>> {
    let (open, close, what) = if rest.starts_with('\'') {
        (1, "'", "unterminated quote")
    } else if rest.starts_with('"') {
        (1, "\"", "unterminated quote")
    } else if rest.starts_with("--") {
        return Some(Ok(rest.find('\n').map_or(rest.len(), |n| n + 1)));
    } else if rest.starts_with("/*") {
        (2, "*/", "unterminated comment")
    } else if let Some(tag) = dollar_tag(rest) {
        (tag.len(), tag, "unterminated dollar-quoted string")
    } else {
        return None;
    };
    Some(
        rest[open..]
            .find(close)
            .map(|n| open + n + close.len())
            .ok_or(what),
    )
}

/// `$$` or `$tag$` at the start of `rest`. `$1` is not a tag.
fn dollar_tag(rest: &str) -> Option<&str> {
    let body = rest.strip_prefix('$')?;
    let end = body.find('$')?;
    let valid = body[..end]
        .chars()
        .enumerate()
        .all(|(i, c)| c == '_' || c.is_alphabetic() || (i > 0 && c.is_ascii_digit()));
    valid.then(|| &rest[..end + 2])
}

impl From<&str> for Fragment {
    fn from(sql: &str) -> Self {
        Self::raw(sql)
    }
}

impl From<String> for Fragment {
    fn from(sql: String) -> Self {
        Self::raw(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;

    #[test]
    fn builds_placeholders_in_order() {
        let mut q = Sql::new("SELECT * FROM users WHERE a = ");
        q.push_bind(1_i64).push(" AND b = ").push_bind("x");
        assert_eq!(q.to_sql(), "SELECT * FROM users WHERE a = $1 AND b = $2");
        assert_eq!(q.params().len(), 2);
    }

    #[test]
    fn bind_list_renders_commas() {
        let mut q = Sql::new("id IN (");
        q.push_bind_list(vec![1_i64, 2, 3]).push(")");
        assert_eq!(q.to_sql(), "id IN ($1, $2, $3)");

        let mut q = Sql::new("id IN (");
        q.push_bind_list(Vec::<i64>::new()).push(")");
        assert_eq!(q.to_sql(), "id IN (NULL)");
    }

    #[test]
    fn fragment_numbers_after_existing_params() {
        let mut q = Sql::new("SELECT 1 WHERE a = ");
        q.push_bind(1_i64).push(" AND ");
        q.push_fragment(&Fragment::new("b = ? OR c = ?", args!["x", 2_i64]), "t")
            .unwrap();
        assert_eq!(q.to_sql(), "SELECT 1 WHERE a = $1 AND b = $2 OR c = $3");
        assert_eq!(
            q.params(),
            &[Value::Int(1), Value::Text("x".into()), Value::Int(2)]
        );
    }

    #[test]
    fn fragment_ignores_quoted_and_escaped_marks() {
        let frag = Fragment::new(r#"note = 'why?' AND "odd?" = ? AND data ?? 'k'"#, args![1_i64]);
        let mut q = Sql::empty();
        q.push_fragment(&frag, "t").unwrap();
        assert_eq!(
            q.to_sql(),
            r#"note = 'why?' AND "odd?" = $1 AND data ? 'k'"#
        );
    }

    #[test]
    fn fragment_ignores_dollar_quotes_and_comments() {
        let frag = Fragment::new(
            "body = $$why?$$ AND tag = $t$who?$t$ -- any?\n AND id = ? /* or? */",
            args![1_i64],
        );
        let mut q = Sql::empty();
        q.push_fragment(&frag, "t").unwrap();
        assert_eq!(
            q.to_sql(),
            "body = $$why?$$ AND tag = $t$who?$t$ -- any?\n AND id = $1 /* or? */"
        );
        assert_eq!(q.params(), &[Value::Int(1)]);

        let mut q = Sql::empty();
        let err = q
            .push_fragment(&Fragment::new("a = $$open? ", args![]), "t")
            .unwrap_err();
        assert!(err.to_string().contains("unterminated dollar-quoted string"), "{err}");
    }

    #[test]
    fn fragment_count_mismatch_is_build_error() {
        let mut q = Sql::empty();
        let err = q
            .push_fragment(&Fragment::new("a = ? AND b = ?", args![1_i64]), "stories")
            .unwrap_err();
        assert!(err.is_query_build());
        assert!(err.to_string().contains("stories"));

        let err = q
            .push_fragment(&Fragment::new("a = 1", args![1_i64]), "stories")
            .unwrap_err();
        assert!(err.is_query_build());
    }

    #[test]
    fn values_are_never_interpolated() {
        let hostile = "'; DROP TABLE users; --";
        let mut q = Sql::empty();
        q.push_fragment(&Fragment::new("name = ?", args![hostile]), "users")
            .unwrap();
        assert_eq!(q.to_sql(), "name = $1");
        assert!(!q.to_sql().contains("DROP"));
    }

    #[test]
    fn push_ident_rejects_unsafe() {
        let mut q = Sql::empty();
        assert!(q.push_ident("users; drop table users; --").is_err());
        assert!(q.push_ident("users name").is_err());
        q.push_ident("story.title").unwrap();
        assert_eq!(q.to_sql(), r#""story"."title""#);
    }

    #[test]
    fn into_statement_keeps_tag() {
        let mut q = Sql::new("SELECT 1");
        q.tag("recent_stories");
        let stmt = q.into_statement(QueryType::Select);
        assert_eq!(stmt.tag.as_deref(), Some("recent_stories"));
        assert_eq!(stmt.kind, QueryType::Select);
    }
}
