//! `#[orm(...)]` attribute parsing.

use syn::{Attribute, LitStr, Result};

#[derive(Default)]
pub(crate) struct StructAttrs {
    pub table: Option<LitStr>,
    pub alias: Option<LitStr>,
}

pub(crate) enum RelationAttr {
    BelongsTo,
    HasOne,
    HasMany,
    ManyToMany(LitStr),
}

#[derive(Default)]
pub(crate) struct FieldAttrs {
    pub column: Option<LitStr>,
    pub pk: bool,
    pub skip: bool,
    pub relation: Option<RelationAttr>,
    pub fk: Option<LitStr>,
    pub join_fk: Option<LitStr>,
    pub join_target_fk: Option<LitStr>,
}

pub(crate) fn struct_attrs(attrs: &[Attribute]) -> Result<StructAttrs> {
    let mut out = StructAttrs::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("orm")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                out.table = Some(non_empty(meta.value()?.parse()?)?);
            } else if meta.path.is_ident("alias") {
                out.alias = Some(non_empty(meta.value()?.parse()?)?);
            } else {
                return Err(meta.error("expected `table` or `alias`"));
            }
            Ok(())
        })?;
    }
    Ok(out)
}

pub(crate) fn field_attrs(attrs: &[Attribute]) -> Result<FieldAttrs> {
    let mut out = FieldAttrs::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("orm")) {
        attr.parse_nested_meta(|meta| {
            let path = &meta.path;
            if path.is_ident("pk") || path.is_ident("id") {
                out.pk = true;
            } else if path.is_ident("skip") {
                out.skip = true;
            } else if path.is_ident("column") {
                out.column = Some(non_empty(meta.value()?.parse()?)?);
            } else if path.is_ident("fk") {
                out.fk = Some(non_empty(meta.value()?.parse()?)?);
            } else if path.is_ident("join_fk") {
                out.join_fk = Some(non_empty(meta.value()?.parse()?)?);
            } else if path.is_ident("join_target_fk") {
                out.join_target_fk = Some(non_empty(meta.value()?.parse()?)?);
            } else if path.is_ident("belongs_to") {
                set_relation(&mut out, RelationAttr::BelongsTo, &meta)?;
            } else if path.is_ident("has_one") {
                set_relation(&mut out, RelationAttr::HasOne, &meta)?;
            } else if path.is_ident("has_many") {
                set_relation(&mut out, RelationAttr::HasMany, &meta)?;
            } else if path.is_ident("many_to_many") {
                let table = non_empty(meta.value()?.parse()?)?;
                set_relation(&mut out, RelationAttr::ManyToMany(table), &meta)?;
            } else {
                return Err(meta.error("unknown orm field attribute"));
            }
            Ok(())
        })?;
    }
    Ok(out)
}

fn set_relation(
    out: &mut FieldAttrs,
    relation: RelationAttr,
    meta: &syn::meta::ParseNestedMeta<'_>,
) -> Result<()> {
    if out.relation.is_some() {
        return Err(meta.error("a field can declare only one relation kind"));
    }
    out.relation = Some(relation);
    Ok(())
}

fn non_empty(lit: LitStr) -> Result<LitStr> {
    if lit.value().trim().is_empty() {
        return Err(syn::Error::new(lit.span(), "value must not be empty"));
    }
    Ok(lit)
}
