//! `#[derive(Model)]` expansion.

use crate::attrs::{FieldAttrs, RelationAttr, field_attrs, struct_attrs};
use proc_macro2::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::{Data, DeriveInput, Fields, Result};

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Model cannot be derived for generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Model can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Model can only be derived for structs",
            ));
        }
    };

    let st = struct_attrs(&input.attrs)?;
    let type_name = name.to_string();
    let table = st.table.map(|t| quote!(.table(#t)));
    let alias = st.alias.map(|a| quote!(.alias(#a)));

    let mut shape_fields = Vec::with_capacity(fields.len());
    let mut decode_fields = Vec::with_capacity(fields.len());
    let mut push_values = Vec::with_capacity(fields.len());
    let mut assigns = Vec::with_capacity(fields.len());

    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let ty = &field.ty;
        let attrs = field_attrs(&field.attrs)?;
        let field_name = ident.unraw().to_string();

        if attrs.skip {
            if attrs.pk || attrs.column.is_some() || attrs.relation.is_some() {
                return Err(syn::Error::new_spanned(
                    ident,
                    "`skip` cannot be combined with other orm attributes",
                ));
            }
            decode_fields.push(quote!(#ident: ::core::default::Default::default()));
            continue;
        }

        let modifiers = shape_modifiers(&attrs);
        shape_fields.push(quote! {
            .field(
                ::pgmap::FieldShape::new(#field_name, <#ty as ::pgmap::Field>::kind())
                    #(#modifiers)*
            )
        });
        decode_fields.push(quote!(#ident: node.get::<#ty>(#field_name)?));
        push_values.push(quote! {
            ::pgmap::__private::push_value(&mut values, #field_name, &self.#ident)?;
        });
        assigns.push(quote! {
            node.assign(#field_name, &mut self.#ident)?;
        });
    }

    Ok(quote! {
        impl ::pgmap::Model for #name {
            fn shape() -> ::pgmap::ModelShape {
                ::pgmap::ModelShape::new(#type_name)
                    #table
                    #alias
                    #(#shape_fields)*
            }

            fn decode(node: &::pgmap::Node) -> ::pgmap::OrmResult<Self> {
                ::core::result::Result::Ok(Self {
                    #(#decode_fields,)*
                })
            }

            fn to_values(
                &self,
            ) -> ::pgmap::OrmResult<::std::vec::Vec<(&'static str, ::pgmap::Value)>> {
                #[allow(unused_mut)]
                let mut values = ::std::vec::Vec::new();
                #(#push_values)*
                ::core::result::Result::Ok(values)
            }

            #[allow(unused_variables)]
            fn apply_node(&mut self, node: &::pgmap::Node) -> ::pgmap::OrmResult<()> {
                #(#assigns)*
                ::core::result::Result::Ok(())
            }
        }

        impl ::pgmap::Field for #name {
            fn kind() -> ::pgmap::FieldKind {
                ::pgmap::FieldKind::One {
                    target: ::pgmap::ModelRef::of::<Self>(),
                    optional: false,
                }
            }

            fn from_node(node: &::pgmap::Node) -> ::pgmap::OrmResult<Self> {
                <Self as ::pgmap::Model>::decode(node)
            }

            fn from_related(
                related: ::core::option::Option<&::pgmap::Related>,
            ) -> ::pgmap::OrmResult<Self> {
                ::pgmap::__private::single_from_related(related)
            }
        }
    })
}

fn shape_modifiers(attrs: &FieldAttrs) -> Vec<TokenStream> {
    let mut out = Vec::new();
    if let Some(column) = &attrs.column {
        out.push(quote!(.column(#column)));
    }
    if attrs.pk {
        out.push(quote!(.pk()));
    }
    match &attrs.relation {
        Some(RelationAttr::BelongsTo) => {
            out.push(quote!(.relation(::pgmap::RelationHint::BelongsTo)));
        }
        Some(RelationAttr::HasOne) => {
            out.push(quote!(.relation(::pgmap::RelationHint::HasOne)));
        }
        Some(RelationAttr::HasMany) => {
            out.push(quote!(.relation(::pgmap::RelationHint::HasMany)));
        }
        Some(RelationAttr::ManyToMany(table)) => out.push(quote! {
            .relation(::pgmap::RelationHint::ManyToMany { join_table: #table })
        }),
        None => {}
    }
    if let Some(fk) = &attrs.fk {
        out.push(quote!(.fk(#fk)));
    }
    if let Some(col) = &attrs.join_fk {
        out.push(quote!(.join_fk(#col)));
    }
    if let Some(col) = &attrs.join_target_fk {
        out.push(quote!(.join_target_fk(#col)));
    }
    out
}
