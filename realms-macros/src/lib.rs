//! Proc macros for structured-output schemas.
//!
//! Provides `#[derive(ResponseSchema)]` to generate the JSON schema a
//! generation provider is asked to conform to, straight from a struct
//! definition. Doc comments become property descriptions.
//!
//! # Example
//!
//! ```ignore
//! /// One option offered to the player
//! #[derive(ResponseSchema)]
//! #[schema(rename_all = "camelCase")]
//! struct Choice {
//!     id: String,
//!     /// The text description of the choice.
//!     choice_text: String,
//!     /// Only present when something changed
//!     #[schema(optional)]
//!     note: String,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, DeriveInput, Field, Lit, Meta, Type};

/// Derive macro for generating a `response_schema()` associated function.
///
/// # Attributes
///
/// - `#[schema(rename_all = "camelCase")]` on the struct - rename every property
/// - `#[schema(optional)]` on fields - leave the property out of `required`
/// - `#[schema(rename = "...")]` on fields - override the property name
///
/// `Option<T>` fields are never required. Field types that are not strings,
/// numbers, booleans, `Vec` or `Option` must derive `ResponseSchema` too.
#[proc_macro_derive(ResponseSchema, attributes(schema))]
pub fn derive_response_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_schema(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

fn expand_schema(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let rename_all = get_rename_all(&input)?;
    let description = get_doc_comment(&input.attrs);

    let fields = match &input.data {
        syn::Data::Struct(data) => match &data.fields {
            syn::Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "ResponseSchema derive only supports structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "ResponseSchema derive only supports structs",
            ))
        }
    };

    let mut property_tokens = Vec::new();
    let mut required_fields = Vec::new();

    for field in fields {
        let property_name = get_property_name(field, rename_all.as_deref())?;
        let field_desc = get_doc_comment(&field.attrs);
        let is_optional = is_field_optional(field)?;
        let field_type = &field.ty;

        let type_schema = type_to_schema(field_type);

        let desc_token = if field_desc.is_empty() {
            quote! {}
        } else {
            quote! { property["description"] = serde_json::json!(#field_desc); }
        };

        property_tokens.push(quote! {
            {
                let mut property = #type_schema;
                #desc_token
                properties.insert(#property_name.to_string(), property);
            }
        });

        if !is_optional && !is_option_type(field_type) {
            required_fields.push(property_name);
        }
    }

    let required_array: Vec<_> = required_fields.iter().map(|s| quote! { #s }).collect();

    let desc_token = if description.is_empty() {
        quote! {}
    } else {
        quote! { schema["description"] = serde_json::json!(#description); }
    };

    Ok(quote! {
        impl #impl_generics #struct_name #ty_generics #where_clause {
            /// Generate the response schema for this type.
            pub fn response_schema() -> serde_json::Value {
                let mut properties = serde_json::Map::new();
                #(#property_tokens)*

                let required: Vec<&str> = vec![#(#required_array),*];

                let mut schema = serde_json::json!({
                    "type": "OBJECT",
                    "properties": properties,
                    "required": required
                });
                #desc_token
                schema
            }
        }
    })
}

fn get_rename_all(input: &DeriveInput) -> syn::Result<Option<String>> {
    for attr in &input.attrs {
        if attr.path().is_ident("schema") {
            let meta = attr.parse_args::<Meta>()?;
            if let Meta::NameValue(nv) = meta {
                if nv.path.is_ident("rename_all") {
                    if let syn::Expr::Lit(expr_lit) = &nv.value {
                        if let Lit::Str(s) = &expr_lit.lit {
                            let style = s.value();
                            return match style.as_str() {
                                "camelCase" | "snake_case" => Ok(Some(style)),
                                _ => Err(syn::Error::new_spanned(
                                    s,
                                    "rename_all supports \"camelCase\" and \"snake_case\"",
                                )),
                            };
                        }
                    }
                }
            }
        }
    }
    Ok(None)
}

fn get_property_name(field: &Field, rename_all: Option<&str>) -> syn::Result<String> {
    for attr in &field.attrs {
        if attr.path().is_ident("schema") {
            if let Ok(Meta::NameValue(nv)) = attr.parse_args::<Meta>() {
                if nv.path.is_ident("rename") {
                    if let syn::Expr::Lit(expr_lit) = &nv.value {
                        if let Lit::Str(s) = &expr_lit.lit {
                            return Ok(s.value());
                        }
                    }
                }
            }
        }
    }

    let ident = field
        .ident
        .as_ref()
        .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;
    let name = ident.to_string();
    let name = name.strip_prefix("r#").unwrap_or(&name);

    Ok(match rename_all {
        Some("camelCase") => to_camel_case(name),
        _ => name.to_string(),
    })
}

fn is_field_optional(field: &Field) -> syn::Result<bool> {
    for attr in &field.attrs {
        if attr.path().is_ident("schema") {
            if let Ok(Meta::Path(path)) = attr.parse_args::<Meta>() {
                if path.is_ident("optional") {
                    return Ok(true);
                }
            }
        }
    }
    Ok(false)
}

fn get_doc_comment(attrs: &[syn::Attribute]) -> String {
    let mut docs = Vec::new();
    for attr in attrs {
        if attr.path().is_ident("doc") {
            if let Meta::NameValue(nv) = &attr.meta {
                if let syn::Expr::Lit(expr_lit) = &nv.value {
                    if let Lit::Str(s) = &expr_lit.lit {
                        let line = s.value().trim().to_string();
                        if !line.is_empty() {
                            docs.push(line);
                        }
                    }
                }
            }
        }
    }
    docs.join(" ")
}

fn is_option_type(ty: &Type) -> bool {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            return segment.ident == "Option";
        }
    }
    false
}

fn first_generic_argument(segment: &syn::PathSegment) -> Option<&Type> {
    if let syn::PathArguments::AngleBracketed(args) = &segment.arguments {
        if let Some(syn::GenericArgument::Type(inner)) = args.args.first() {
            return Some(inner);
        }
    }
    None
}

fn type_to_schema(ty: &Type) -> TokenStream2 {
    match ty {
        Type::Path(type_path) => {
            let Some(segment) = type_path.path.segments.last() else {
                return quote! { serde_json::json!({}) };
            };

            match segment.ident.to_string().as_str() {
                "String" | "str" => quote! { serde_json::json!({"type": "STRING"}) },
                "i8" | "i16" | "i32" | "i64" | "isize" | "u8" | "u16" | "u32" | "u64"
                | "usize" => {
                    quote! { serde_json::json!({"type": "INTEGER"}) }
                }
                "f32" | "f64" => quote! { serde_json::json!({"type": "NUMBER"}) },
                "bool" => quote! { serde_json::json!({"type": "BOOLEAN"}) },
                "Option" => match first_generic_argument(segment) {
                    Some(inner) => type_to_schema(inner),
                    None => quote! { serde_json::json!({}) },
                },
                "Vec" => match first_generic_argument(segment) {
                    Some(inner) => {
                        let inner_schema = type_to_schema(inner);
                        quote! {
                            serde_json::json!({
                                "type": "ARRAY",
                                "items": #inner_schema
                            })
                        }
                    }
                    None => quote! { serde_json::json!({"type": "ARRAY"}) },
                },
                // Nested object: defer to its own derived schema.
                _ => quote! { <#ty>::response_schema() },
            }
        }
        Type::Reference(reference) => type_to_schema(&reference.elem),
        _ => quote! { serde_json::json!({}) },
    }
}

fn to_camel_case(s: &str) -> String {
    let mut result = String::new();
    let mut upper_next = false;
    for c in s.chars() {
        if c == '_' {
            upper_next = !result.is_empty();
        } else if upper_next {
            result.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            result.push(c);
        }
    }
    result
}
