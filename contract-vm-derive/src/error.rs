//! Derive macro for error enums.
//!
//! Generates `Display` and `std::error::Error` implementations from
//! `#[error("...")]` attributes on each variant. Format strings may reference
//! variant fields by name (`{field}`) or by position (`{0}`); positional
//! references are rewritten to bound identifiers so the ordinary inline
//! format-argument capture does the rest.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, Data, DeriveInput, Fields, LitStr};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let variants = match &input.data {
        Data::Enum(data) => &data.variants,
        _ => {
            return syn::Error::new_spanned(&input, "Error derive supports enums only")
                .to_compile_error()
                .into();
        }
    };

    let mut arms = Vec::new();
    for variant in variants {
        let vname = &variant.ident;
        let fmt = match error_attr(variant) {
            Ok(lit) => lit,
            Err(e) => return e.to_compile_error().into(),
        };
        let fmt_str = rewrite_positional(&fmt.value());
        let used = placeholder_names(&fmt_str);
        let fmt_lit = LitStr::new(&fmt_str, fmt.span());

        let arm = match &variant.fields {
            Fields::Unit => quote! {
                Self::#vname => write!(__f, #fmt_lit),
            },
            Fields::Named(fields) => {
                let bound: Vec<_> = fields
                    .named
                    .iter()
                    .filter_map(|f| f.ident.clone())
                    .filter(|id| used.iter().any(|u| u == &id.to_string()))
                    .collect();
                quote! {
                    Self::#vname { #( #bound, )* .. } => write!(__f, #fmt_lit),
                }
            }
            Fields::Unnamed(fields) => {
                let pats: Vec<_> = (0..fields.unnamed.len())
                    .map(|i| {
                        let id = format_ident!("f{}", i);
                        if used.iter().any(|u| u == &id.to_string()) {
                            quote! { #id }
                        } else {
                            quote! { _ }
                        }
                    })
                    .collect();
                quote! {
                    Self::#vname( #( #pats ),* ) => write!(__f, #fmt_lit),
                }
            }
        };
        arms.push(arm);
    }

    let expanded = quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, __f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    #( #arms )*
                }
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
    };

    TokenStream::from(expanded)
}

/// Extracts the `#[error("...")]` format literal from a variant.
fn error_attr(variant: &syn::Variant) -> syn::Result<LitStr> {
    for attr in &variant.attrs {
        if attr.path().is_ident("error") {
            return attr.parse_args::<LitStr>();
        }
    }
    Err(syn::Error::new_spanned(
        variant,
        "missing #[error(\"...\")] attribute",
    ))
}

/// Rewrites positional placeholders `{0}` to `{f0}` so they can be satisfied
/// by pattern bindings. `{{` escapes are left untouched.
fn rewrite_positional(fmt: &str) -> String {
    let mut out = String::with_capacity(fmt.len() + 4);
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        if c == '{' {
            match chars.peek() {
                Some('{') => {
                    out.push('{');
                    chars.next();
                }
                Some(d) if d.is_ascii_digit() => out.push('f'),
                _ => {}
            }
        }
    }
    out
}

/// Collects the identifiers referenced by `{name}` / `{name:spec}` placeholders.
fn placeholder_names(fmt: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '{' {
            continue;
        }
        if chars.peek() == Some(&'{') {
            chars.next();
            continue;
        }
        let mut name = String::new();
        for d in chars.by_ref() {
            if d == '}' || d == ':' {
                break;
            }
            name.push(d);
        }
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}
