//! Derive macro for deterministic binary serialization.
//!
//! Generates `Encode` and `Decode` implementations for structs. Fields are
//! serialized in declaration order, little-endian, with no padding; the
//! resulting layout is what contract code sees when a struct is copied into
//! or out of VM linear memory, so it must stay deterministic.
//!
//! Enums and unions are not supported.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, Index};

pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => &data.fields,
        _ => {
            return syn::Error::new_spanned(
                &input,
                "BinaryCodec derive supports structs only",
            )
            .to_compile_error()
            .into();
        }
    };

    let (encode_body, decode_body) = match fields {
        Fields::Named(fields) => {
            let names: Vec<_> = fields.named.iter().map(|f| f.ident.clone()).collect();
            let types: Vec<_> = fields.named.iter().map(|f| f.ty.clone()).collect();
            (
                quote! { #( self.#names.encode(out); )* },
                quote! {
                    Ok(Self {
                        #( #names: <#types>::decode(input)?, )*
                    })
                },
            )
        }
        Fields::Unnamed(fields) => {
            let indices: Vec<_> = (0..fields.unnamed.len()).map(Index::from).collect();
            let types: Vec<_> = fields.unnamed.iter().map(|f| f.ty.clone()).collect();
            (
                quote! { #( self.#indices.encode(out); )* },
                quote! {
                    Ok(Self(
                        #( <#types>::decode(input)?, )*
                    ))
                },
            )
        }
        Fields::Unit => (quote! {}, quote! { Ok(Self) }),
    };

    let expanded = quote! {
        impl #impl_generics crate::types::encoding::Encode for #name #ty_generics #where_clause {
            fn encode<S: crate::types::encoding::EncodeSink>(&self, out: &mut S) {
                #encode_body
            }
        }

        impl #impl_generics crate::types::encoding::Decode for #name #ty_generics #where_clause {
            fn decode(
                input: &mut &[u8],
            ) -> Result<Self, crate::types::encoding::DecodeError> {
                #decode_body
            }
        }
    };

    TokenStream::from(expanded)
}
