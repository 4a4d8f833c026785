//! Derive macro for the deterministic binary codec.
//!
//! Generates `Encode` and `Decode` implementations for structs and enums.
//! Fields are serialized in declaration order; enum variants are prefixed
//! with a `u8` discriminant assigned in declaration order. The format has
//! no self-description, so encoder and decoder must agree on the type,
//! which is what makes it deterministic enough to hash.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, Data, DataEnum, DeriveInput, Fields, Index};

pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let (encode_body, decode_body) = match &input.data {
        Data::Struct(data) => struct_bodies(&data.fields),
        Data::Enum(data) => enum_bodies(data),
        Data::Union(_) => {
            return syn::Error::new_spanned(&input, "BinaryCodec does not support unions")
                .to_compile_error()
                .into();
        }
    };

    TokenStream::from(quote! {
        impl #impl_generics crate::types::encoding::Encode for #name #ty_generics #where_clause {
            fn encode<S: crate::types::encoding::EncodeSink>(&self, out: &mut S) {
                #encode_body
            }
        }

        impl #impl_generics crate::types::encoding::Decode for #name #ty_generics #where_clause {
            fn decode(
                input: &mut &[u8],
            ) -> ::std::result::Result<Self, crate::types::encoding::DecodeError> {
                #decode_body
            }
        }
    })
}

/// Encode/decode bodies for any struct shape (named, tuple, unit).
fn struct_bodies(fields: &Fields) -> (proc_macro2::TokenStream, proc_macro2::TokenStream) {
    match fields {
        Fields::Named(fields) => {
            let names: Vec<_> = fields.named.iter().map(|f| &f.ident).collect();
            let encode = quote! {
                #(crate::types::encoding::Encode::encode(&self.#names, out);)*
            };
            let decode = quote! {
                Ok(Self {
                    #(#names: crate::types::encoding::Decode::decode(input)?,)*
                })
            };
            (encode, decode)
        }
        Fields::Unnamed(fields) => {
            let indices: Vec<Index> = (0..fields.unnamed.len()).map(Index::from).collect();
            let decode_each = indices
                .iter()
                .map(|_| quote! { crate::types::encoding::Decode::decode(input)?, });
            let encode = quote! {
                #(crate::types::encoding::Encode::encode(&self.#indices, out);)*
            };
            let decode = quote! { Ok(Self(#(#decode_each)*)) };
            (encode, decode)
        }
        Fields::Unit => (quote! {}, quote! { Ok(Self) }),
    }
}

/// Encode/decode bodies for enums: u8 discriminant then variant fields.
fn enum_bodies(data: &DataEnum) -> (proc_macro2::TokenStream, proc_macro2::TokenStream) {
    let mut encode_arms = Vec::with_capacity(data.variants.len());
    let mut decode_arms = Vec::with_capacity(data.variants.len());

    for (idx, variant) in data.variants.iter().enumerate() {
        let tag = idx as u8;
        let vname = &variant.ident;

        match &variant.fields {
            Fields::Unit => {
                encode_arms.push(quote! {
                    Self::#vname => crate::types::encoding::Encode::encode(&#tag, out),
                });
                decode_arms.push(quote! { #tag => Ok(Self::#vname), });
            }
            Fields::Unnamed(fields) => {
                let bindings: Vec<_> = (0..fields.unnamed.len())
                    .map(|i| format_ident!("f{}", i))
                    .collect();
                let decode_each = bindings
                    .iter()
                    .map(|_| quote! { crate::types::encoding::Decode::decode(input)?, });
                encode_arms.push(quote! {
                    Self::#vname(#(#bindings),*) => {
                        crate::types::encoding::Encode::encode(&#tag, out);
                        #(crate::types::encoding::Encode::encode(#bindings, out);)*
                    }
                });
                decode_arms.push(quote! { #tag => Ok(Self::#vname(#(#decode_each)*)), });
            }
            Fields::Named(fields) => {
                let names: Vec<_> = fields.named.iter().map(|f| &f.ident).collect();
                encode_arms.push(quote! {
                    Self::#vname { #(#names),* } => {
                        crate::types::encoding::Encode::encode(&#tag, out);
                        #(crate::types::encoding::Encode::encode(#names, out);)*
                    }
                });
                decode_arms.push(quote! {
                    #tag => Ok(Self::#vname {
                        #(#names: crate::types::encoding::Decode::decode(input)?,)*
                    }),
                });
            }
        }
    }

    let encode = quote! {
        match self {
            #(#encode_arms)*
        }
    };
    let decode = quote! {
        let tag: u8 = crate::types::encoding::Decode::decode(input)?;
        match tag {
            #(#decode_arms)*
            _ => Err(crate::types::encoding::DecodeError::InvalidValue),
        }
    };
    (encode, decode)
}
