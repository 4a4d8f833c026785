//! Derive macro for error types.
//!
//! Generates `std::fmt::Display` and `std::error::Error` implementations
//! from `#[error("...")]` attributes. Supports `{0}`-style positional
//! interpolation on tuple variants and `{field}` interpolation on struct
//! variants.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, Data, DeriveInput, Fields, Lit, Meta};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let data = match &input.data {
        Data::Enum(data) => data,
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Error derive supports enums only",
            ));
        }
    };

    let arms = data
        .variants
        .iter()
        .map(|variant| {
            let vname = &variant.ident;
            let message = message_for(variant)?;

            Ok(match &variant.fields {
                Fields::Unit => quote! {
                    Self::#vname => write!(f, #message),
                },
                Fields::Unnamed(fields) => {
                    let bindings: Vec<_> = (0..fields.unnamed.len())
                        .map(|i| format_ident!("f{}", i))
                        .collect();
                    let format = rename_positional(&message, bindings.len());
                    quote! {
                        Self::#vname(#(#bindings),*) =>
                            write!(f, #format, #(#bindings = #bindings),*),
                    }
                }
                Fields::Named(fields) => {
                    let names: Vec<_> = fields.named.iter().map(|f| &f.ident).collect();
                    quote! {
                        Self::#vname { #(#names),* } =>
                            write!(f, #message, #(#names = #names),*),
                    }
                }
            })
        })
        .collect::<syn::Result<Vec<_>>>()?;

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    #(#arms)*
                }
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
    })
}

/// Reads the `#[error("...")]` attribute off a variant.
fn message_for(variant: &syn::Variant) -> syn::Result<String> {
    for attr in &variant.attrs {
        if !attr.path().is_ident("error") {
            continue;
        }
        if let Meta::List(list) = &attr.meta {
            if let Ok(Lit::Str(lit)) = syn::parse2::<Lit>(list.tokens.clone()) {
                return Ok(lit.value());
            }
        }
        return Err(syn::Error::new_spanned(
            &attr.meta,
            "expected #[error(\"message\")] with a string literal",
        ));
    }

    Err(syn::Error::new_spanned(
        variant,
        format!(
            "variant `{}` is missing its #[error(\"...\")] attribute",
            variant.ident
        ),
    ))
}

/// Rewrites `{0}`, `{1}` placeholders to the `{f0}`, `{f1}` bindings used in
/// the generated match arms.
fn rename_positional(format: &str, fields: usize) -> String {
    let mut out = format.to_string();
    for i in (0..fields).rev() {
        out = out.replace(&format!("{{{i}}}"), &format!("{{f{i}}}"));
    }
    out
}
