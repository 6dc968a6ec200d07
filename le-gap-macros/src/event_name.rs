//! Methods for proc macro `EventName`

use convert_case::{Case, Casing};
use proc_macro2::{Span, TokenStream};
use quote::quote;

/// Parse an identifier into a literal string
fn variant_name(ident: &syn::Ident) -> syn::LitStr {
    let name = ident.to_string().to_case(Case::Title);

    syn::LitStr::new(&name, Span::call_site())
}

/// Create the `name` method for the enum `input`
///
/// see the library level proc macro [`event_name`](crate::event_name) for more details
pub fn derive(input: syn::DeriveInput) -> syn::Result<TokenStream> {
    let data = match &input.data {
        syn::Data::Enum(data) => data,
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "`EventName` can only be derived for an enum",
            ))
        }
    };

    let ident = &input.ident;

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let arms = data.variants.iter().map(|variant| {
        let variant_ident = &variant.ident;

        let name = variant_name(variant_ident);

        quote! {
            #ident::#variant_ident { .. } => #name
        }
    });

    Ok(quote! {
        impl #impl_generics #ident #ty_generics #where_clause {
            /// Get the name of this enumeration's variant
            pub fn name(&self) -> &'static str {
                match self {
                    #(#arms,)*
                }
            }
        }
    })
}
