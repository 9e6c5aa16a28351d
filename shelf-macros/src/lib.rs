//! Procedural macros for the shelf project.
//!
//! Provides the `#[derive(Entity)]` macro that maps a struct onto stored
//! documents: the type name, the optional primary-key field and the fields
//! stored as blobs are all declared with attributes instead of being wired
//! up by hand.

#[allow(unused_extern_crates)]
extern crate self as shelf_macros;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, LitStr, Path, parse_macro_input};

/// Derives the `Entity` trait for a named-field struct.
///
/// ```ignore
/// #[derive(Serialize, Deserialize, Clone, Entity)]
/// struct User {
///     #[entity(primary_key)]
///     id: String,
///     name: String,
///     #[entity(blob)]
///     avatar: Vec<u8>,
/// }
/// ```
///
/// Struct-level options:
///
/// - `#[entity(type_name = "...")]` overrides the stored type name, which
///   defaults to the struct identifier.
/// - `#[entity(crate = "...")]` names the crate the `Entity` trait is
///   imported from, for use outside the main facade. Defaults to `::shelf`.
///
/// Field-level options:
///
/// - `#[entity(primary_key)]` marks at most one field whose `to_string`
///   value identifies the element.
/// - `#[entity(blob)]` marks a byte-array field stored as a blob outside
///   the document.
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input).unwrap_or_else(|err| err.to_compile_error()).into()
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    let ident = &input.ident;
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(ident, "Entity can only be derived for structs"));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(ident, "Entity requires named fields"));
    };

    let mut type_name: Option<String> = None;
    let mut crate_path: Path = syn::parse_quote!(::shelf);
    for attr in &input.attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("type_name") {
                let name: LitStr = meta.value()?.parse()?;
                type_name = Some(name.value());
                Ok(())
            } else if meta.path.is_ident("crate") {
                let path: LitStr = meta.value()?.parse()?;
                crate_path = path.parse()?;
                Ok(())
            } else {
                Err(meta.error("unsupported entity attribute"))
            }
        })?;
    }

    let mut primary_key: Option<Ident> = None;
    let mut blob_fields: Vec<String> = Vec::new();
    for field in &fields.named {
        let Some(name) = field.ident.clone() else { continue };
        for attr in &field.attrs {
            if !attr.path().is_ident("entity") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("primary_key") {
                    if primary_key.is_some() {
                        return Err(meta.error("only one field may be the primary key"));
                    }
                    primary_key = Some(name.clone());
                    Ok(())
                } else if meta.path.is_ident("blob") {
                    blob_fields.push(name.to_string());
                    Ok(())
                } else {
                    Err(meta.error("unsupported entity attribute"))
                }
            })?;
        }
    }

    let type_name = type_name.unwrap_or_else(|| ident.to_string());
    let primary_key_impl = primary_key.map(|field| {
        quote! {
            fn primary_key(&self) -> ::core::option::Option<::std::string::String> {
                ::core::option::Option::Some(self.#field.to_string())
            }
        }
    });
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics #crate_path::Entity for #ident #ty_generics #where_clause {
            const TYPE_NAME: &'static str = #type_name;
            const BLOB_FIELDS: &'static [&'static str] = &[#(#blob_fields),*];

            #primary_key_impl
        }
    })
}
