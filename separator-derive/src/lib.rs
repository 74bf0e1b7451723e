use proc_macro::TokenStream;
use proc_macro_crate::{FoundCrate, crate_name};
use quote::quote;
use syn::{
    Attribute, Data, DeriveInput, Error, Fields, GenericArgument, Ident, PathArguments, Type,
    TypePath, parse_macro_input, spanned::Spanned,
};

/// Derive macro for the `Sample` trait.
///
/// Generates `unsafe impl Sample` after checking at compile time that the
/// struct can be copied into a queue slot as raw bytes and read back from
/// arbitrary slot bytes.
///
/// # Compile-Time Checks
///
/// 1. **Struct with stable layout**: only structs with `#[repr(C)]` or
///    `#[repr(transparent)]` are accepted. Enums and unions are rejected
///    because not every bit pattern is a valid discriminant.
///
/// 2. **No generics**: the padding check below needs concrete field types.
///
/// 3. **No forbidden field types**: references, raw pointers, heap and
///    reference-counted types, and primitives with invalid bit patterns
///    (`bool`, `char`, `NonZero*`, `Option`).
///
/// 4. **Recursive**: every field type must implement `Sample` (enforced via
///    generated where clauses).
///
/// 5. **Padding-free**: a const assertion requires the struct size to equal
///    the sum of its field sizes.
///
/// # Example
///
/// ```
/// # use separator::Sample;
/// #[derive(Sample, Clone, Copy)]
/// #[repr(C)]
/// struct Complex16 {
///     re: i16,
///     im: i16,
/// }
/// ```
#[proc_macro_derive(Sample)]
pub fn derive_sample(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_sample_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn get_crate_path() -> proc_macro2::TokenStream {
    match crate_name("separator") {
        Ok(FoundCrate::Name(name)) => {
            let ident = syn::Ident::new(&name, proc_macro2::Span::call_site());
            quote!(::#ident)
        }
        // The library names itself `separator` via `extern crate self`.
        Ok(FoundCrate::Itself) | Err(_) => quote!(::separator),
    }
}

fn derive_sample_impl(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    check_repr(input)?;
    check_no_generics(input)?;

    let field_types = get_field_types(input)?;
    field_types.iter().try_for_each(check_types)?;

    let name = &input.ident;
    let crate_path = get_crate_path();

    let bounds = field_types.iter().map(|ty| {
        quote! { #ty: #crate_path::__SamplePrivate }
    });
    let sizes = field_types.iter().map(|ty| {
        quote! { ::core::mem::size_of::<#ty>() }
    });
    let padding_msg = format!("`{name}` has padding bytes; Sample types must be padding-free");

    Ok(quote! {
        unsafe impl #crate_path::__SamplePrivate for #name
        where
            #(#bounds,)*
        {}

        const _: () = ::core::assert!(
            ::core::mem::size_of::<#name>() == 0 #(+ #sizes)*,
            #padding_msg
        );
    })
}

fn has_valid_repr(attr: &Attribute) -> syn::Result<bool> {
    if !attr.path().is_ident("repr") {
        return Ok(false);
    }

    let mut valid = false;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("C") || meta.path.is_ident("transparent") {
            valid = true;
        }
        // Skip arguments such as `align(8)` so parsing does not fail on them.
        if meta.input.peek(syn::token::Paren) {
            let _content;
            syn::parenthesized!(_content in meta.input);
        }
        Ok(())
    })?;

    Ok(valid)
}

fn check_repr(input: &DeriveInput) -> syn::Result<()> {
    let mut has_valid = false;
    for attr in &input.attrs {
        has_valid |= has_valid_repr(attr)?;
    }

    if !has_valid {
        return Err(Error::new(
            input.ident.span(),
            "Sample requires #[repr(C)] or #[repr(transparent)]\n\
             help: add #[repr(C)] above this struct",
        ));
    }
    Ok(())
}

fn check_no_generics(input: &DeriveInput) -> syn::Result<()> {
    if input.generics.params.is_empty() {
        Ok(())
    } else {
        Err(Error::new(
            input.generics.span(),
            "Sample cannot be derived for generic structs\n\
             help: implement Sample manually for each concrete instantiation",
        ))
    }
}

fn get_field_types(input: &DeriveInput) -> syn::Result<Vec<Type>> {
    match &input.data {
        Data::Struct(data) => Ok(match &data.fields {
            Fields::Named(fields) => fields.named.iter().map(|f| f.ty.clone()).collect(),
            Fields::Unnamed(fields) => fields.unnamed.iter().map(|f| f.ty.clone()).collect(),
            Fields::Unit => Vec::new(),
        }),
        Data::Enum(data) => Err(Error::new(
            data.enum_token.span,
            "Sample cannot be derived for enums: not every byte pattern is a valid variant",
        )),
        Data::Union(data) => Err(Error::new(
            data.union_token.span,
            "Sample cannot be derived for unions",
        )),
    }
}

fn check_types(field_ty: &Type) -> syn::Result<()> {
    fn walk(ty: &Type, field_ty: &Type) -> syn::Result<()> {
        match ty {
            Type::Path(TypePath { path, .. }) => {
                for segment in &path.segments {
                    check_forbidden_type(&segment.ident, field_ty)?;
                    if let PathArguments::AngleBracketed(args) = &segment.arguments {
                        for arg in &args.args {
                            if let GenericArgument::Type(inner_ty) = arg {
                                walk(inner_ty, field_ty)?;
                            }
                        }
                    }
                }
                Ok(())
            }
            Type::Reference(_) | Type::Ptr(_) => Err(Error::new(
                ty.span(),
                format!(
                    "Field type `{}` is a reference or pointer.\n\
                     Sample values must be fully described by their bytes.\n\
                     help: store the pointed-to data inline",
                    quote!(#field_ty),
                ),
            )),
            Type::Tuple(tuple) if !tuple.elems.is_empty() => Err(Error::new(
                tuple.span(),
                "tuples have no stable layout\n\
                 help: use an array or a nested #[repr(C)] struct",
            )),
            Type::Array(array) => walk(&array.elem, field_ty),
            Type::Group(group) => walk(&group.elem, field_ty),
            Type::Paren(paren) => walk(&paren.elem, field_ty),
            _ => Ok(()),
        }
    }

    walk(field_ty, field_ty)
}

fn check_forbidden_type(ident: &Ident, field_ty: &Type) -> syn::Result<()> {
    const HEAP_TYPES: &[&str] = &[
        "Vec", "Box", "String", "PathBuf", "OsString", "CString", "Rc", "Arc",
    ];
    const INVALID_BIT_PATTERNS: &[&str] = &["bool", "char", "Option"];

    let name = ident.to_string();
    let reason = if HEAP_TYPES.contains(&name.as_str()) {
        Some("owns heap memory")
    } else if INVALID_BIT_PATTERNS.contains(&name.as_str()) || name.starts_with("NonZero") {
        Some("does not accept every bit pattern")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::new(
            ident.span(),
            format!(
                "Field type `{}` contains `{}` which {}.\n\
                 help: use fixed-size integers, floats or arrays of them",
                quote!(#field_ty),
                ident,
                reason,
            ),
        )),
        None => Ok(()),
    }
}
