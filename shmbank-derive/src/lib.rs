use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Error, Fields, Result};

#[proc_macro_derive(FromShm)]
pub fn derive_from_shm(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let name = input.ident;

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    if let Err(err) = check_repr_c(&input.attrs, &name.span()) {
        return err.into_compile_error().into();
    }

    let from_shm = from_shm_impl(&input.data, false);
    let from_shm_mut = from_shm_impl(&input.data, true);

    let expanded = quote! {
        unsafe impl #impl_generics shmbank::FromShm for #name #ty_generics #where_clause {
            fn from_shm(shm: &shmbank::Shm) -> shmbank::error::Result<&Self> {
                #from_shm
            }

            fn from_shm_mut(shm: &mut shmbank::Shm) -> shmbank::error::Result<&mut Self> {
                #from_shm_mut
            }
        }
    };

    proc_macro::TokenStream::from(expanded)
}

fn from_shm_impl(data: &Data, is_mut: bool) -> TokenStream {
    match *data {
        Data::Struct(ref data) => match data.fields {
            Fields::Named(_) | Fields::Unnamed(_) | Fields::Unit => {
                let (mut_tok, const_tok, method) = if is_mut {
                    (quote! { mut }, quote! { mut }, quote! {as_mut_ptr})
                } else {
                    (quote! {}, quote! { const }, quote! {as_ptr})
                };
                quote! {
                    let size = size_of::<Self>();
                    if shm.len() < size {
                        return Err(shmbank::error::Error::new(shmbank::error::ErrorKind::Size(shm.len())));
                    }
                    let ptr = shm[..size].#method() as *#const_tok Self;
                    if !ptr.is_aligned() {
                        return Err(shmbank::error::Error::new(shmbank::error::ErrorKind::Alignment(align_of::<Self>())));
                    }
                    unsafe { Ok(&#mut_tok *ptr) }
                }
            }
        },
        Data::Enum(_) => unimplemented!(),
        Data::Union(_) => unimplemented!(),
    }
}

fn check_repr_c(attrs: &[Attribute], span: &Span) -> Result<()> {
    let mut has_repr = false;
    let err_msg = "FromShm: struct must be repr(C)";
    for attr in attrs {
        if attr.path().is_ident("repr") {
            has_repr = true;
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("C") {
                    Ok(())
                } else {
                    Err(meta.error(err_msg))
                }
            })?;
        }
    }
    if has_repr {
        Ok(())
    } else {
        Err(Error::new(*span, err_msg))
    }
}
