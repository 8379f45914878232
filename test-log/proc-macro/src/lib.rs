#![deny(rustdoc::broken_intra_doc_links, missing_docs)]

//! A replacement `#[test]` attribute that initializes tracing before the test body runs.

use proc_macro::TokenStream;
use quote::quote;
use syn::{
    parse::Parser, parse_macro_input, parse_quote, punctuated::Punctuated, ItemFn, Meta, Stmt,
    Token,
};

/// Marks a test and initializes logging for it.
///
/// Without arguments it expands to the standard `#[test]`. A single argument names the
/// test attribute to wrap, which is how async tests are written:
///
/// ```rust,ignore
/// use ballot_test_log::test;
///
/// #[test(tokio::test)]
/// async fn it_still_works() {
///   // ...
/// }
/// ```
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = match Punctuated::<Meta, Token![,]>::parse_terminated.parse(attr) {
        Ok(args) => args,
        Err(error) => return error.to_compile_error().into(),
    };
    let mut function = parse_macro_input!(item as ItemFn);

    let inner_test: Meta = match args.len() {
        0 => parse_quote! { ::core::prelude::v1::test },
        1 => args[0].clone(),
        _ => {
            return syn::Error::new_spanned(args, "expected at most one test attribute")
                .to_compile_error()
                .into()
        }
    };

    let initialize: Stmt = parse_quote! { ::ballot_test_log::initialize(); };
    function.block.stmts.insert(0, initialize);

    quote! {
        #[#inner_test]
        #function
    }
    .into()
}
