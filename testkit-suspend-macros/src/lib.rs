//! Procedural macros for testkit-suspend
//!
//! This crate provides the `#[testkit_suspend::test]` attribute macro, which
//! runs an async test body to completion on a fresh deterministic
//! `TestExecutor`.
//!
//! # Example
//!
//! ```rust,ignore
//! use testkit_suspend::prelude::*;
//!
//! #[testkit_suspend::test]
//! async fn my_test(clock: MockClock) {
//!     clock.sleep(Duration::from_secs(10)).await;
//!     assert_eq!(clock.now(), Duration::from_secs(10));
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse::{Parse, ParseStream},
    parse_macro_input, FnArg, Ident, ItemFn, Lit, Pat, Token, Type,
};

/// Configuration options for the test macro.
#[derive(Default)]
struct TestConfig {
    /// "executor" (default) or "tokio"
    runtime: Option<String>,
    /// Initial reading of the virtual clock, in seconds
    start_time_secs: Option<u64>,
}

impl Parse for TestConfig {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut config = TestConfig::default();

        while !input.is_empty() {
            let ident: Ident = input.parse()?;
            input.parse::<Token![=]>()?;
            let lit: Lit = input.parse()?;

            match (ident.to_string().as_str(), lit) {
                ("runtime", Lit::Str(s)) => config.runtime = Some(s.value()),
                ("start_time", Lit::Int(i)) => config.start_time_secs = Some(i.base10_parse()?),
                ("runtime" | "start_time", lit) => {
                    return Err(syn::Error::new_spanned(
                        lit,
                        format!("unexpected value for `{ident}`"),
                    ));
                }
                _ => {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!("unknown attribute: {ident}"),
                    ));
                }
            }

            if input.peek(Token![,]) {
                input.parse::<Token![,]>()?;
            }
        }

        Ok(config)
    }
}

/// Determines if a function parameter is requesting a MockClock.
fn is_clock_param(arg: &FnArg) -> bool {
    if let FnArg::Typed(pat_type) = arg {
        if let Type::Path(type_path) = &*pat_type.ty {
            if let Some(segment) = type_path.path.segments.last() {
                return segment.ident == "MockClock";
            }
        }
    }
    false
}

fn clock_pattern(arg: &FnArg) -> Option<&Pat> {
    match arg {
        FnArg::Typed(pat_type) => Some(&pat_type.pat),
        FnArg::Receiver(_) => None,
    }
}

/// Test attribute macro for deterministic async tests.
///
/// The body runs inside `TestExecutor::block_on`, so tasks it spawns are
/// scheduled FIFO, virtual time advances on its own when every task is
/// parked on a timer, and a test that can never finish fails with a
/// deadlock report instead of hanging.
///
/// # With MockClock Injection
///
/// Add a `clock: MockClock` parameter to receive the executor's clock:
///
/// ```rust,ignore
/// #[testkit_suspend::test]
/// async fn test_with_clock(clock: MockClock) {
///     clock.sleep(Duration::from_secs(60)).await;
///     assert_eq!(clock.now(), Duration::from_secs(60));
/// }
/// ```
///
/// # Configuration Options
///
/// - `start_time = 100` - Start the virtual clock at 100 seconds
/// - `runtime = "tokio"` - Run under `#[tokio::test]` instead; the injected
///   clock is then a standalone `MockClock` (requires the `tokio` feature)
///
/// ```rust,ignore
/// #[testkit_suspend::test(start_time = 1000)]
/// async fn test_start_time(clock: MockClock) {
///     assert_eq!(clock.now(), Duration::from_secs(1000));
/// }
/// ```
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let config = parse_macro_input!(attr as TestConfig);
    let input = parse_macro_input!(item as ItemFn);

    expand_test(&config, &input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_test(config: &TestConfig, input: &ItemFn) -> syn::Result<TokenStream2> {
    let name = &input.sig.ident;
    let body = &input.block;
    let attrs = &input.attrs;
    let vis = &input.vis;
    let output = &input.sig.output;

    if input.sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(
            &input.sig,
            "test function must be async",
        ));
    }

    let mut clock_name = None;
    for arg in &input.sig.inputs {
        if !is_clock_param(arg) {
            return Err(syn::Error::new_spanned(
                arg,
                "only a `MockClock` parameter can be injected",
            ));
        }
        if clock_name.is_some() {
            return Err(syn::Error::new_spanned(arg, "duplicate `MockClock` parameter"));
        }
        clock_name = clock_pattern(arg);
    }

    let start_time = config.start_time_secs.unwrap_or(0);
    let clock = quote! {
        ::testkit_suspend::clock::MockClock::with_start_time(
            ::std::time::Duration::from_secs(#start_time)
        )
    };

    match config.runtime.as_deref().unwrap_or("executor") {
        "executor" => {
            let bind_clock = clock_name.map(|pat| {
                quote! { let #pat = executor.clock(); }
            });
            Ok(quote! {
                #[::core::prelude::v1::test]
                #(#attrs)*
                #vis fn #name() #output {
                    let executor = ::testkit_suspend::executor::TestExecutor::with_clock(#clock);
                    #bind_clock
                    executor.block_on(async move #body)
                }
            })
        }
        "tokio" => {
            let bind_clock = clock_name.map(|pat| {
                quote! { let #pat = #clock; }
            });
            Ok(quote! {
                #[::tokio::test]
                #(#attrs)*
                #vis async fn #name() #output {
                    #bind_clock
                    #body
                }
            })
        }
        other => Err(syn::Error::new(
            proc_macro2::Span::call_site(),
            format!("unsupported runtime: {other}. Use \"executor\" or \"tokio\""),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::{expand_test, TestConfig};

    #[::core::prelude::v1::test]
    fn test_config_parse_empty() {
        let config: TestConfig = syn::parse_str("").unwrap();
        assert!(config.runtime.is_none());
        assert!(config.start_time_secs.is_none());
    }

    #[::core::prelude::v1::test]
    fn test_config_parse_multiple() {
        let config: TestConfig = syn::parse_str("runtime = \"tokio\", start_time = 100").unwrap();
        assert_eq!(config.runtime, Some("tokio".to_string()));
        assert_eq!(config.start_time_secs, Some(100));
    }

    #[::core::prelude::v1::test]
    fn test_config_rejects_unknown_key() {
        assert!(syn::parse_str::<TestConfig>("start_paused = true").is_err());
    }

    #[::core::prelude::v1::test]
    fn test_config_rejects_wrong_literal() {
        assert!(syn::parse_str::<TestConfig>("start_time = \"soon\"").is_err());
    }

    #[::core::prelude::v1::test]
    fn test_expand_rejects_sync_fn() {
        let input: syn::ItemFn = syn::parse_str("fn plain() {}").unwrap();
        assert!(expand_test(&TestConfig::default(), &input).is_err());
    }

    #[::core::prelude::v1::test]
    fn test_expand_rejects_foreign_parameter() {
        let input: syn::ItemFn = syn::parse_str("async fn odd(n: u32) {}").unwrap();
        assert!(expand_test(&TestConfig::default(), &input).is_err());
    }

    #[::core::prelude::v1::test]
    fn test_expand_uses_block_on() {
        let input: syn::ItemFn =
            syn::parse_str("async fn timed(clock: MockClock) { clock.now(); }").unwrap();
        let expanded = expand_test(&TestConfig::default(), &input).unwrap().to_string();
        assert!(expanded.contains("block_on"));
        assert!(expanded.contains("executor . clock ()"));
    }
}
