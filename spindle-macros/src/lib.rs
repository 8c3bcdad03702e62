mod utils;

use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

/// Rewrites `async fn name(..) { body }` into a synchronous function whose
/// body runs `body` on a fresh scheduler with `block_on`.
///
/// Returns the rewritten tokens, or a `compile_error!`.
fn rewrite(attr: TokenStream, item: TokenStream, on_error: &str) -> Result<Vec<TokenTree>, TokenStream> {
    let options = utils::parse_options(attr).map_err(|e| utils::compile_error(&e))?;
    let builder = utils::builder_expr(&options).map_err(|e| utils::compile_error(&e))?;

    let mut tokens: Vec<TokenTree> = item.into_iter().collect();

    let Some(async_pos) = tokens
        .iter()
        .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "async"))
    else {
        return Err(utils::compile_error(
            "the `async` keyword is missing from the function declaration",
        ));
    };
    tokens.remove(async_pos);

    let Some(pos) = tokens
        .iter()
        .rposition(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace))
    else {
        return Err(utils::compile_error("expected a function body"));
    };

    let block = match &tokens[pos] {
        TokenTree::Group(g) => g.stream().to_string(),
        _ => unreachable!(),
    };

    let new_block = format!(
        "{{
            let mut scheduler = {builder};
            match scheduler.block_on(async move {{ {block} }}) {{
                ::core::result::Result::Ok(value) => value,
                ::core::result::Result::Err(err) => ::core::panic!(\"{on_error}: {{}}\", err),
            }}
        }}"
    );

    let stream = new_block
        .parse::<TokenStream>()
        .map_err(|e| utils::compile_error(&format!("spindle macro error: {e}")))?;

    tokens[pos] = TokenTree::Group(Group::new(Delimiter::Brace, stream));

    Ok(tokens)
}

/// Runs an `async fn main` on a spindle scheduler.
///
/// ```rust,ignore
/// #[spindle::main(task_capacity = 1024)]
/// async fn main() {
///     let listener = Listener::bind("127.0.0.1:25000").unwrap();
///     // ...
/// }
/// ```
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    match rewrite(attr, item, "spindle runtime failed") {
        Ok(tokens) => tokens.into_iter().collect(),
        Err(err) => err,
    }
}

/// Runs an `async` test on a fresh spindle scheduler.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let tokens = match rewrite(attr, item, "spindle test runtime failed") {
        Ok(tokens) => tokens,
        Err(err) => return err,
    };

    let test_attr: TokenStream = "#[::core::prelude::v1::test]"
        .parse()
        .unwrap_or_default();
    let mut result: Vec<TokenTree> = test_attr.into_iter().collect();
    result.extend(tokens);

    result.into_iter().collect()
}
