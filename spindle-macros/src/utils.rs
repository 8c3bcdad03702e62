use proc_macro::{TokenStream, TokenTree};

/// Splits a `TokenStream` into comma-separated arguments.
///
/// Each argument is returned as a `Vec<TokenTree>`.
/// Commas at the top level are used as separators.
pub(crate) fn split_args(input: TokenStream) -> Vec<Vec<TokenTree>> {
    let mut args = Vec::new();
    let mut current = Vec::new();

    for token in input {
        match &token {
            TokenTree::Punct(p) if p.as_char() == ',' => {
                if !current.is_empty() {
                    args.push(current);
                    current = Vec::new();
                }
            }
            _ => current.push(token),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

/// Parses `key = value` attribute options, e.g.
/// `#[spindle::main(task_capacity = 1024)]`.
///
/// Returns the options in order, or an error message naming the first
/// malformed one.
pub(crate) fn parse_options(input: TokenStream) -> Result<Vec<(String, usize)>, String> {
    let mut options = Vec::new();

    for arg in split_args(input) {
        match arg.as_slice() {
            [TokenTree::Ident(key), TokenTree::Punct(eq), TokenTree::Literal(value)]
                if eq.as_char() == '=' =>
            {
                let value = value
                    .to_string()
                    .replace('_', "")
                    .parse::<usize>()
                    .map_err(|_| format!("`{key}` expects an integer, got `{value}`"))?;

                options.push((key.to_string(), value));
            }
            other => {
                let text = other.iter().map(|t| t.to_string()).collect::<String>();
                return Err(format!("unsupported option `{text}`"));
            }
        }
    }

    Ok(options)
}

/// Builds the scheduler construction expression from parsed options.
pub(crate) fn builder_expr(options: &[(String, usize)]) -> Result<String, String> {
    let mut builder = String::from("::spindle::Builder::new()");

    for (key, value) in options {
        match key.as_str() {
            "task_capacity" | "queue_capacity" | "poll_capacity" => {
                builder.push_str(&format!(".{key}({value})"));
            }
            _ => return Err(format!("unknown option `{key}`")),
        }
    }

    builder.push_str(".build()");
    Ok(builder)
}

/// Emits a `compile_error!` carrying `msg`.
pub(crate) fn compile_error(msg: &str) -> TokenStream {
    format!("compile_error!({msg:?});")
        .parse()
        .unwrap_or_default()
}
