use crate::middleware::HandlerResult;
use crate::request::RequestContext;

/// A set of named handler methods bound together under one pattern.
///
/// `init` and `shut` run around every method invocation of a request, so a
/// controller can prepare and release per-request state in one place.
///
/// ```rust,ignore
/// struct Users;
///
/// impl Controller for Users {
///     fn methods(&self) -> Vec<&'static str> {
///         vec!["Index", "ShowList"]
///     }
///
///     fn call(&self, method: &str, ctx: &mut RequestContext) -> HandlerResult {
///         match method {
///             "Index" => ctx.response_mut().write("index"),
///             _ => ctx.response_mut().write("list"),
///         }
///         Ok(())
///     }
/// }
///
/// // GET /users, /users/index and /users/show-list
/// server.bind_controller("/users", Users);
/// ```
pub trait Controller: Send + Sync + 'static {
    /// Names of the methods exposed through [`Controller::call`].
    fn methods(&self) -> Vec<&'static str>;

    fn call(&self, method: &str, ctx: &mut RequestContext) -> HandlerResult;

    fn init(&self, _ctx: &mut RequestContext) -> HandlerResult {
        Ok(())
    }

    fn shut(&self, _ctx: &mut RequestContext) -> HandlerResult {
        Ok(())
    }
}

/// Convert a method name into its URI segment: `ShowList` and `show_list`
/// both become `show-list`.
#[must_use]
pub fn method_to_uri(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c == '_' || c == '-' || c == ' ' {
            if !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
            prev_lower = false;
            continue;
        }
        if c.is_ascii_uppercase() {
            if prev_lower && !out.ends_with('-') {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }
    out.trim_end_matches('-').to_string()
}
