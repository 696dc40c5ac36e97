/// Unwraps a `Result` inside a function returning `Option<Result<T>>`.
///
/// `Ok(value)` evaluates to `value`; `Err(e)` returns `Some(Err(e))` from the
/// enclosing function. Used by adapters that expose a fallible cursor (for
/// example a posting list iterator) as a standard `Iterator<Item = Result<T>>`.
#[macro_export]
macro_rules! try_or_ret_some_err {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(err) => return Some(Err(err)),
        }
    };
}
