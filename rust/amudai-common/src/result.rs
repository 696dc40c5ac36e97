pub type Result<T> = std::result::Result<T, crate::error::Error>;

/// Verifies a caller-supplied argument, failing with
/// [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument).
#[macro_export]
macro_rules! verify_arg {
    ($name:expr, $expr:expr) => {{
        let result = $expr;
        $crate::result::verify_arg(result, stringify!($name), stringify!($expr))?;
    }};
}

/// Verifies data read from an index structure, failing with
/// [`ErrorKind::IndexCorruption`](crate::error::ErrorKind::IndexCorruption).
#[macro_export]
macro_rules! verify_data {
    ($name:expr, $expr:expr) => {{
        let result = $expr;
        $crate::result::verify_data(result, stringify!($name), stringify!($expr))?;
    }};
}

/// Verifies a predicate description, failing with
/// [`ErrorKind::InvalidPredicate`](crate::error::ErrorKind::InvalidPredicate).
#[macro_export]
macro_rules! verify_predicate {
    ($expr:expr, $($msg:tt)+) => {{
        let result = $expr;
        $crate::result::verify_predicate(result, || format!($($msg)+))?;
    }};
}

#[inline]
pub fn verify_arg(predicate: bool, name: &str, condition: &str) -> Result<()> {
    if predicate {
        Ok(())
    } else {
        invalid_arg(name, condition)
    }
}

#[inline]
pub fn verify_data(predicate: bool, name: &str, condition: &str) -> Result<()> {
    if predicate {
        Ok(())
    } else {
        index_corruption(name, condition)
    }
}

#[inline]
pub fn verify_predicate(predicate: bool, message: impl FnOnce() -> String) -> Result<()> {
    if predicate {
        Ok(())
    } else {
        Err(crate::error::Error::invalid_predicate(message()))
    }
}

#[cold]
pub fn invalid_arg(name: &str, condition: &str) -> Result<()> {
    Err(crate::error::ErrorKind::InvalidArgument {
        name: name.to_string(),
        message: condition.to_string(),
    }
    .into())
}

#[cold]
pub fn index_corruption(name: &str, condition: &str) -> Result<()> {
    Err(crate::error::ErrorKind::IndexCorruption {
        element: name.to_string(),
        message: condition.to_string(),
    }
    .into())
}
