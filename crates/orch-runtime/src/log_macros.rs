/// Domain-aware logging macros.
///
/// Each macro injects a `domain` field automatically so callers never need
/// to remember the string literal. The domain is one of `sys` (lifecycle),
/// `bus` (change feed), `orch` (reconciliation), `res` (resources), `conf`
/// (configuration).
///
/// # Usage
///
/// ```ignore
/// orch_info!(sys, daemons = 2, "orchd bootstrap complete");
/// orch_warn!(bus, error = %e, "record decode error");
/// ```
///
/// The domain identifier is **not** a string — it is a bare identifier that
/// the macro converts to a `&str` literal.

/// Internal helper. Do not call directly; use `orch_error!` … `orch_trace!`.
#[doc(hidden)]
macro_rules! orch_log {
    ($level:ident, $domain:ident, $($field:tt)*) => {
        tracing::$level!(domain = stringify!($domain), $($field)*)
    };
}

/// Log at ERROR level with an automatic `domain` field.
#[allow(unused_macros)]
macro_rules! orch_error {
    ($domain:ident, $($rest:tt)*) => {
        orch_log!(error, $domain, $($rest)*)
    };
}

/// Log at WARN level with an automatic `domain` field.
macro_rules! orch_warn {
    ($domain:ident, $($rest:tt)*) => {
        orch_log!(warn, $domain, $($rest)*)
    };
}

/// Log at INFO level with an automatic `domain` field.
macro_rules! orch_info {
    ($domain:ident, $($rest:tt)*) => {
        orch_log!(info, $domain, $($rest)*)
    };
}

/// Log at DEBUG level with an automatic `domain` field.
macro_rules! orch_debug {
    ($domain:ident, $($rest:tt)*) => {
        orch_log!(debug, $domain, $($rest)*)
    };
}

/// Log at TRACE level with an automatic `domain` field.
#[allow(unused_macros)]
macro_rules! orch_trace {
    ($domain:ident, $($rest:tt)*) => {
        orch_log!(trace, $domain, $($rest)*)
    };
}
