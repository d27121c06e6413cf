//! ---
//! fb_section: "03-logging"
//! fb_subsection: "module"
//! fb_type: "source"
//! fb_scope: "code"
//! fb_description: "Device-context logging macros."
//! fb_version: "v0.1.0"
//! fb_owner: "tbd"
//! ---
#[doc(hidden)]
#[macro_export]
macro_rules! __fb_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        $crate::__tracing::event!(
            $level,
            device = ctx.device.unwrap_or(""),
            kind = ctx.kind.unwrap_or(""),
            routing_key = ctx.routing_key.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with device context.
#[macro_export]
macro_rules! fb_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__fb_event!($crate::__tracing::Level::INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__fb_event!($crate::__tracing::Level::INFO, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a debug log enriched with device context.
#[macro_export]
macro_rules! fb_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__fb_event!($crate::__tracing::Level::DEBUG, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__fb_event!($crate::__tracing::Level::DEBUG, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a warning enriched with device context.
#[macro_export]
macro_rules! fb_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__fb_event!($crate::__tracing::Level::WARN, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__fb_event!($crate::__tracing::Level::WARN, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit an error log enriched with device context.
#[macro_export]
macro_rules! fb_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__fb_event!($crate::__tracing::Level::ERROR, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__fb_event!($crate::__tracing::Level::ERROR, $crate::LogContext::default(), $($arg)+)
    };
}
