#![allow(unused_macros)]
///
/// **Note**: These macros (`otel_info!`, `otel_warn!`, `otel_debug!`, and `otel_error!`) are intended to be used
/// **internally within the web SDK crates** or by transport clients and other plugins. They are not designed
/// for general application logging and should not be used for that purpose.
///
/// When running tests with `--nocapture`, these macros will print their output to stdout.
///
/// The `internal-logs` feature is resolved in the *calling* crate, so every crate using the
/// macros carries its own `internal-logs` feature forwarding to `opentelemetry-web/internal-logs`.
#[doc(hidden)]
#[macro_export]
macro_rules! __otel_internal_log {
    ($level:ident, $label:literal, name: $name:expr $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::$level!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name);
        }

        #[cfg(test)]
        {
            print!("{}: name={}\n", $label, $name);
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = $name;
        }
    };
    ($level:ident, $label:literal, name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::$level!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name, $($key = $value),+);
        }

        #[cfg(test)]
        {
            print!("{}: name={}", $label, $name);
            $(
                print!(", {}={}", stringify!($key), $value);
            )+
            print!("\n");
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = ($name, $($value),+);
        }
    };
}

/// Logs an informational diagnostic.
///
/// # Example:
/// ```rust
/// use opentelemetry_web::otel_info;
/// otel_info!(name: "Sender.Initialized", transports = "fetch,xhr");
/// ```
#[macro_export]
macro_rules! otel_info {
    ($($args:tt)+) => {
        $crate::__otel_internal_log!(info, "otel_info", $($args)+)
    };
}

/// Logs a warning diagnostic.
///
/// # Example:
/// ```rust
/// use opentelemetry_web::otel_warn;
/// otel_warn!(name: "Sender.BeaconFallback", url = "https://example.com/v2/track");
/// ```
#[macro_export]
macro_rules! otel_warn {
    ($($args:tt)+) => {
        $crate::__otel_internal_log!(warn, "otel_warn", $($args)+)
    };
}

/// Logs a debug diagnostic.
///
/// # Example:
/// ```rust
/// use opentelemetry_web::otel_debug;
/// otel_debug!(name: "AttributeContainer.Created", id = "span.1");
/// ```
#[macro_export]
macro_rules! otel_debug {
    ($($args:tt)+) => {
        $crate::__otel_internal_log!(debug, "otel_debug", $($args)+)
    };
}

/// Logs an error diagnostic.
///
/// # Example:
/// ```rust
/// use opentelemetry_web::otel_error;
/// otel_error!(name: "Sender.CallbackPanicked", message = "completion callback panicked");
/// ```
#[macro_export]
macro_rules! otel_error {
    ($($args:tt)+) => {
        $crate::__otel_internal_log!(error, "otel_error", $($args)+)
    };
}
