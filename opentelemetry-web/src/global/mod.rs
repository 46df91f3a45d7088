//! Process-wide diagnostics.
//!
//! The crates in this workspace never surface ordinary failures as panics or
//! returned errors to browser-style callback chains. Instead they report
//! through [`ErrorHandlers`], which can be replaced for the whole process with
//! [`set_error_handlers`] or per component through its configuration.

mod error_handler;
mod internal_logging;

pub use error_handler::{
    error_handlers, invoke_guarded, set_error_handlers, DefaultErrorHandlers, ErrorHandlers,
};
