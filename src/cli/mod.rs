//! CLI Module
//!
//! Shared pieces of the `gpsmux` command line:
//! - Exit codes for automation
//! - Text/JSON rendering of decoded traffic

pub mod exit_codes;
pub mod format;

pub use exit_codes::{exit_code_description, print_exit_codes, CliResult, ExitCodes};
pub use format::{render_encoded, render_event, render_frame, render_sentence, render_summary, OutputFormat};
