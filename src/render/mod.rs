// Render module
// Terminal output for status transitions

pub mod status_line;

pub use status_line::{attach, format_status_line, render_status_line};
