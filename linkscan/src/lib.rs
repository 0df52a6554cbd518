// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    ScanOverrides,
    ScanReport,
    format_status_line,
    is_broken,
    load_profile,
    render_json_report,
    render_text_report,
};
