//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module.

pub mod index;
pub mod init;
pub mod log;
pub mod query;
pub mod serve;
pub mod workflows;

use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};

/// Table with the shared CLI look.
pub(crate) fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().copied());
    table
}
