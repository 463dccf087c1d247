//! Human and JSON rendering shared by the `lts` subcommands.

use serde::Serialize;
use std::io::{self, Write};

/// Shared width for human separators.
pub const RULE_WIDTH: usize = 48;

/// The output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Write a section heading followed by a separator.
pub fn section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    writeln!(w, "{:-<width$}", "", width = RULE_WIDTH)
}

/// Render a left-aligned key/value line.
pub fn kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<20} {}", format!("{key}:"), value.as_ref())
}

/// Print `value` as pretty JSON on one stdout write.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    let mut out = io::stdout().lock();
    writeln!(out, "{rendered}")?;
    Ok(())
}

/// Hex rendering of the first `limit` bytes, with a trailing ellipsis when cut.
pub fn hex_preview(bytes: &[u8], limit: usize) -> String {
    let mut rendered: Vec<String> = bytes.iter().take(limit).map(|b| format!("{b:02x}")).collect();
    if bytes.len() > limit {
        rendered.push("..".to_string());
    }
    rendered.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_preview_truncates_long_buffers() {
        assert_eq!(hex_preview(&[0x00, 0xab, 0x10], 8), "00 ab 10");
        assert_eq!(hex_preview(&[1, 2, 3, 4], 2), "01 02 ..");
        assert_eq!(hex_preview(&[], 4), "");
    }

    #[test]
    fn kv_pads_keys() {
        let mut buf = Vec::new();
        kv(&mut buf, "path", "00/00/0000000000").expect("write");
        let line = String::from_utf8(buf).expect("utf8");
        assert!(line.starts_with("path:"));
        assert!(line.trim_end().ends_with("00/00/0000000000"));
    }
}
