//! Config compiler for zone (`.zon`) and widget (`.mst`/`.ost`) description files
//!
//! Both languages are line oriented. Lines are tokenized on whitespace,
//! double-quoted tokens may embed spaces, `//` outside quotes starts a
//! comment, tabs count as spaces and carriage returns are dropped.

pub mod params;
pub mod widget_file;
pub mod zone_file;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub use params::{parse_color_spec, parse_stepped_spec, ColorSpec, Rgb, SteppedSpec};
pub use widget_file::{compile_widget_file, compile_widget_source, WidgetCompilation, WidgetDefinition};
pub use zone_file::{compile_zone_file, compile_zone_source, ZoneCompilation};

/// Replaced by the 1-based channel index when a template is expanded.
pub const PLACEHOLDER: char = '|';

/// Split one line into tokens.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().filter(|&c| c != '\r').peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let Some(&first) = chars.peek() else {
            break;
        };

        if first == '"' {
            chars.next();
            let mut token = String::new();
            while let Some(c) = chars.next() {
                match c {
                    '"' => break,
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            token.push(escaped);
                        }
                    }
                    _ => token.push(c),
                }
            }
            tokens.push(token);
            continue;
        }

        let mut token = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            if c == '/' && token.ends_with('/') {
                token.pop();
                if !token.is_empty() {
                    tokens.push(token);
                }
                return tokens;
            }
            token.push(c);
            chars.next();
        }
        tokens.push(token);
    }

    tokens
}

/// Recursively collect `.zon` files under `dir`, sorted by path.
pub fn zone_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_files(dir, "zon", &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_files(dir: &Path, extension: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read zone folder: {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, extension, out)?;
        } else if path.extension().is_some_and(|e| e == extension) {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(line: &str) -> Vec<String> {
        tokenize(line)
    }

    #[test]
    fn test_whitespace_and_tabs() {
        assert_eq!(toks("  Fader1\tTrackVolume \r"), ["Fader1", "TrackVolume"]);
        assert!(toks("   ").is_empty());
    }

    #[test]
    fn test_quoted_tokens() {
        assert_eq!(
            toks(r#"Display FixedTextDisplay "Hello World" x"#),
            ["Display", "FixedTextDisplay", "Hello World", "x"]
        );
        assert_eq!(toks(r#""say \"hi\"""#), [r#"say "hi""#]);
        assert_eq!(toks(r#""""#), [""]);
    }

    #[test]
    fn test_comments() {
        assert_eq!(toks("Fader1 TrackVolume // the fader"), ["Fader1", "TrackVolume"]);
        assert_eq!(toks("Fader1 TrackVolume// glued"), ["Fader1", "TrackVolume"]);
        assert!(toks("// whole line").is_empty());
        assert_eq!(toks(r#""a // b" c"#), ["a // b", "c"]);
        assert_eq!(toks("Control /track/1/volume"), ["Control", "/track/1/volume"]);
    }

    #[test]
    fn test_zone_files_in() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        std::fs::create_dir(dir.path().join("FX"))?;
        std::fs::write(dir.path().join("Home.zon"), "")?;
        std::fs::write(dir.path().join("FX").join("ReaEQ.zon"), "")?;
        std::fs::write(dir.path().join("notes.txt"), "")?;

        let files = zone_files_in(dir.path())?;
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().unwrap() == "zon"));
        Ok(())
    }
}
