use crate::error::{ExtractError, Result};
use crate::profile::directives::{Directive, ProfileEntry, parse_directive};
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Site profile file parser.
///
/// A file holds one or more entries. Each entry starts with a `pattern:`
/// line and collects the directives that follow it.
#[derive(Debug)]
pub struct ProfileParser;

impl ProfileParser {
    /// Parse a single profile file
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Vec<ProfileEntry>> {
        let file = std::fs::File::open(&path).map_err(|e| {
            ExtractError::ProfileError(format!("Cannot open file {}: {}", path.as_ref().display(), e))
        })?;

        Self::parse_reader(BufReader::new(file))
    }

    /// Parse profiles from a reader
    pub fn parse_reader<R: BufRead>(reader: R) -> Result<Vec<ProfileEntry>> {
        let mut lines = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line =
                line.map_err(|e| ExtractError::ProfileError(format!("Read error at line {}: {}", index + 1, e)))?;
            lines.push(line);
        }
        Self::parse_lines(lines.iter().map(String::as_str))
    }

    /// Parse profiles from a string
    pub fn parse_string(content: &str) -> Result<Vec<ProfileEntry>> {
        Self::parse_lines(content.lines())
    }

    fn parse_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Result<Vec<ProfileEntry>> {
        let mut entries: Vec<ProfileEntry> = Vec::new();

        for (index, line) in lines.enumerate() {
            let line_number = index + 1;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let directive = parse_directive(line).map_err(|e| {
                ExtractError::ProfileError(format!("Parse error at line {}: {}", line_number, e))
            })?;

            match directive {
                Directive::Pattern(pattern) => entries.push(ProfileEntry::new(pattern)),
                other => match entries.last_mut() {
                    Some(entry) => entry.apply(other),
                    None => {
                        return Err(ExtractError::ProfileError(format!(
                            "Parse error at line {}: directive before any pattern",
                            line_number
                        )));
                    }
                },
            }
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::SiteRule;
    use std::io::Cursor;

    #[test]
    fn test_parse_string_basic() {
        let content = r#"
# State procurement portal
pattern: bids.example.gov
timeout: 45000
retries: 5
rule: embedded_json
http_header(Referer): https://bids.example.gov/
"#;

        let entries = ProfileParser::parse_string(content).unwrap();

        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.pattern, "bids.example.gov");
        assert_eq!(entry.timeout_ms, Some(45_000));
        assert_eq!(entry.max_retries, Some(5));
        assert_eq!(entry.rule, Some(SiteRule::EmbeddedJson));
        assert_eq!(entry.http_headers.len(), 1);
    }

    #[test]
    fn test_parse_string_multiple_entries() {
        let content = r#"
pattern: alpha.gov
retries: 1

pattern: beta.us
encoding: windows-1252
"#;

        let entries = ProfileParser::parse_string(content).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].max_retries, Some(1));
        assert_eq!(entries[1].encoding.as_deref(), Some("windows-1252"));
        assert_eq!(entries[1].max_retries, None);
    }

    #[test]
    fn test_parse_string_directive_before_pattern() {
        let err = ProfileParser::parse_string("timeout: 1000\npattern: x.gov").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_parse_string_reports_line_number() {
        let err = ProfileParser::parse_string("pattern: x.gov\n\nretries: lots").unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_parse_reader() {
        let reader = Cursor::new("pattern: nsf.gov\ntimeout: 10000\n");
        let entries = ProfileParser::parse_reader(reader).unwrap();
        assert_eq!(entries[0].timeout_ms, Some(10_000));
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.txt");
        std::fs::write(&path, "pattern: state.example.us\nretries: 2\n").unwrap();

        let entries = ProfileParser::parse_file(&path).unwrap();
        assert_eq!(entries[0].max_retries, Some(2));
        assert!(ProfileParser::parse_file(dir.path().join("missing.txt")).is_err());
    }
}
