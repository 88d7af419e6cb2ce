use crate::error::Result;
use crate::profile::SiteProfile;
use crate::profile::SiteRule;
use crate::profile::directives::ProfileEntry;
use crate::profile::parser::ProfileParser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use url::Url;

/// Maps URLs to site profiles.
///
/// Entries are checked in order and the first whose pattern is a substring
/// of the host wins. Custom entries sit ahead of the built-in table, and a
/// host matching nothing gets [`SiteProfile::default`].
#[derive(Debug, Clone)]
pub struct ProfileResolver {
    entries: Vec<ProfileEntry>,
}

impl ProfileResolver {
    /// Resolver with only the built-in profiles
    pub fn new() -> Self {
        Self { entries: builtin_entries() }
    }

    /// Resolver with `custom` entries ahead of the built-in profiles
    pub fn with_entries(custom: Vec<ProfileEntry>) -> Self {
        let mut entries = custom;
        entries.extend(builtin_entries());
        Self { entries }
    }

    /// Load every `*.txt` file in `dir` as custom entries.
    ///
    /// Files that fail to parse are logged and skipped. Only an unreadable
    /// directory is an error.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir.as_ref())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "txt"))
            .collect();
        files.sort();

        let mut custom = Vec::new();
        for path in &files {
            match ProfileParser::parse_file(path) {
                Ok(entries) => {
                    debug!(file = %path.display(), count = entries.len(), "loaded site profiles");
                    custom.extend(entries);
                }
                Err(e) => warn!(file = %path.display(), error = %e, "skipping site profile file"),
            }
        }

        Ok(Self::with_entries(custom))
    }

    /// Built-in profiles plus any found in the user config directory
    pub fn from_default_dir() -> Self {
        match Self::default_dir() {
            Some(dir) if dir.is_dir() => Self::load_dir(&dir).unwrap_or_else(|e| {
                warn!(dir = %dir.display(), error = %e, "cannot read profile directory");
                Self::new()
            }),
            _ => Self::new(),
        }
    }

    /// `<config dir>/grantscope/profiles`
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("grantscope").join("profiles"))
    }

    /// Profile for a URL. Never fails: unmatched or host-less URLs get the default.
    pub fn resolve(&self, url: &Url) -> SiteProfile {
        let Some(host) = url.host_str() else {
            return SiteProfile::default();
        };
        let host = host.to_lowercase();

        self.entries
            .iter()
            .find(|entry| entry.matches(&host))
            .map(ProfileEntry::to_profile)
            .unwrap_or_default()
    }

    pub fn entries(&self) -> &[ProfileEntry] {
        &self.entries
    }
}

impl Default for ProfileResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn builtin_entries() -> Vec<ProfileEntry> {
    vec![
        ProfileEntry::new("grants.gov").timeout_ms(30_000).max_retries(3).rule(SiteRule::GrantsGovTable),
        ProfileEntry::new("sam.gov").timeout_ms(30_000).max_retries(3).rule(SiteRule::EmbeddedJson),
        ProfileEntry::new("usaspending.gov").timeout_ms(30_000).max_retries(3).rule(SiteRule::EmbeddedJson),
        ProfileEntry::new("nsf.gov").timeout_ms(20_000).max_retries(3),
        ProfileEntry::new("nih.gov").timeout_ms(20_000).max_retries(3),
        ProfileEntry::new(".gov").timeout_ms(25_000).max_retries(4),
        ProfileEntry::new(".mil").timeout_ms(25_000).max_retries(4),
        ProfileEntry::new(".us").timeout_ms(30_000).max_retries(4).encoding("windows-1252"),
    ]
}
