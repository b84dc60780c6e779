//! Accounts source for scheduled daily runs.
//!
//! The file groups subjects under `[platform]` headers, one subject per
//! line. Blank lines and `#` comments are ignored; subjects appearing before
//! any recognised header, or under an unknown header, are skipped with a
//! warning.

use std::collections::BTreeMap;
use std::path::Path;

use crate::platform::Platform;
use crate::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountsFile {
    pub accounts: BTreeMap<Platform, Vec<String>>,
}

impl AccountsFile {
    #[must_use]
    pub fn for_platform(&self, platform: Platform) -> &[String] {
        self.accounts
            .get(&platform)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Platforms that have at least one subject listed.
    pub fn non_empty(&self) -> impl Iterator<Item = (Platform, &[String])> {
        self.accounts
            .iter()
            .filter(|(_, subjects)| !subjects.is_empty())
            .map(|(p, subjects)| (*p, subjects.as_slice()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.non_empty().next().is_none()
    }
}

/// Read and parse an accounts file.
///
/// # Errors
///
/// Returns [`ConfigError::FileIo`] if the file cannot be read.
pub fn load_accounts(path: &Path) -> Result<AccountsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(parse_accounts(&content))
}

#[must_use]
pub fn parse_accounts(content: &str) -> AccountsFile {
    let mut accounts: BTreeMap<Platform, Vec<String>> = BTreeMap::new();
    let mut current: Option<Platform> = None;

    for (line_no, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = match header.parse::<Platform>() {
                Ok(p) => Some(p),
                Err(reason) => {
                    tracing::warn!(line = line_no + 1, %reason, "skipping accounts section");
                    None
                }
            };
            continue;
        }

        match current {
            Some(platform) => {
                let subjects = accounts.entry(platform).or_default();
                if !subjects.iter().any(|s| s == line) {
                    subjects.push(line.to_string());
                }
            }
            None => {
                tracing::warn!(
                    line = line_no + 1,
                    subject = line,
                    "subject outside a known [platform] section; skipping"
                );
            }
        }
    }

    AccountsFile { accounts }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn parses_sections_comments_and_blank_lines() {
        let file = parse_accounts(
            "# daily accounts\n[instagram]\nnasa\n\n  natgeo  \n[Twitter]\n# comment\nelonmusk\n",
        );
        assert_eq!(file.for_platform(Platform::Instagram), ["nasa", "natgeo"]);
        assert_eq!(file.for_platform(Platform::Twitter), ["elonmusk"]);
        assert!(file.for_platform(Platform::Threads).is_empty());
    }

    #[test]
    fn unknown_section_subjects_are_skipped() {
        let file = parse_accounts("[myspace]\ntom\n[threads]\nzuck\n");
        assert_eq!(file.accounts.len(), 1);
        assert_eq!(file.for_platform(Platform::Threads), ["zuck"]);
    }

    #[test]
    fn subjects_before_any_header_are_skipped() {
        let file = parse_accounts("orphan\n[facebook]\nmeta\n");
        assert_eq!(file.for_platform(Platform::Facebook), ["meta"]);
    }

    #[test]
    fn duplicate_subjects_are_collapsed() {
        let file = parse_accounts("[instagram]\nnasa\nnasa\n");
        assert_eq!(file.for_platform(Platform::Instagram), ["nasa"]);
    }

    #[test]
    fn empty_file_is_empty() {
        assert!(parse_accounts("# nothing here\n[instagram]\n").is_empty());
    }

    #[test]
    fn load_accounts_reads_from_disk() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "[twitter]\nnasa").unwrap();
        let file = load_accounts(tmp.path()).unwrap();
        assert_eq!(file.for_platform(Platform::Twitter), ["nasa"]);
    }

    #[test]
    fn load_accounts_missing_file_is_io_error() {
        let err = load_accounts(Path::new("/definitely/not/here/accounts.txt")).unwrap_err();
        assert!(matches!(err, ConfigError::FileIo { .. }));
    }
}
