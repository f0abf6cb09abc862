//! Derived root file listing users allowed to run any command on this host.

use bytes::{BufMut, Bytes, BytesMut};

use crate::record::Record;

const SUDO_HOST: &str = "sudoHost";
const SUDO_COMMAND: &str = "sudoCommand";
const SUDO_USER: &str = "sudoUser";
const ALL: &str = "ALL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SudoersPolicy {
    pub hostname: String,
    /// Realm suffix removed from user names, e.g. `@ldap.example.com`.
    pub strip_suffix: Option<String>,
    pub file_name: String,
}

impl SudoersPolicy {
    pub const DEFAULT_FILE_NAME: &'static str = "sudoers.txt";

    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            strip_suffix: None,
            file_name: Self::DEFAULT_FILE_NAME.to_string(),
        }
    }

    pub fn with_strip_suffix(mut self, suffix: Option<String>) -> Self {
        self.strip_suffix = suffix.filter(|s| !s.is_empty());
        self
    }

    /// A rule grants everything on this host if it names the host (or ALL)
    /// and allows the ALL command.
    pub fn applies_to(&self, record: &Record) -> bool {
        let host_matches =
            record.has_value(SUDO_HOST, &self.hostname) || record.has_value(SUDO_HOST, ALL);
        host_matches && record.has_value(SUDO_COMMAND, ALL)
    }

    /// One user per line in record order. Duplicates are kept.
    pub fn render<'r>(&self, records: impl IntoIterator<Item = &'r Record>) -> Bytes {
        let mut out = BytesMut::new();

        for record in records.into_iter().filter(|r| self.applies_to(r)) {
            let Some(users) = record.values(SUDO_USER) else {
                continue;
            };
            for user in users {
                let Ok(user) = std::str::from_utf8(user) else {
                    continue;
                };
                let user = user.trim();
                if user.is_empty() || user.contains(['\n', '\r']) {
                    continue;
                }
                let user = match &self.strip_suffix {
                    Some(suffix) => user.strip_suffix(suffix.as_str()).unwrap_or(user),
                    None => user,
                };
                out.put_slice(user.as_bytes());
                out.put_u8(b'\n');
            }
        }

        out.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(dn: &str, host: &str, command: &str, users: &[&str]) -> Record {
        let mut record = Record::new(dn)
            .with_value("sudoHost", host.to_string())
            .with_value("sudoCommand", command.to_string());
        for user in users {
            record.push_value("sudoUser", user.to_string());
        }
        record
    }

    #[test]
    fn test_render_matching_rules() {
        let policy = SudoersPolicy::new("workstation")
            .with_strip_suffix(Some("@ldap.example.com".to_string()));
        let records = vec![
            rule("cn=admins", "ALL", "ALL", &["alice@ldap.example.com", "bob"]),
            rule("cn=local", "workstation", "ALL", &["carol@ldap.example.com"]),
            rule("cn=other", "server", "ALL", &["mallory"]),
            rule("cn=limited", "ALL", "/usr/bin/apt", &["dave"]),
            rule("cn=again", "ALL", "ALL", &["alice@ldap.example.com"]),
        ];

        let rendered = policy.render(&records);
        assert_eq!(rendered.as_ref(), b"alice\nbob\ncarol\nalice\n");
    }

    #[test]
    fn test_hostname_match_is_case_insensitive() {
        let policy = SudoersPolicy::new("Workstation");
        let record = rule("cn=r", "workstation", "ALL", &["alice"]);
        assert!(policy.applies_to(&record));
    }

    #[test]
    fn test_no_matching_rules() {
        let policy = SudoersPolicy::new("host");
        assert!(policy.render(std::iter::empty()).is_empty());
    }
}
