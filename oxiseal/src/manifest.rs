//! Jar manifest handling.
//!
//! A manifest is a main section of `Name: value` attributes followed by
//! optional per-entry sections, each separated by a blank line. Lines are
//! at most 72 bytes; longer values continue on lines starting with a
//! single space. Attribute names compare case-insensitively.

use oxiseal_core::error::{OxiSealError, Result};

/// Path of the manifest entry.
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Attribute naming the application entry point.
pub const MAIN_CLASS: &str = "Main-Class";

const MAX_LINE: usize = 72;

/// Ordered attribute list of one section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    /// Value of `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set `name`, keeping its position if it already exists.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    /// Remove `name`, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let pos = self
            .entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(pos).1)
    }

    /// Attributes in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the section has no attributes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How the last section of a manifest ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trailer {
    /// Last line has no terminator.
    Bare,
    /// Last line is terminated.
    Newline,
    /// Terminated and followed by a blank line.
    BlankLine,
}

/// Parsed manifest.
///
/// The line terminator of the source and the way it ends are kept, so a
/// manifest folded at 72 bytes serializes back to the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Main section.
    pub main: Attributes,
    /// Per-entry sections, in order.
    pub sections: Vec<Attributes>,
    newline: &'static str,
    trailer: Trailer,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            main: Attributes::default(),
            sections: Vec::new(),
            newline: "\r\n",
            trailer: Trailer::BlankLine,
        }
    }
}

impl Manifest {
    /// Parse manifest bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|e| OxiSealError::invalid_header(format!("manifest is not UTF-8: {}", e)))?;

        let mut manifest = Manifest::default();
        if text.is_empty() {
            return Ok(manifest);
        }
        if !text.contains("\r\n") && text.contains('\n') {
            manifest.newline = "\n";
        }
        let last_line = text
            .strip_suffix('\n')
            .map(|rest| rest.strip_suffix('\r').unwrap_or(rest));
        manifest.trailer = match last_line {
            None => Trailer::Bare,
            Some(rest) if rest.ends_with('\n') => Trailer::BlankLine,
            Some(_) => Trailer::Newline,
        };

        let mut current = Attributes::default();
        let mut in_main = true;

        for (number, line) in text.split('\n').enumerate() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                if in_main {
                    manifest.main = std::mem::take(&mut current);
                    in_main = false;
                } else if !current.is_empty() {
                    manifest.sections.push(std::mem::take(&mut current));
                }
                continue;
            }
            if let Some(continuation) = line.strip_prefix(' ') {
                let last = current.entries.last_mut().ok_or_else(|| {
                    OxiSealError::invalid_header(format!(
                        "manifest line {}: continuation without attribute",
                        number + 1
                    ))
                })?;
                last.1.push_str(continuation);
                continue;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                OxiSealError::invalid_header(format!(
                    "manifest line {}: missing ':'",
                    number + 1
                ))
            })?;
            let value = value.strip_prefix(' ').unwrap_or(value);
            current.entries.push((name.to_string(), value.to_string()));
        }

        if in_main {
            manifest.main = current;
        } else if !current.is_empty() {
            manifest.sections.push(current);
        }
        Ok(manifest)
    }

    /// Serialize with 72-byte folding, using the terminator and ending of
    /// the parsed source (CRLF and a closing blank line for a new manifest).
    pub fn to_bytes(&self) -> Vec<u8> {
        let newline = self.newline;
        let mut out = String::new();
        write_section(&mut out, &self.main, newline);
        for section in &self.sections {
            out.push_str(newline);
            write_section(&mut out, section, newline);
        }
        match self.trailer {
            Trailer::BlankLine => out.push_str(newline),
            Trailer::Newline => {}
            Trailer::Bare => {
                if out.ends_with(newline) {
                    out.truncate(out.len() - newline.len());
                }
            }
        }
        out.into_bytes()
    }
}

fn write_section(out: &mut String, attributes: &Attributes, newline: &str) {
    for (name, value) in attributes.iter() {
        let line = format!("{}: {}", name, value);
        let mut rest = line.as_str();
        let mut limit = MAX_LINE;
        loop {
            if rest.len() <= limit {
                out.push_str(rest);
                out.push_str(newline);
                break;
            }
            let mut cut = limit;
            while !rest.is_char_boundary(cut) {
                cut -= 1;
            }
            out.push_str(&rest[..cut]);
            out.push_str(newline);
            out.push(' ');
            rest = &rest[cut..];
            // The leading space counts toward the next line.
            limit = MAX_LINE - 1;
        }
    }
}

/// Redirects `Main-Class` to a bootstrap entry point and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPatcher {
    backup_attribute: String,
    bootstrap_main_class: String,
}

impl ManifestPatcher {
    /// Patcher using the given attribute names.
    pub fn new(backup_attribute: &str, bootstrap_main_class: &str) -> Self {
        Self {
            backup_attribute: backup_attribute.to_string(),
            bootstrap_main_class: bootstrap_main_class.to_string(),
        }
    }

    /// Attribute that keeps the original entry point.
    pub fn backup_attribute(&self) -> &str {
        &self.backup_attribute
    }

    /// Move `Main-Class` to the backup attribute and point it at the
    /// bootstrap class. Returns `false` when there is no `Main-Class`.
    ///
    /// Patching twice would back up the bootstrap class; callers patch once.
    pub fn patch(&self, manifest: &mut Manifest) -> bool {
        let Some(original) = manifest.main.get(MAIN_CLASS).map(str::to_string) else {
            return false;
        };
        manifest.main.set(&self.backup_attribute, original);
        manifest.main.set(MAIN_CLASS, self.bootstrap_main_class.as_str());
        true
    }

    /// Undo [`ManifestPatcher::patch`]. Returns `false` when there is no
    /// backup attribute.
    pub fn restore(&self, manifest: &mut Manifest) -> bool {
        let Some(original) = manifest.main.remove(&self.backup_attribute) else {
            return false;
        };
        manifest.main.set(MAIN_CLASS, original);
        true
    }
}

impl Default for ManifestPatcher {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_BACKUP_ATTRIBUTE,
            crate::config::DEFAULT_BOOTSTRAP_MAIN_CLASS,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = b"Manifest-Version: 1.0\r\nMain-Class: com.acme.App\r\nCreated-By: 17 (Acme)\r\n\r\nName: com/acme/App.class\r\nSealed: true\r\n\r\n";

    #[test]
    fn test_parse_and_serialize_identity() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        assert_eq!(manifest.main.get("main-class"), Some("com.acme.App"));
        assert_eq!(manifest.sections.len(), 1);
        assert_eq!(manifest.sections[0].get("Sealed"), Some("true"));
        assert_eq!(manifest.to_bytes(), SAMPLE);
    }

    #[test]
    fn test_lf_and_missing_trailing_blank() {
        let manifest = Manifest::parse(b"Manifest-Version: 1.0\nMain-Class: a.B").unwrap();
        assert_eq!(manifest.main.get(MAIN_CLASS), Some("a.B"));
        assert!(manifest.sections.is_empty());
        assert_eq!(manifest.to_bytes(), b"Manifest-Version: 1.0\nMain-Class: a.B");
    }

    #[test]
    fn test_line_endings_survive_patch_and_restore() {
        let patcher = ManifestPatcher::default();
        for source in [
            &b"Manifest-Version: 1.0\nMain-Class: com.acme.App\n"[..],
            b"Manifest-Version: 1.0\nMain-Class: com.acme.App\n\nName: a/B.class\nSealed: true\n",
            b"Manifest-Version: 1.0\r\nMain-Class: com.acme.App\r\n",
            b"Manifest-Version: 1.0\r\nMain-Class: com.acme.App",
        ] {
            let mut manifest = Manifest::parse(source).unwrap();
            assert_eq!(manifest.to_bytes(), source);
            assert!(patcher.patch(&mut manifest));
            let patched = Manifest::parse(&manifest.to_bytes()).unwrap();
            assert_eq!(patched, manifest);
            assert!(patcher.restore(&mut manifest));
            assert_eq!(manifest.to_bytes(), source);
        }
    }

    #[test]
    fn test_lf_folding() {
        let mut manifest = Manifest::parse(b"Manifest-Version: 1.0\n").unwrap();
        manifest.main.set("Class-Path", "x.jar ".repeat(30));
        let bytes = manifest.to_bytes();
        assert!(!bytes.contains(&b'\r'));
        assert_eq!(Manifest::parse(&bytes).unwrap(), manifest);
    }

    #[test]
    fn test_long_values_fold_and_unfold() {
        let mut manifest = Manifest::default();
        let long = "lib/".to_string() + &"very-long-dependency-name.jar ".repeat(10);
        manifest.main.set("Manifest-Version", "1.0");
        manifest.main.set("Class-Path", long.as_str());
        let bytes = manifest.to_bytes();
        for line in bytes.split(|&b| b == b'\n') {
            assert!(line.len() <= MAX_LINE + 1, "{}", line.len());
        }
        assert_eq!(Manifest::parse(&bytes).unwrap(), manifest);
    }

    #[test]
    fn test_fold_keeps_utf8_intact() {
        let mut manifest = Manifest::default();
        manifest.main.set("Implementation-Title", "é".repeat(60));
        let bytes = manifest.to_bytes();
        assert_eq!(Manifest::parse(&bytes).unwrap(), manifest);
    }

    #[test]
    fn test_malformed() {
        assert!(Manifest::parse(b"no colon here\r\n").is_err());
        assert!(Manifest::parse(b" leading continuation\r\n").is_err());
        assert!(Manifest::parse(&[0xFF, 0xFE]).is_err());
    }

    #[test]
    fn test_patch_and_restore() {
        let patcher = ManifestPatcher::default();
        let mut manifest = Manifest::parse(SAMPLE).unwrap();
        assert!(patcher.patch(&mut manifest));
        assert_eq!(
            manifest.main.get(MAIN_CLASS),
            Some("io.oxiseal.boot.SealLauncher")
        );
        assert_eq!(manifest.main.get("Boot-Main-Class"), Some("com.acme.App"));

        assert!(patcher.restore(&mut manifest));
        assert_eq!(manifest.to_bytes(), SAMPLE);
        assert!(!patcher.restore(&mut manifest));
    }

    #[test]
    fn test_patch_without_main_class() {
        let patcher = ManifestPatcher::default();
        let mut manifest = Manifest::parse(b"Manifest-Version: 1.0\r\n\r\n").unwrap();
        assert!(!patcher.patch(&mut manifest));
        assert_eq!(manifest.main.len(), 1);
    }
}
