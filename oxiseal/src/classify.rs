//! Entry classification.
//!
//! Every entry gets exactly one [`Policy`]. A user [`EntryFilter`] says what
//! the caller wants encrypted; the container profile limits that to the
//! places a class loader can still find the entry through the decrypting
//! launcher. Both must accept.

use crate::config::ContainerProfile;
use crate::index::ControlLayout;
use oxiseal_core::entry::ContainerEntry;
use std::fmt;
use std::sync::Arc;

/// What happens to one entry during transcoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Policy {
    /// Leftover control entry; dropped.
    Skip,
    /// Copied unchanged.
    Passthrough,
    /// Encrypted (files) or recursively transcoded (nested containers).
    Encrypt,
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Skip => "skip",
            Self::Passthrough => "passthrough",
            Self::Encrypt => "encrypt",
        };
        f.write_str(name)
    }
}

/// Predicate over container entries.
///
/// Any `Fn(&ContainerEntry) -> bool` closure is a filter.
pub trait EntryFilter: Send + Sync {
    /// Whether the entry should be encrypted.
    fn accept(&self, entry: &ContainerEntry) -> bool;
}

impl<F> EntryFilter for F
where
    F: Fn(&ContainerEntry) -> bool + Send + Sync,
{
    fn accept(&self, entry: &ContainerEntry) -> bool {
        self(entry)
    }
}

/// Combinators for [`EntryFilter`].
pub trait EntryFilterExt: EntryFilter + Sized {
    /// Both filters accept.
    fn and<O: EntryFilter>(self, other: O) -> And<Self, O> {
        And(self, other)
    }

    /// Either filter accepts.
    fn or<O: EntryFilter>(self, other: O) -> Or<Self, O> {
        Or(self, other)
    }

    /// The filter rejects.
    fn not(self) -> Not<Self> {
        Not(self)
    }
}

impl<T: EntryFilter> EntryFilterExt for T {}

/// Conjunction of two filters.
#[derive(Debug, Clone)]
pub struct And<A, B>(A, B);

impl<A: EntryFilter, B: EntryFilter> EntryFilter for And<A, B> {
    fn accept(&self, entry: &ContainerEntry) -> bool {
        self.0.accept(entry) && self.1.accept(entry)
    }
}

/// Disjunction of two filters.
#[derive(Debug, Clone)]
pub struct Or<A, B>(A, B);

impl<A: EntryFilter, B: EntryFilter> EntryFilter for Or<A, B> {
    fn accept(&self, entry: &ContainerEntry) -> bool {
        self.0.accept(entry) || self.1.accept(entry)
    }
}

/// Negation of a filter.
#[derive(Debug, Clone)]
pub struct Not<A>(A);

impl<A: EntryFilter> EntryFilter for Not<A> {
    fn accept(&self, entry: &ContainerEntry) -> bool {
        !self.0.accept(entry)
    }
}

/// Accepts every entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl EntryFilter for AcceptAll {
    fn accept(&self, _entry: &ContainerEntry) -> bool {
        true
    }
}

/// Accepts entries whose path starts with the given prefix.
#[derive(Debug, Clone)]
pub struct PathPrefix(String);

impl EntryFilter for PathPrefix {
    fn accept(&self, entry: &ContainerEntry) -> bool {
        entry.name.starts_with(&self.0)
    }
}

/// Accepts entries whose path ends with the given suffix.
#[derive(Debug, Clone)]
pub struct PathSuffix(String);

impl EntryFilter for PathSuffix {
    fn accept(&self, entry: &ContainerEntry) -> bool {
        entry.name.ends_with(&self.0)
    }
}

/// Filter on a path prefix, e.g. `prefix("com/acme/")`.
pub fn prefix(prefix: impl Into<String>) -> PathPrefix {
    PathPrefix(prefix.into())
}

/// Filter on a path suffix, e.g. `suffix(".class")`.
pub fn suffix(suffix: impl Into<String>) -> PathSuffix {
    PathSuffix(suffix.into())
}

/// Per-entry policy decisions for one container.
#[derive(Clone)]
pub struct EntryClassifier {
    filter: Arc<dyn EntryFilter>,
    profile: ContainerProfile,
    layout: ControlLayout,
}

impl EntryClassifier {
    /// Classifier for `profile` with a user filter.
    pub fn new<F: EntryFilter + 'static>(profile: ContainerProfile, filter: F) -> Self {
        Self::from_shared(profile, Arc::new(filter))
    }

    fn from_shared(profile: ContainerProfile, filter: Arc<dyn EntryFilter>) -> Self {
        Self {
            filter,
            profile,
            layout: profile.layout(),
        }
    }

    /// Container profile.
    pub fn profile(&self) -> ContainerProfile {
        self.profile
    }

    /// Control entry layout.
    pub fn layout(&self) -> &ControlLayout {
        &self.layout
    }

    /// User filter AND profile safety.
    pub fn filtrate(&self, entry: &ContainerEntry) -> bool {
        self.filter.accept(entry) && self.profile.is_safe(&entry.name)
    }

    /// Decide what happens to `entry`.
    pub fn policy(&self, entry: &ContainerEntry) -> Policy {
        if self.layout.is_control(&entry.name) {
            Policy::Skip
        } else if entry.is_dir() {
            Policy::Passthrough
        } else if self.filtrate(entry) {
            Policy::Encrypt
        } else {
            Policy::Passthrough
        }
    }

    /// Classifier for a container nested inside this one: same user filter,
    /// plain jar layout.
    pub fn nested(&self) -> Self {
        Self::from_shared(ContainerProfile::Jar, Arc::clone(&self.filter))
    }
}

impl fmt::Debug for EntryClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryClassifier")
            .field("profile", &self.profile)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> ContainerEntry {
        ContainerEntry::new(name)
    }

    #[test]
    fn test_jar_policies() {
        let classifier = EntryClassifier::new(ContainerProfile::Jar, AcceptAll);
        assert_eq!(classifier.policy(&entry("a/")), Policy::Passthrough);
        assert_eq!(classifier.policy(&entry("a/Main.class")), Policy::Encrypt);
        assert_eq!(classifier.policy(&entry("lib/x.jar")), Policy::Encrypt);
        assert_eq!(
            classifier.policy(&entry("META-INF/MANIFEST.MF")),
            Policy::Passthrough
        );
        assert_eq!(
            classifier.policy(&entry("META-INF/oxiseal/INDEX.MF")),
            Policy::Skip
        );
        assert_eq!(classifier.policy(&entry("META-INF/oxiseal/")), Policy::Skip);
    }

    #[test]
    fn test_boot_policies() {
        let classifier = EntryClassifier::new(ContainerProfile::Boot, suffix(".class"));
        assert_eq!(
            classifier.policy(&entry("BOOT-INF/classes/a/A.class")),
            Policy::Encrypt
        );
        assert_eq!(
            classifier.policy(&entry("org/springframework/boot/loader/Launcher.class")),
            Policy::Passthrough
        );
        assert_eq!(
            classifier.policy(&entry("BOOT-INF/classes/META-INF/oxiseal/INDEX.MF")),
            Policy::Skip
        );
        // Outside the base directory, so not a control entry here.
        assert_eq!(
            classifier.policy(&entry("META-INF/oxiseal/INDEX.MF")),
            Policy::Passthrough
        );
    }

    #[test]
    fn test_combinators() {
        let filter = prefix("com/acme/")
            .and(suffix(".class"))
            .or(suffix(".xml").and(prefix("conf/").not()));
        assert!(filter.accept(&entry("com/acme/App.class")));
        assert!(!filter.accept(&entry("com/other/App.class")));
        assert!(filter.accept(&entry("beans.xml")));
        assert!(!filter.accept(&entry("conf/beans.xml")));
    }

    #[test]
    fn test_closure_filter() {
        let classifier = EntryClassifier::new(ContainerProfile::War, |e: &ContainerEntry| {
            !e.name.contains("Public")
        });
        assert!(classifier.filtrate(&entry("WEB-INF/classes/Secret.class")));
        assert!(!classifier.filtrate(&entry("WEB-INF/classes/Public.class")));
        assert!(!classifier.filtrate(&entry("WEB-INF/web.xml")));
    }

    #[test]
    fn test_nested_uses_jar_safety() {
        let classifier = EntryClassifier::new(ContainerProfile::Boot, AcceptAll);
        let nested = classifier.nested();
        assert_eq!(nested.profile(), ContainerProfile::Jar);
        assert_eq!(nested.policy(&entry("b/B.class")), Policy::Encrypt);
        assert_eq!(classifier.policy(&entry("b/B.class")), Policy::Passthrough);
    }
}
