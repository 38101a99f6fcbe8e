use std::collections::BTreeSet;

/// A change reported by the host's change source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeNotification {
    /// Files or folders changed in the working tree.
    Paths(BTreeSet<String>),
    /// A ref or HEAD moved. Always forces a full reload.
    RefChanged,
}

impl ChangeNotification {
    /// Build a path notification from any iterable of paths.
    pub fn paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Paths(paths.into_iter().map(Into::into).collect())
    }
}

impl std::fmt::Display for ChangeNotification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Paths(paths) => write!(f, "paths({})", paths.len()),
            Self::RefChanged => f.write_str("ref-changed"),
        }
    }
}
