//! Seam for the host's icon/thumbnail collaborator.
//!
//! Extracting icons is the platform shell's job; the supervisor only
//! forwards the lookup.

use std::path::Path;

pub trait IconSource: Send + Sync {
    /// Encoded image bytes for the executable at `executable_path`, if any.
    fn icon_for(&self, executable_path: &Path) -> Option<Vec<u8>>;
}

impl<F> IconSource for F
where
    F: Fn(&Path) -> Option<Vec<u8>> + Send + Sync,
{
    fn icon_for(&self, executable_path: &Path) -> Option<Vec<u8>> {
        self(executable_path)
    }
}
