//! Quiescence guard
//!
//! Logs may only be read once the engine has no flush or merge in flight,
//! otherwise an in-progress operation looks finished in the reconstructed
//! table. Waiting for that is the benchmark driver's job. This guard only
//! checks, once, that the engine's flag files are gone.

use crate::source::error::{SourceError, SourceResult};
use std::path::PathBuf;

/// Locations of the engine's in-progress flag files
#[derive(Debug, Clone, Default)]
pub struct Quiescence {
    /// Present while a flush is running
    pub flush_flag: Option<PathBuf>,
    /// Present while a merge is running
    pub merge_flag: Option<PathBuf>,
}

impl Quiescence {
    pub fn new(flush_flag: Option<PathBuf>, merge_flag: Option<PathBuf>) -> Self {
        Self {
            flush_flag,
            merge_flag,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.flush_flag.is_some() || self.merge_flag.is_some()
    }

    /// Fail if either flag file exists right now
    pub fn verify(&self) -> SourceResult<()> {
        for flag in [&self.flush_flag, &self.merge_flag].into_iter().flatten() {
            if flag.exists() {
                return Err(SourceError::NotQuiescent(flag.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_unconfigured_is_quiescent() {
        let guard = Quiescence::default();
        assert!(!guard.is_configured());
        assert!(guard.verify().is_ok());
    }

    #[test]
    fn test_flag_present() {
        let dir = tempdir().unwrap();
        let merge_flag = dir.path().join("is_merging");
        let guard = Quiescence::new(Some(dir.path().join("is_flushing")), Some(merge_flag.clone()));

        assert!(guard.verify().is_ok());

        std::fs::write(&merge_flag, b"").unwrap();
        match guard.verify() {
            Err(SourceError::NotQuiescent(path)) => assert_eq!(path, merge_flag),
            other => panic!("expected NotQuiescent, got {:?}", other),
        }
    }
}
