//! Scheduler policy resolution
//!
//! A policy file that exists is read and decoded; anything else falls back
//! to the named default provider. The two paths never mix.

use crate::error::{MasterError, MasterResult};
use keel_scheduler::{codec, ConfigFactory, SchedulerConfig, DEFAULT_PROVIDER};
use std::io;
use std::path::{Path, PathBuf};

/// File access used by the resolver.
pub trait PolicyFs: Send + Sync {
    /// `Err` for any stat failure, not only "not found".
    fn stat(&self, path: &Path) -> io::Result<()>;
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// The real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFs;

impl PolicyFs for OsFs {
    fn stat(&self, path: &Path) -> io::Result<()> {
        std::fs::metadata(path).map(|_| ())
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// Where the scheduler configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicySource {
    File(PathBuf),
    Provider(&'static str),
}

pub struct PolicyResolver<F = OsFs> {
    fs: F,
}

impl Default for PolicyResolver<OsFs> {
    fn default() -> Self {
        Self { fs: OsFs }
    }
}

impl<F: PolicyFs> PolicyResolver<F> {
    pub fn new(fs: F) -> Self {
        Self { fs }
    }

    /// Decides where the policy comes from. A stat error of any kind,
    /// including permission denied, selects the default provider.
    pub fn source(&self, path: Option<&Path>) -> PolicySource {
        match path {
            Some(path) => match self.fs.stat(path) {
                Ok(()) => PolicySource::File(path.to_path_buf()),
                Err(e) => {
                    if e.kind() != io::ErrorKind::NotFound {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Cannot stat scheduler config, using default provider"
                        );
                    }
                    PolicySource::Provider(DEFAULT_PROVIDER)
                }
            },
            None => PolicySource::Provider(DEFAULT_PROVIDER),
        }
    }

    /// Builds a self-contained scheduler configuration.
    pub fn resolve(
        &self,
        path: Option<&Path>,
        factory: &ConfigFactory,
    ) -> MasterResult<SchedulerConfig> {
        match self.source(path) {
            PolicySource::File(path) => {
                let bytes = self.fs.read(&path).map_err(|source| MasterError::ConfigRead {
                    path: path.clone(),
                    source,
                })?;
                let policy = codec::decode(&bytes)
                    .map_err(|source| MasterError::ConfigDecode { path: path.clone(), source })?;
                tracing::info!(path = %path.display(), "Using scheduler policy file");
                Ok(factory.create_from_config(&policy)?)
            }
            PolicySource::Provider(name) => Ok(factory.create_from_provider(name)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_client::ClusterClient;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records reads; stat answers with a fixed result.
    struct FakeFs {
        stat: io::ErrorKind,
        exists: bool,
        contents: Vec<u8>,
        reads: AtomicUsize,
    }

    impl FakeFs {
        fn missing(kind: io::ErrorKind) -> Self {
            Self {
                stat: kind,
                exists: false,
                contents: Vec::new(),
                reads: AtomicUsize::new(0),
            }
        }

        fn with(contents: &[u8]) -> Self {
            Self {
                stat: io::ErrorKind::Other,
                exists: true,
                contents: contents.to_vec(),
                reads: AtomicUsize::new(0),
            }
        }
    }

    impl PolicyFs for FakeFs {
        fn stat(&self, _path: &Path) -> io::Result<()> {
            if self.exists {
                Ok(())
            } else {
                Err(self.stat.into())
            }
        }

        fn read(&self, _path: &Path) -> io::Result<Vec<u8>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.contents.clone())
        }
    }

    fn factory() -> ConfigFactory {
        ConfigFactory::new(ClusterClient::in_memory())
    }

    #[test]
    fn test_missing_file_uses_provider_without_reading() {
        let resolver = PolicyResolver::new(FakeFs::missing(io::ErrorKind::NotFound));
        let path = Path::new("/tmp/missing-policy.json");

        assert_eq!(resolver.source(Some(path)), PolicySource::Provider(DEFAULT_PROVIDER));
        let config = resolver.resolve(Some(path), &factory()).unwrap();
        assert!(!config.algorithm.predicate_names().is_empty());
        assert_eq!(resolver.fs.reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stat_error_falls_back() {
        let resolver = PolicyResolver::new(FakeFs::missing(io::ErrorKind::PermissionDenied));
        let source = resolver.source(Some(Path::new("/etc/keel/policy.json")));
        assert_eq!(source, PolicySource::Provider(DEFAULT_PROVIDER));
    }

    #[test]
    fn test_no_path_uses_provider() {
        let resolver = PolicyResolver::new(FakeFs::with(b"{}"));
        assert_eq!(resolver.source(None), PolicySource::Provider(DEFAULT_PROVIDER));
    }

    #[test]
    fn test_empty_policy_is_not_merged() {
        let resolver = PolicyResolver::new(FakeFs::with(b"{}"));
        let config = resolver.resolve(Some(Path::new("p.json")), &factory()).unwrap();
        assert!(config.algorithm.predicate_names().is_empty());
        assert!(config.algorithm.priority_names().is_empty());
        assert_eq!(resolver.fs.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_corrupt_policy() {
        let resolver = PolicyResolver::new(FakeFs::with(b"{\"predicates\": [{\"na"));
        let err = resolver.resolve(Some(Path::new("p.json")), &factory()).unwrap_err();
        assert!(matches!(err, MasterError::ConfigDecode { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unknown_predicate_in_policy() {
        let resolver = PolicyResolver::new(FakeFs::with(br#"{"predicates": [{"name": "Nope"}]}"#));
        let err = resolver.resolve(Some(Path::new("p.json")), &factory()).unwrap_err();
        assert!(matches!(err, MasterError::SchedulerConfig(_)));
    }

    #[test]
    fn test_read_failure() {
        struct Unreadable;
        impl PolicyFs for Unreadable {
            fn stat(&self, _path: &Path) -> io::Result<()> {
                Ok(())
            }
            fn read(&self, _path: &Path) -> io::Result<Vec<u8>> {
                Err(io::ErrorKind::PermissionDenied.into())
            }
        }

        let err = PolicyResolver::new(Unreadable)
            .resolve(Some(Path::new("p.json")), &factory())
            .unwrap_err();
        assert!(matches!(err, MasterError::ConfigRead { .. }));
    }

    fn stat_error_kind() -> impl Strategy<Value = io::ErrorKind> {
        prop::sample::select(vec![
            io::ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied,
            io::ErrorKind::InvalidInput,
            io::ErrorKind::TimedOut,
            io::ErrorKind::Interrupted,
            io::ErrorKind::Other,
        ])
    }

    proptest! {
        #[test]
        fn prop_unstattable_path_never_read(
            path in "(/[a-zA-Z0-9._-]{1,16}){1,6}",
            kind in stat_error_kind(),
        ) {
            let resolver = PolicyResolver::new(FakeFs::missing(kind));
            let path = Path::new(&path);

            prop_assert_eq!(resolver.source(Some(path)), PolicySource::Provider(DEFAULT_PROVIDER));
            let config = resolver.resolve(Some(path), &factory()).unwrap();
            prop_assert!(!config.algorithm.predicate_names().is_empty());
            prop_assert_eq!(resolver.fs.reads.load(Ordering::SeqCst), 0);
        }

        #[test]
        fn prop_missing_file_on_disk_uses_provider(name in "[a-zA-Z0-9_-]{1,24}(\\.json)?") {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join(name);

            let resolver = PolicyResolver::default();
            prop_assert_eq!(resolver.source(Some(&path)), PolicySource::Provider(DEFAULT_PROVIDER));
            prop_assert!(resolver.resolve(Some(&path), &factory()).is_ok());
        }
    }
}
