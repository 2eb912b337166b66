//! Atomic, permission-restricted persistence for a [`GuardSet`].
//!
//! The teacher's `tor-persist`/`fs-mistrust` crates implement this same
//! write-tmp-then-rename discipline underneath `CheckedDir::write_and_replace`
//! (see `tor-persist/src/load_store.rs`), layered with directory-permission
//! auditing that was not retrieved deeply enough in this pack to adapt
//! faithfully. This module implements the same atomicity and permission
//! discipline directly against `std::fs`, serializing with `serde_json` the
//! way `load_store::Target::store` does.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use crate::err::Error;
use crate::guard::GuardSet;

/// Load a [`GuardSet`] from `path`, returning an empty set if the file
/// does not exist yet.
pub fn load(path: &Path) -> Result<GuardSet, Error> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(GuardSet::new()),
        Err(source) => {
            return Err(Error::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&text).map_err(|source| Error::Corrupted {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `guards` to `path` atomically: serialize to a sibling temp file,
/// set its permissions to owner-only, then rename it into place.
///
/// Per SPEC_FULL.md §4.5/§6: JSON, atomic write-tmp-then-rename, mode 0600,
/// stamped with the `last_updated` time of this write.
pub fn store(path: &Path, guards: &GuardSet) -> Result<(), Error> {
    let mut guards = guards.clone();
    guards.last_updated = Some(SystemTime::now());
    let json = serde_json::to_string_pretty(&guards).expect("GuardSet always serializes");
    let tmp_path = tmp_path_for(path);

    fs::write(&tmp_path, json.as_bytes()).map_err(|source| Error::Io {
        path: tmp_path.clone(),
        source,
    })?;

    #[cfg(unix)]
    {
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(&tmp_path, perms).map_err(|source| Error::Io {
            path: tmp_path.clone(),
            source,
        })?;
    }

    fs::rename(&tmp_path, path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Derive a sibling temp-file path for the atomic write, alongside `path`.
fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::MAX_GUARDS;
    use std::net::SocketAddr;
    use std::time::SystemTime;
    use tor_linkspec::{ChanTarget, HasRelayIds};
    use tor_llcrypto::pk::{ed25519::Ed25519Identity, rsa::RsaIdentity};

    struct FakeRelay {
        ed: Ed25519Identity,
        rsa: RsaIdentity,
    }
    impl HasRelayIds for FakeRelay {
        fn ed_identity(&self) -> &Ed25519Identity {
            &self.ed
        }
        fn rsa_identity(&self) -> &RsaIdentity {
            &self.rsa
        }
    }
    impl ChanTarget for FakeRelay {
        fn addr(&self) -> SocketAddr {
            "127.0.0.1:9001".parse().unwrap()
        }
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guards.json");
        let loaded = load(&path).unwrap();
        assert!(loaded.guards().is_empty());
    }

    #[test]
    fn round_trips_and_sets_owner_only_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guards.json");

        let mut guards = GuardSet::new();
        guards.add_guard(
            &FakeRelay {
                ed: Ed25519Identity::new([9; 32]),
                rsa: RsaIdentity::from_bytes(&[9; 20]).unwrap(),
            },
            "relay9",
            SystemTime::UNIX_EPOCH,
        );
        store(&path, &guards).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.guards().len(), 1);
        assert!(loaded.last_updated.is_some());

        #[cfg(unix)]
        {
            let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }

        assert!(loaded.guards().len() <= MAX_GUARDS);
    }

    #[test]
    fn corrupted_file_reports_corrupted_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guards.json");
        fs::write(&path, b"not json").unwrap();
        assert!(matches!(load(&path), Err(Error::Corrupted { .. })));
    }
}
