//! Database File Allocator
//!
//! Maps a [`SessionInfo`] to the private store it works against, seeds new
//! stores from base datasets and carries out user-requested deletion.
//!
//! Resolution never touches the filesystem. Store names come from a
//! client-held token, so every name is checked to be a single plain file
//! name inside the configured data directory before it is joined.

use crate::base_data::{is_blank, seed_path, BaseDataCatalog};
use crate::error::{AppError, AppResult};
use crate::session_info::{DbClass, SessionInfo};
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};

/// Longest accepted store name.
const MAX_DB_NAME_BYTES: usize = 255;

/// Check that `db_name` is one plain file name.
pub fn validate_db_name(db_name: &str) -> AppResult<()> {
    let reject = |reason: &str| {
        Err(AppError::InvalidDbName {
            db_name: db_name.to_string(),
            reason: reason.to_string(),
        })
    };

    if db_name.is_empty() {
        return reject("empty name");
    }
    if db_name.len() > MAX_DB_NAME_BYTES {
        return reject("name too long");
    }
    if db_name.contains(['/', '\\', '\0']) {
        return reject("contains a path separator");
    }
    if db_name.contains("..") {
        return reject("contains a parent-directory sequence");
    }

    let mut components = Path::new(db_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == db_name => Ok(()),
        _ => reject("not a plain file name"),
    }
}

/// Result of an explicit store deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deletion {
    pub path: PathBuf,
    /// False when the file was already gone
    pub existed: bool,
}

/// Resolves, seeds and deletes private data stores.
#[derive(Debug, Clone)]
pub struct DatabaseAllocator {
    data_dir: PathBuf,
    shared_db_name: String,
}

impl DatabaseAllocator {
    pub fn new(data_dir: impl Into<PathBuf>, shared_db_name: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            shared_db_name: shared_db_name.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn shared_db_name(&self) -> &str {
        &self.shared_db_name
    }

    pub fn class_of(&self, info: &SessionInfo) -> DbClass {
        info.db_class(&self.shared_db_name)
    }

    /// Path of `db_name` inside the data directory.
    pub fn path_for(&self, db_name: &str) -> AppResult<PathBuf> {
        validate_db_name(db_name)?;
        Ok(self.data_dir.join(db_name))
    }

    /// Absolute path of the store a session works against.
    ///
    /// Does not create anything; the store may legitimately be absent.
    pub fn resolve(&self, info: &SessionInfo) -> AppResult<PathBuf> {
        if info.data_path != self.data_dir {
            return Err(AppError::ForeignDataPath {
                path: info.data_path.clone(),
            });
        }
        self.path_for(&info.db_name)
    }

    /// Create store `db_name` from base dataset `base_key`.
    ///
    /// The blank dataset yields an empty store; any other dataset is copied
    /// from its seed file. The store is opened with `create_new`, so an
    /// existing store is never overwritten and concurrent callers cannot
    /// both claim the same name: the loser gets [`AppError::StoreExists`].
    pub fn seed(
        &self,
        catalog: &BaseDataCatalog,
        base_key: &str,
        db_name: &str,
    ) -> AppResult<PathBuf> {
        if !catalog.contains(base_key) {
            return Err(AppError::UnknownBaseData(base_key.to_string()));
        }
        let target = self.path_for(db_name)?;

        let reader = if is_blank(base_key) {
            None
        } else {
            let source = seed_path(&self.data_dir, base_key);
            match fs::File::open(&source) {
                Ok(f) => Some(f),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(AppError::MissingSeedFile {
                        key: base_key.to_string(),
                        path: source,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        };

        let mut writer = match OpenOptions::new().write(true).create_new(true).open(&target) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(AppError::StoreExists(db_name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(mut reader) = reader {
            if let Err(e) = io::copy(&mut reader, &mut writer) {
                drop(writer);
                let _ = fs::remove_file(&target);
                return Err(e.into());
            }
        }
        writer.sync_all()?;

        tracing::info!(base = base_key, db_name, "private_store_seeded");
        Ok(target)
    }

    /// Like [`seed`](Self::seed), but an existing store is kept as is.
    pub fn seed_if_absent(
        &self,
        catalog: &BaseDataCatalog,
        base_key: &str,
        db_name: &str,
    ) -> AppResult<Option<PathBuf>> {
        match self.seed(catalog, base_key, db_name) {
            Ok(path) => Ok(Some(path)),
            Err(AppError::StoreExists(_)) => {
                tracing::debug!(db_name, "private_store_exists_not_seeded");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Delete the private store behind a session on the user's request.
    ///
    /// Only anonymous and user stores are deletable; the shared store and
    /// unrecognised names report [`AppError::UnsupportedDeletion`].
    pub fn delete_private(&self, info: &SessionInfo) -> AppResult<Deletion> {
        let class = self.class_of(info);
        if !class.is_user_deletable() {
            return Err(AppError::UnsupportedDeletion {
                db_name: info.db_name.clone(),
            });
        }

        let path = self.resolve(info)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(db_name = %info.db_name, %class, "private_store_deleted");
                Ok(Deletion {
                    path,
                    existed: true,
                })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Deletion {
                path,
                existed: false,
            }),
            Err(source) => {
                tracing::warn!(db_name = %info.db_name, error = %source, "private_store_delete_failed");
                Err(AppError::Deletion { path, source })
            }
        }
    }
}
