// Content installer - copies staged workshop content into the server files
// and collects signing keys into the shared keys folder

use crate::error::{SyncError, SyncResult};
use crate::mods::{ModEntry, ModSet};
use crate::paths::WORKSHOP_STAGING_DIR;
use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct InstalledMod {
    pub content_id: String,
    pub name: String,
    pub destination: PathBuf,
    pub key_files: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct ModFailure {
    pub content_id: String,
    pub name: String,
    pub error: SyncError,
}

#[derive(Debug, Default)]
pub struct InstallReport {
    pub installed: Vec<InstalledMod>,
    pub failures: Vec<ModFailure>,
}

impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Display names of the installed mods, in mod list order
    pub fn installed_names(&self) -> Vec<String> {
        self.installed.iter().map(|m| m.name.clone()).collect()
    }
}

pub struct ContentInstaller {
    server_files: PathBuf,
    keys_dir: PathBuf,
    key_extension: String,
}

impl ContentInstaller {
    pub fn new(
        server_files: impl Into<PathBuf>,
        keys_dir: impl Into<PathBuf>,
        key_extension: &str,
    ) -> Self {
        Self {
            server_files: server_files.into(),
            keys_dir: keys_dir.into(),
            key_extension: key_extension.trim_start_matches('.').to_string(),
        }
    }

    /// Install every mod whose staged content exists. Failures are collected
    /// per mod and never stop the remaining installs.
    pub fn install_all<F>(&self, mods: &ModSet, staged_dir: F) -> InstallReport
    where
        F: Fn(&str) -> PathBuf,
    {
        let mut report = InstallReport::default();

        for entry in mods {
            let source = staged_dir(&entry.content_id);
            match self.install_one(entry, &source) {
                Ok(installed) => report.installed.push(installed),
                Err(error) => {
                    tracing::error!("{}", error);
                    report.failures.push(ModFailure {
                        content_id: entry.content_id.clone(),
                        name: entry.display_name.clone(),
                        error,
                    });
                }
            }
        }

        tracing::info!(
            "Installed {} of {} mods",
            report.installed.len(),
            report.installed.len() + report.failures.len()
        );
        report
    }

    pub fn install_one(&self, entry: &ModEntry, source: &Path) -> SyncResult<InstalledMod> {
        if !is_plain_folder_name(&entry.display_name) || self.is_reserved(&entry.display_name) {
            return Err(SyncError::InvalidModName {
                content_id: entry.content_id.clone(),
                name: entry.display_name.clone(),
            });
        }

        if !source.is_dir() {
            return Err(SyncError::DownloadIncomplete {
                content_id: entry.content_id.clone(),
                name: entry.display_name.clone(),
            });
        }

        let destination = self.server_files.join(&entry.display_name);
        tracing::info!("Copying {} to {:?}", entry.display_name, destination);
        copy_dir_recursive(source, &destination)?;

        let mut keys = Vec::new();
        find_files_with_extension(&destination, &self.key_extension, &mut keys)?;

        let mut key_files = Vec::new();
        if !keys.is_empty() {
            fs::create_dir_all(&self.keys_dir).map_err(|e| SyncError::io(&self.keys_dir, e))?;
        }
        for key in keys {
            let Some(file_name) = key.file_name() else {
                continue;
            };
            let target = self.keys_dir.join(file_name);
            if target == key {
                continue;
            }
            if target.exists() {
                tracing::debug!("Overwriting key file {:?}", target);
            }
            fs::copy(&key, &target).map_err(|e| SyncError::io(&key, e))?;
            key_files.push(target);
        }

        Ok(InstalledMod {
            content_id: entry.content_id.clone(),
            name: entry.display_name.clone(),
            destination,
            key_files,
        })
    }

    /// Names of folders in the server files that modsync itself manages
    fn is_reserved(&self, name: &str) -> bool {
        let keys = self
            .keys_dir
            .strip_prefix(&self.server_files)
            .ok()
            .and_then(|rel| rel.components().next())
            .map(|c| c.as_os_str().to_string_lossy().into_owned());

        name.eq_ignore_ascii_case(WORKSHOP_STAGING_DIR)
            || keys.is_some_and(|keys| name.eq_ignore_ascii_case(&keys))
    }
}

/// A display name is used as a folder name and must not escape the server files
fn is_plain_folder_name(name: &str) -> bool {
    if name.contains('/') || name.contains('\\') {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Copy a directory tree, overwriting files that already exist.
/// Files only present in `dest` are left alone.
fn copy_dir_recursive(src: &Path, dest: &Path) -> SyncResult<()> {
    fs::create_dir_all(dest).map_err(|e| SyncError::io(dest, e))?;

    for entry in fs::read_dir(src).map_err(|e| SyncError::io(src, e))? {
        let entry = entry.map_err(|e| SyncError::io(src, e))?;
        let entry_path = entry.path();
        let dest_path = dest.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| SyncError::io(&entry_path, e))?;

        if file_type.is_dir() {
            copy_dir_recursive(&entry_path, &dest_path)?;
        } else if file_type.is_file() {
            fs::copy(&entry_path, &dest_path).map_err(|e| SyncError::io(&entry_path, e))?;
        } else {
            tracing::debug!("Skipping link or special file {:?}", entry_path);
        }
    }

    Ok(())
}

fn find_files_with_extension(dir: &Path, extension: &str, found: &mut Vec<PathBuf>) -> SyncResult<()> {
    for entry in fs::read_dir(dir).map_err(|e| SyncError::io(dir, e))? {
        let entry = entry.map_err(|e| SyncError::io(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| SyncError::io(&path, e))?;
        if file_type.is_dir() {
            find_files_with_extension(&path, extension, found)?;
        } else if file_type.is_file()
            && path
                .extension()
                .map(|e| e.to_string_lossy().eq_ignore_ascii_case(extension))
                .unwrap_or(false)
        {
            found.push(path);
        }
    }
    Ok(())
}
