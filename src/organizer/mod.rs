//! Safe file organization with backup, atomic apply, and rollback.
//!
//! Standard structure:
//!     /Library/Artist Name/Album Name (Year)/01 - Track Title.ext
//!
//! Compilations (DJ mixes, Various Artists):
//!     /Library/Album Artist/Album Name (Year)/01 - Title - Track Artist.ext
//!
//! Singles (no album):
//!     /Library/Artist Name/Singles/Track Title.ext
//!
//! # Ordering contract
//!
//! Every mutation follows a strict order: compute destination, back up
//! the original, write tags, move, append to the ledger. If any step
//! fails, the steps already performed are reverted in reverse order
//! before the error surfaces, so a failed apply leaves the source file
//! byte-identical to what it was. The ledger is the source of truth for
//! rollback.

pub mod paths;

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{BatchOptions, SINGLES_FOLDER};
use crate::db::{MoveLedger, MoveRecord, OpKind, ReversalState};
use crate::error::{Error, Result};
use crate::metadata;
use crate::model::{MatchCandidate, PlannedOperation, Track};

/// System junk files that should not keep a directory alive. Cover art
/// the user may have placed (folder.jpg, albumart.jpg) is NOT junk and
/// must never be silently deleted.
const JUNK_FILENAMES: &[&str] = &["thumbs.db", "desktop.ini", ".ds_store", ".thumbs"];

/// Writes a candidate's identity into a file's embedded tags.
///
/// Seam for tests; production uses [`LoftyTagWriter`].
pub trait TagWriter: Send + Sync {
    fn write(&self, path: &Path, candidate: &MatchCandidate) -> Result<usize>;
}

/// Production tag writer backed by lofty.
pub struct LoftyTagWriter;

impl TagWriter for LoftyTagWriter {
    fn write(&self, path: &Path, candidate: &MatchCandidate) -> Result<usize> {
        metadata::write(path, candidate)
    }
}

/// Result of one apply.
#[derive(Debug)]
pub enum ApplyOutcome {
    /// The mutation happened; the ledger holds a reversible record.
    Applied { record: MoveRecord, dest: PathBuf },
    /// Dry run: the operation that would have happened.
    Planned(PlannedOperation),
}

/// Outcome of reversing one ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackDisposition {
    Reversed,
    /// An intermediate file is missing; the record was marked broken
    /// and rollback moved on.
    Broken,
}

/// Report returned to the caller after a rollback pass.
#[derive(Debug, Default)]
pub struct RollbackReport {
    pub reversed: usize,
    pub broken: Vec<i64>,
}

/// Organizes audio files into the library layout, safely.
pub struct SafeOrganizer {
    library_root: PathBuf,
    backup_root: PathBuf,
    keep_originals: bool,
    folder_template: String,
    file_template: String,
    dry_run: bool,
    ledger: MoveLedger,
    tag_writer: Box<dyn TagWriter>,
}

impl SafeOrganizer {
    pub fn new(options: &BatchOptions, ledger: MoveLedger) -> Self {
        Self::with_tag_writer(options, ledger, Box::new(LoftyTagWriter))
    }

    pub fn with_tag_writer(
        options: &BatchOptions,
        ledger: MoveLedger,
        tag_writer: Box<dyn TagWriter>,
    ) -> Self {
        Self {
            library_root: options.library_root.clone(),
            backup_root: options.backup_root.clone(),
            keep_originals: options.keep_originals,
            folder_template: options.folder_template.clone(),
            file_template: options.file_template.clone(),
            dry_run: options.dry_run,
            ledger,
            tag_writer,
        }
    }

    /// Where a track would land, without touching anything.
    pub fn preview_destination(&self, track: &Track, candidate: &MatchCandidate) -> PathBuf {
        self.build_destination(track, candidate)
    }

    /// Apply a chosen candidate to a track: backup, retag, move, ledger.
    pub async fn apply(
        &self,
        batch_id: &str,
        track: &Track,
        candidate: &MatchCandidate,
    ) -> Result<ApplyOutcome> {
        let source = &track.source_path;
        let mut dest = self.build_destination(track, candidate);
        let tag_only = dest == *source;
        let op_kind = if tag_only {
            OpKind::TagOnly
        } else {
            OpKind::MoveWithTags
        };

        if self.dry_run {
            tracing::info!("[dry run] would apply: {} -> {}", source.display(), dest.display());
            return Ok(ApplyOutcome::Planned(PlannedOperation {
                source: source.clone(),
                destination: dest,
                op_kind: op_kind.as_str().to_string(),
            }));
        }

        if !source.exists() {
            return Err(Error::not_found(source.clone()));
        }

        if !tag_only && dest.exists() {
            let same_size = dest
                .metadata()
                .ok()
                .map(|m| m.len() == track.size_bytes)
                .unwrap_or(false);
            if same_size {
                // Re-organizing the same content; leave the source alone
                // rather than stamping out "(1)" copies
                return Err(Error::organization(format!(
                    "duplicate: {} already exists in the library",
                    dest.display()
                )));
            }
            dest = paths::unique_path(&dest);
        }

        // Step 2: backup BEFORE any tag write, so the backup preserves
        // the unmodified file
        let backup = if self.keep_originals {
            Some(self.backup_file(source)?)
        } else {
            None
        };

        // Step 3: tags
        if let Err(e) = self.tag_writer.write(source, candidate) {
            self.discard_backup(&backup);
            return Err(e);
        }

        // Step 4: move
        if !tag_only {
            if let Err(e) = paths::safe_move(source, &dest) {
                // Revert the tag write by restoring pre-mutation bytes
                if let Some(backup) = &backup {
                    let _ = paths::safe_copy(backup, source);
                }
                self.discard_backup(&backup);
                return Err(Error::Io(e).context(format!("failed to move {}", source.display())));
            }
        }

        // Step 5: ledger
        let record = match self
            .ledger
            .append(batch_id, source, backup.as_deref(), &dest, op_kind)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                // Reverse steps 4..2 so the failed apply leaves no trace
                if !tag_only {
                    let _ = paths::safe_move(&dest, source);
                }
                if let Some(backup) = &backup {
                    let _ = paths::safe_copy(backup, source);
                }
                self.discard_backup(&backup);
                return Err(Error::Database(e).context("failed to record move"));
            }
        };

        tracing::info!("organized: {} -> {}", source.display(), dest.display());

        if let Some(parent) = source.parent() {
            self.cleanup_empty_dirs(parent);
        }

        Ok(ApplyOutcome::Applied { record, dest })
    }

    /// Reverse every reversible record of a batch, newest first.
    pub async fn rollback_batch(&self, batch_id: &str) -> Result<RollbackReport> {
        let records = self.ledger.reversible_for_batch(batch_id).await?;
        let mut report = RollbackReport::default();
        for record in records {
            match self.reverse_record(&record).await? {
                RollbackDisposition::Reversed => report.reversed += 1,
                RollbackDisposition::Broken => report.broken.push(record.id),
            }
        }
        tracing::info!(
            "rollback of batch {}: {} reversed, {} broken",
            batch_id,
            report.reversed,
            report.broken.len()
        );
        Ok(report)
    }

    /// Reverse a single ledger record by id.
    pub async fn rollback_record(&self, id: i64) -> Result<RollbackDisposition> {
        let record = self
            .ledger
            .get(id)
            .await?
            .ok_or_else(|| Error::organization(format!("no ledger record {}", id)))?;
        if record.reversal != ReversalState::Reversible {
            return Err(Error::organization(format!(
                "record {} is not reversible ({})",
                id,
                record.reversal.as_str()
            )));
        }
        self.reverse_record(&record).await
    }

    /// Reverse the record whose current path matches a track's location.
    pub async fn rollback_path(&self, current: &Path) -> Result<RollbackDisposition> {
        let record = self
            .ledger
            .find_by_current_path(current)
            .await?
            .ok_or_else(|| {
                Error::organization(format!("no ledger record for {}", current.display()))
            })?;
        self.reverse_record(&record).await
    }

    /// Execute one reversal: destination back to original path, then
    /// pre-mutation bytes restored from backup when one exists.
    async fn reverse_record(&self, record: &MoveRecord) -> Result<RollbackDisposition> {
        let moved_back = if record.current_path != record.original_path
            && record.current_path.exists()
        {
            match paths::safe_move(&record.current_path, &record.original_path) {
                Ok(()) => {
                    if let Some(parent) = record.current_path.parent() {
                        self.cleanup_empty_dirs(parent);
                    }
                    true
                }
                Err(e) => {
                    tracing::error!("rollback move failed for record {}: {}", record.id, e);
                    false
                }
            }
        } else {
            record.original_path.exists()
        };

        // Restore pre-mutation bytes (undoes the tag write). Backups are
        // never auto-deleted.
        let restored = match &record.backup_path {
            Some(backup) if backup.exists() => {
                match paths::safe_copy(backup, &record.original_path) {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::error!("backup restore failed for record {}: {}", record.id, e);
                        false
                    }
                }
            }
            Some(_) => false, // backup went missing
            None => moved_back,
        };

        if restored || (moved_back && record.backup_path.is_none()) {
            self.ledger
                .set_reversal(record.id, ReversalState::Reversed)
                .await?;
            tracing::info!(
                "rolled back: {} -> {}",
                record.current_path.display(),
                record.original_path.display()
            );
            Ok(RollbackDisposition::Reversed)
        } else {
            self.ledger
                .set_reversal(record.id, ReversalState::Broken)
                .await?;
            Ok(RollbackDisposition::Broken)
        }
    }

    /// Remove empty directories, walking up the tree.
    ///
    /// Only directories strictly inside the library root are eligible;
    /// anything else is left alone, so a source folder tree outside the
    /// library is never deleted. Junk files (Thumbs.db and friends) are
    /// removed so they don't block folder removal; user cover art is
    /// real content and keeps its directory alive.
    pub fn cleanup_empty_dirs(&self, directory: &Path) {
        let Ok(library) = self.library_root.canonicalize() else {
            return;
        };
        let Ok(mut current) = directory.canonicalize() else {
            return;
        };

        while current != library && current.starts_with(&library) {
            if !dir_is_effectively_empty(&current) {
                break;
            }
            if fs::remove_dir(&current).is_err() {
                break;
            }
            tracing::debug!("removed empty directory: {}", current.display());
            let Some(parent) = current.parent() else {
                break;
            };
            current = parent.to_path_buf();
        }
    }

    /// Back up a file under the backup root, mirroring its path relative
    /// to the library root (bare filename for sources outside it).
    fn backup_file(&self, source: &Path) -> Result<PathBuf> {
        let relative: PathBuf = match source.strip_prefix(&self.library_root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => source
                .file_name()
                .map(PathBuf::from)
                .ok_or_else(|| Error::organization("source has no file name"))?,
        };
        let mut backup = self.backup_root.join(relative);
        let name = backup
            .file_name()
            .map(|n| format!("{}.bak", n.to_string_lossy()))
            .unwrap_or_else(|| "backup.bak".to_string());
        backup.set_file_name(name);
        let backup = paths::unique_path(&backup);

        paths::safe_copy(source, &backup)
            .map_err(|e| Error::Io(e).context(format!("backup failed for {}", source.display())))?;
        tracing::debug!("backed up: {} -> {}", source.display(), backup.display());
        Ok(backup)
    }

    fn discard_backup(&self, backup: &Option<PathBuf>) {
        if let Some(backup) = backup {
            let _ = fs::remove_file(backup);
        }
    }

    /// Destination path for a track under the library layout.
    fn build_destination(&self, track: &Track, candidate: &MatchCandidate) -> PathBuf {
        let title = paths::sanitize_filename(
            candidate
                .title
                .as_deref()
                .unwrap_or(&track.display_title()),
        );
        let artist = paths::sanitize_filename(candidate.artist.as_deref().unwrap_or("Unknown"));
        let album_artist = candidate.album_artist.as_deref().map(paths::sanitize_filename);
        let year = candidate
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        let track_num = candidate.track_number.unwrap_or(0);
        let disc_num = candidate.disc_number.unwrap_or(0);
        let total_discs = candidate.total_discs.unwrap_or(0);
        let ext = track
            .source_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let is_comp = candidate.is_compilation
            || album_artist
                .as_deref()
                .map(|aa| !aa.is_empty() && aa != artist)
                .unwrap_or(false);
        let folder_artist = match (&album_artist, is_comp) {
            (Some(aa), true) => aa.clone(),
            _ => artist.clone(),
        };

        let folder = match candidate.album.as_deref() {
            Some(album) if !album.is_empty() => {
                let album = paths::sanitize_filename(album);
                let mut folder = self
                    .folder_template
                    .replace("{artist}", &folder_artist)
                    .replace("{album}", &album)
                    .replace("{year}", &year);
                // Multi-disc: "Disc N" subfolder when the release has
                // more than one disc, or the disc number itself is 2+
                let is_multi_disc = total_discs > 1 || disc_num >= 2;
                if is_multi_disc && disc_num > 0 {
                    folder = format!("{}/Disc {}", folder, disc_num);
                }
                folder
            }
            _ => format!("{}/{}", folder_artist, SINGLES_FOLDER),
        };

        let filename = if is_comp && folder_artist != artist {
            // Compilation: the track artist goes into the filename
            if track_num > 0 {
                format!("{:02} - {} - {}", track_num, title, artist)
            } else {
                format!("{} - {}", title, artist)
            }
        } else if track_num > 0 {
            self.file_template
                .replace("{track:02d}", &format!("{:02}", track_num))
                .replace("{track}", &track_num.to_string())
                .replace("{title}", &title)
        } else {
            title
        };

        let dest = self
            .library_root
            .join(folder)
            .join(format!("{}{}", filename, ext));
        paths::enforce_path_length(&dest)
    }
}

/// True when a directory holds nothing but junk files (which are
/// deleted so `remove_dir` can succeed).
fn dir_is_effectively_empty(directory: &Path) -> bool {
    let Ok(entries) = fs::read_dir(directory) else {
        return false;
    };
    let mut junk = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if JUNK_FILENAMES.contains(&name.as_str()) {
            junk.push(entry.path());
        } else {
            return false;
        }
    }
    for path in junk {
        if fs::remove_file(&path).is_err() {
            return false;
        }
    }
    true
}
