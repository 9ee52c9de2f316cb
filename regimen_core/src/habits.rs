//! Habit file persistence with file locking.
//!
//! The habit context is owned by an external collaborator; this module only
//! gives the CLI a local copy to read and edit.

use crate::{Error, HabitContext, Result};
use chrono_tz::Tz;
use fs2::FileExt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

impl HabitContext {
    /// Load a habit context from a file with shared locking
    ///
    /// Returns an empty context in `fallback_tz` if the file doesn't exist.
    /// Unlike most loaders here a corrupted file is an error: silently falling
    /// back would move every exact dose to another timezone.
    pub fn load(path: &Path, fallback_tz: Tz) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No habit file found, using an empty context in {}", fallback_tz);
            return Ok(Self::new(fallback_tz));
        }

        let file = File::open(path)?;
        file.lock_shared()?;

        let mut contents = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
        file.unlock()?;
        read?;

        let habits: HabitContext = serde_json::from_str(&contents)?;
        tracing::debug!(
            "Loaded {} habit event(s) in {} from {:?}",
            habits.events.len(),
            habits.tz,
            path
        );
        Ok(habits)
    }

    /// Save the habit context with exclusive locking
    ///
    /// Writes to a temp file in the same directory, syncs, then renames over
    /// the original.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string_pretty(self)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved habit context to {:?}", path);
        Ok(())
    }

    /// Load, modify, and save back
    pub fn update<F>(path: &Path, fallback_tz: Tz, f: F) -> Result<Self>
    where
        F: FnOnce(&mut HabitContext) -> Result<()>,
    {
        let mut habits = Self::load(path, fallback_tz)?;
        f(&mut habits)?;
        habits.save(path)?;
        Ok(habits)
    }
}
