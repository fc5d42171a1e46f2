//! Crash-safe file replacement for persisted levels.

use std::{fs, io::Write, path::Path};

use eyre::WrapErr;

use crate::types::LearnedLevels;

/// Write to `<path>.new`, fsync, then rename over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

/// Save `levels` as a `[calibration]` TOML table the config loader accepts.
pub fn save_levels(path: &Path, levels: LearnedLevels) -> crate::error::Result<()> {
    let persisted = filmscan_config::PersistedLevels::from(levels);
    let text = persisted.to_toml_string()?;
    write_atomic(path, text.as_bytes())
        .wrap_err_with(|| format!("write learned levels to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_levels_load_back_as_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("levels.toml");
        save_levels(
            &path,
            LearnedLevels {
                pt_level: 312,
                min_frame_steps: 280,
            },
        )
        .unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let cfg = filmscan_config::load_toml(&text).unwrap();
        let cal = cfg.calibration.unwrap();
        assert_eq!((cal.pt_level, cal.min_frame_steps), (312, 280));
        assert!(!path.with_extension("new").exists());
    }
}
