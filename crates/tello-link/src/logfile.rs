use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use time::macros::format_description;
use time::OffsetDateTime;

/// Creates `<dir>/<YYYY-MM-DD_HH-MM-SS>-<suffix>.log`, adding a counter if
/// a log from the same second already exists.
pub(crate) fn create(dir: &Path, suffix: &str) -> Result<(PathBuf, BufWriter<File>)> {
    fs::create_dir_all(dir).with_context(|| format!("create log dir {}", dir.display()))?;

    let stamp = OffsetDateTime::now_utc()
        .format(format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]"))
        .context("format log timestamp")?;

    let mut path = dir.join(format!("{stamp}-{suffix}.log"));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("{stamp}-{suffix}-{n}.log"));
        n += 1;
    }

    let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
    Ok((path, BufWriter::new(file)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let (a, _) = create(dir.path(), "cmd").unwrap();
        let (b, _) = create(dir.path(), "cmd").unwrap();
        assert_ne!(a, b);
        let name = a.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("-cmd.log") || name.contains("-cmd-"), "{name}");
        assert_eq!(name.as_bytes()[4], b'-');
        assert_eq!(name.as_bytes()[10], b'_');
    }
}
