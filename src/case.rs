//! Case directory layout.
//!
//! A case holds the transformed image (`I_D.bmp`), the key image
//! (`I_M.bmp`) and one `M<n>.txt` mask file per stage. Mask files are
//! ordered by their numeric suffix, so `M2.txt` comes before `M10.txt`.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{RecoveryError, Result};

pub const TRANSFORMED_STEM: &str = "I_D";
pub const KEY_STEM: &str = "I_M";

const IMAGE_EXTENSIONS: [&str; 2] = ["bmp", "png"];

/// Every input path of one reconstruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasePaths {
    pub transformed: PathBuf,
    pub key: PathBuf,
    /// Ordered by stage: `masks[i]` belongs to stage `i`
    pub masks: Vec<PathBuf>,
}

impl CasePaths {
    pub fn new(transformed: PathBuf, key: PathBuf, masks: Vec<PathBuf>) -> Self {
        Self {
            transformed,
            key,
            masks,
        }
    }

    /// Locate the inputs of the case stored in `dir`
    pub fn discover(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(RecoveryError::FileNotFound(dir.display().to_string()));
        }

        let transformed = find_image(dir, TRANSFORMED_STEM)?;
        let key = find_image(dir, KEY_STEM)?;
        let masks = mask_files(dir)?;

        tracing::debug!(case = %dir.display(), masks = masks.len(), "discovered case");
        Ok(Self::new(transformed, key, masks))
    }

    pub fn stage_count(&self) -> usize {
        self.masks.len()
    }
}

/// Stage index of a mask file name (`M3.txt` is stage 2), if it is one
pub fn mask_index(file_name: &str) -> Option<usize> {
    static MASK_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = MASK_REGEX.get_or_init(|| Regex::new(r"(?i)^M(\d+)\.txt$").unwrap());

    re.captures(file_name)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .map(|n| n - 1)
}

/// Mask files of `dir`, sorted by numeric suffix
pub fn mask_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found: Vec<(usize, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if let Some(index) = name.to_str().and_then(mask_index) {
            found.push((index, entry.path()));
        }
    }
    found.sort_by_key(|(index, _)| *index);

    for (expected, (index, path)) in found.iter().enumerate() {
        if *index != expected {
            return Err(RecoveryError::InvalidArgument(format!(
                "mask sequence has a gap before {}",
                path.display()
            )));
        }
    }

    Ok(found.into_iter().map(|(_, path)| path).collect())
}

/// Whether `dir` holds the two images a case needs
pub fn is_case_dir(dir: &Path) -> bool {
    dir.is_dir()
        && find_image(dir, TRANSFORMED_STEM).is_ok()
        && find_image(dir, KEY_STEM).is_ok()
}

/// Sub-directories of `root` that are cases, sorted by path
pub fn discover_cases(root: &Path) -> Result<Vec<PathBuf>> {
    let mut cases = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let path = entry?.path();
        if is_case_dir(&path) {
            cases.push(path);
        }
    }
    cases.sort();
    Ok(cases)
}

fn find_image(dir: &Path, stem: &str) -> Result<PathBuf> {
    IMAGE_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", stem, ext)))
        .find(|path| path.is_file())
        .ok_or_else(|| RecoveryError::FileNotFound(dir.join(format!("{}.bmp", stem)).display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(tag: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        dir.push(format!("unmask_recovery_case_{tag}_{unique}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn touch(path: PathBuf) {
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_mask_index() {
        assert_eq!(mask_index("M1.txt"), Some(0));
        assert_eq!(mask_index("m12.TXT"), Some(11));
        assert_eq!(mask_index("M0.txt"), None);
        assert_eq!(mask_index("M1.txt.bak"), None);
        assert_eq!(mask_index("mask1.txt"), None);
    }

    #[test]
    fn test_numeric_ordering() {
        let dir = temp_dir("order");
        for n in [10, 2, 1, 3, 4, 5, 6, 7, 8, 9] {
            touch(dir.join(format!("M{n}.txt")));
        }
        touch(dir.join("notes.txt"));

        let masks = mask_files(&dir).unwrap();
        let names: Vec<String> = masks
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 10);
        assert_eq!(names[1], "M2.txt");
        assert_eq!(names[9], "M10.txt");
    }

    #[test]
    fn test_gap_is_rejected() {
        let dir = temp_dir("gap");
        touch(dir.join("M1.txt"));
        touch(dir.join("M3.txt"));
        assert!(matches!(mask_files(&dir), Err(RecoveryError::InvalidArgument(_))));
    }

    #[test]
    fn test_discover_case() {
        let dir = temp_dir("discover");
        touch(dir.join("I_D.bmp"));
        touch(dir.join("I_M.png"));
        touch(dir.join("M1.txt"));
        touch(dir.join("M2.txt"));

        let case = CasePaths::discover(&dir).unwrap();
        assert_eq!(case.transformed, dir.join("I_D.bmp"));
        assert_eq!(case.key, dir.join("I_M.png"));
        assert_eq!(case.stage_count(), 2);
        assert!(is_case_dir(&dir));
    }

    #[test]
    fn test_missing_key_image() {
        let dir = temp_dir("nokey");
        touch(dir.join("I_D.bmp"));
        assert!(matches!(CasePaths::discover(&dir), Err(RecoveryError::FileNotFound(_))));
        assert!(!is_case_dir(&dir));
    }

    #[test]
    fn test_discover_cases_skips_other_dirs() {
        let root = temp_dir("root");
        for name in ["b", "a", "junk"] {
            std::fs::create_dir_all(root.join(name)).unwrap();
        }
        for name in ["a", "b"] {
            touch(root.join(name).join("I_D.bmp"));
            touch(root.join(name).join("I_M.bmp"));
        }
        touch(root.join("I_D.bmp"));

        assert_eq!(discover_cases(&root).unwrap(), vec![root.join("a"), root.join("b")]);
    }
}
