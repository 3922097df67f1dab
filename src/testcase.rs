use crate::error::{Result, TuneError};
use log::debug;
use std::fs;
use std::path::Path;

/// One fixed sample excerpt, loaded at startup and shared read-only by every
/// evaluation for the lifetime of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct Testcase {
    /// Source identifier (file name)
    pub source: String,
    /// Signed 16-bit samples widened to f64, exactly `sample_len` of them
    pub samples: Vec<f64>,
}

/// Loads every regular file in `dir` (sorted by name) as a signed 16-bit
/// little-endian capture excerpt. Files longer than `sample_len` samples are
/// truncated; shorter files and an empty directory are configuration errors,
/// since scores are only comparable across equal-length testcases.
pub fn load_dir(dir: &Path, sample_len: usize) -> Result<Vec<Testcase>> {
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut testcases = Vec::with_capacity(paths.len());
    for path in paths {
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let raw = fs::read(&path)?;
        let available = raw.len() / 2;
        if available < sample_len {
            return Err(TuneError::ShortTestcase {
                name: source,
                got: available,
                need: sample_len,
            });
        }
        let samples: Vec<f64> = raw
            .chunks_exact(2)
            .take(sample_len)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f64)
            .collect();
        debug!("loaded testcase {} ({} samples)", source, samples.len());
        testcases.push(Testcase { source, samples });
    }

    if testcases.is_empty() {
        return Err(TuneError::NoTestcases {
            dir: dir.to_path_buf(),
        });
    }
    Ok(testcases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn write_s16le(path: &Path, samples: &[i16]) {
        let mut file = File::create(path).unwrap();
        for s in samples {
            file.write_all(&s.to_le_bytes()).unwrap();
        }
    }

    #[test]
    fn loads_sorted_fixed_length_testcases() {
        let dir = tempfile::tempdir().unwrap();
        write_s16le(&dir.path().join("b.s16"), &[3, 4, 5]);
        write_s16le(&dir.path().join("a.s16"), &[-1, 0, 2]);

        let testcases = load_dir(dir.path(), 2).unwrap();
        assert_eq!(testcases.len(), 2);
        assert_eq!(testcases[0].source, "a.s16");
        assert_eq!(testcases[0].samples, vec![-1.0, 0.0]);
        assert_eq!(testcases[1].source, "b.s16");
        assert_eq!(testcases[1].samples, vec![3.0, 4.0]);
    }

    #[test]
    fn short_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_s16le(&dir.path().join("short.s16"), &[1]);
        let err = load_dir(dir.path(), 8).unwrap_err();
        assert!(matches!(
            err,
            TuneError::ShortTestcase { got: 1, need: 8, .. }
        ));
    }

    #[test]
    fn empty_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_dir(dir.path(), 8).unwrap_err(),
            TuneError::NoTestcases { .. }
        ));
    }
}
