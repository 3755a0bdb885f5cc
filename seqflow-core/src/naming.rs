//! Trimmed-read naming conventions
//!
//! The alignment stage consumes the trimming stage's outputs, whose names are
//! chosen by the external trimming tool. The mapping from raw read file names
//! to trimmed file names is kept behind a trait so a tool upgrade that changes
//! its naming only needs a new implementation.

/// Maps raw read file names to the file names the trimming tool writes
pub trait TrimNaming: Send + Sync {
    /// Trimmed file names for a sample's read files, in read order
    fn trimmed_reads(&self, read_files: &[String]) -> Vec<String>;
}

/// Trim Galore naming with uncompressed output
///
/// Single-end: `<base>_trimmed.fq`; paired-end: `<base1>_val_1.fq` and
/// `<base2>_val_2.fq`, where `<base>` is the file name up to its first `.`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrimGaloreNaming;

impl TrimNaming for TrimGaloreNaming {
    fn trimmed_reads(&self, read_files: &[String]) -> Vec<String> {
        if read_files.len() == 2 {
            read_files
                .iter()
                .enumerate()
                .map(|(idx, file)| format!("{}_val_{}.fq", read_base(file), idx + 1))
                .collect()
        } else {
            read_files
                .iter()
                .map(|file| format!("{}_trimmed.fq", read_base(file)))
                .collect()
        }
    }
}

/// File name up to its first `.`
pub fn read_base(file_name: &str) -> &str {
    file_name.split('.').next().unwrap_or(file_name)
}
