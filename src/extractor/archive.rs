use crate::error::{FwArchiveError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

const TAR_BLOCK_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
}

impl Compression {
    fn from_magic(magic: &[u8]) -> Self {
        if magic.starts_with(&[0x1f, 0x8b]) {
            Compression::Gzip
        } else if magic.starts_with(b"BZh") {
            Compression::Bzip2
        } else if magic.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
            Compression::Xz
        } else {
            Compression::None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ArchiveKind {
    Tar { compression: Compression },
    Zip,
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveKind::Tar {
                compression: Compression::None,
            } => f.write_str("tar"),
            ArchiveKind::Tar {
                compression: Compression::Gzip,
            } => f.write_str("tar.gz"),
            ArchiveKind::Tar {
                compression: Compression::Bzip2,
            } => f.write_str("tar.bz2"),
            ArchiveKind::Tar {
                compression: Compression::Xz,
            } => f.write_str("tar.xz"),
            ArchiveKind::Zip => f.write_str("zip"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSummary {
    pub kind: ArchiveKind,
    pub entries: usize,
    /// Members which needed the remove-and-retry path.
    pub retried: usize,
}

pub trait Extractor {
    /// Extract `archive` into `dest`. `Ok(None)` means the file is not a
    /// container this extractor understands; nothing is written then.
    fn extract(&self, archive: &Path, dest: &Path) -> Result<Option<ArchiveSummary>>;
}

/// Sniff the container type by content: tar (optionally compressed) first,
/// then zip.
pub fn detect_archive_kind(path: &Path) -> Result<Option<ArchiveKind>> {
    if let Some(compression) = sniff_tar(path)? {
        return Ok(Some(ArchiveKind::Tar { compression }));
    }

    if is_zip_file(path) {
        return Ok(Some(ArchiveKind::Zip));
    }

    Ok(None)
}

fn open_decompressed(path: &Path, compression: Compression) -> io::Result<Box<dyn Read>> {
    let file = BufReader::new(fs::File::open(path)?);
    Ok(match compression {
        Compression::None => Box::new(file),
        Compression::Gzip => Box::new(flate2::read::GzDecoder::new(file)),
        Compression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(file)),
        Compression::Xz => Box::new(xz2::read::XzDecoder::new(file)),
    })
}

/// The magic bytes only pick the first decoder to try. A plain tar whose
/// first member name happens to start with a compression magic still counts.
fn sniff_tar(path: &Path) -> Result<Option<Compression>> {
    let mut magic = [0u8; 6];
    let read = read_up_to(&mut fs::File::open(path)?, &mut magic)?;
    let guessed = Compression::from_magic(&magic[..read]);

    if starts_with_tar_header(path, guessed)? {
        return Ok(Some(guessed));
    }
    if guessed != Compression::None && starts_with_tar_header(path, Compression::None)? {
        return Ok(Some(Compression::None));
    }
    Ok(None)
}

fn starts_with_tar_header(path: &Path, compression: Compression) -> Result<bool> {
    let mut reader = open_decompressed(path, compression)?;
    let mut block = [0u8; TAR_BLOCK_SIZE];
    // Decoder errors just mean this is not a tar with that compression
    match read_up_to(&mut reader, &mut block) {
        Ok(TAR_BLOCK_SIZE) => Ok(is_tar_header(&block)),
        _ => Ok(false),
    }
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// A header block is accepted when its stored checksum matches either the
/// unsigned or the signed byte sum (old tar implementations used the latter).
pub fn is_tar_header(block: &[u8; TAR_BLOCK_SIZE]) -> bool {
    if block.iter().all(|&b| b == 0) {
        return false;
    }

    let header = tar::Header::from_byte_slice(block);
    let Ok(stored) = header.cksum() else {
        return false;
    };

    let (unsigned, signed) = block.iter().enumerate().fold((0u32, 0i32), |(u, s), (i, &b)| {
        let b = if (148..156).contains(&i) { b' ' } else { b };
        (u + b as u32, s + (b as i8) as i32)
    });

    stored == unsigned || stored as i32 == signed
}

fn is_zip_file(path: &Path) -> bool {
    match fs::File::open(path) {
        Ok(file) => zip::ZipArchive::new(BufReader::new(file)).is_ok(),
        Err(_) => false,
    }
}

/// Extracts with the `tar` and `zip` crates.
#[derive(Debug, Clone)]
pub struct LibraryExtractor {
    retry_on_conflict: bool,
}

impl LibraryExtractor {
    pub fn new() -> Self {
        Self {
            retry_on_conflict: true,
        }
    }

    pub fn with_retry_on_conflict(mut self, retry: bool) -> Self {
        self.retry_on_conflict = retry;
        self
    }

    fn extract_tar(&self, archive_path: &Path, compression: Compression, dest: &Path) -> Result<ArchiveSummary> {
        let reader = open_decompressed(archive_path, compression)?;
        let mut archive = tar::Archive::new(reader);
        archive.set_preserve_permissions(false);
        archive.set_preserve_mtime(false);
        archive.set_unpack_xattrs(false);
        archive.set_overwrite(true);

        let mut summary = ArchiveSummary {
            kind: ArchiveKind::Tar { compression },
            entries: 0,
            retried: 0,
        };

        for entry in archive.entries()? {
            let mut entry = entry?;
            let entry_path = entry.path()?.into_owned();

            if let Err(err) = entry.unpack_in(dest) {
                if !self.retry_on_conflict {
                    return Err(err.into());
                }
                let conflicting = dest.join(&entry_path);
                log::warn!(
                    "Extracting {} failed ({}), removing and retrying",
                    conflicting.display(),
                    err
                );
                remove_conflicting(&conflicting)?;
                entry.unpack_in(dest)?;
                summary.retried += 1;
            }
            summary.entries += 1;
        }

        Ok(summary)
    }

    fn extract_zip(&self, archive_path: &Path, dest: &Path) -> Result<ArchiveSummary> {
        let file = fs::File::open(archive_path)?;
        let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(|e| FwArchiveError::Archive {
            path: archive_path.display().to_string(),
            message: e.to_string(),
        })?;

        let mut summary = ArchiveSummary {
            kind: ArchiveKind::Zip,
            entries: 0,
            retried: 0,
        };

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| FwArchiveError::Archive {
                path: archive_path.display().to_string(),
                message: format!("entry {}: {}", i, e),
            })?;

            let Some(relative) = entry.enclosed_name() else {
                log::warn!("Skipping unsafe zip entry name: {}", entry.name());
                continue;
            };
            let out_path = dest.join(&relative);

            if entry.is_dir() {
                fs::create_dir_all(&out_path)?;
            } else {
                if let Some(parent) = out_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut outfile = match fs::File::create(&out_path) {
                    Ok(f) => f,
                    Err(err) if self.retry_on_conflict => {
                        log::warn!(
                            "Extracting {} failed ({}), removing and retrying",
                            out_path.display(),
                            err
                        );
                        remove_conflicting(&out_path)?;
                        summary.retried += 1;
                        fs::File::create(&out_path)?
                    }
                    Err(err) => return Err(err.into()),
                };
                io::copy(&mut entry, &mut outfile)?;
            }
            summary.entries += 1;
        }

        Ok(summary)
    }
}

impl Default for LibraryExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for LibraryExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<Option<ArchiveSummary>> {
        let Some(kind) = detect_archive_kind(archive)? else {
            return Ok(None);
        };

        fs::create_dir_all(dest)?;
        log::info!("Extracting {} ({}) into {}", archive.display(), kind, dest.display());

        let summary = match kind {
            ArchiveKind::Tar { compression } => self.extract_tar(archive, compression, dest)?,
            ArchiveKind::Zip => self.extract_zip(archive, dest)?,
        };

        Ok(Some(summary))
    }
}

fn remove_conflicting(path: &Path) -> Result<()> {
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(FwArchiveError::InvalidPath {
            path: format!("Directory traversal not allowed: {}", path.display()),
        });
    }

    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path)?,
        Ok(_) => fs::remove_file(path)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Relative paths of all regular files below `root`, sorted.
pub fn list_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| FwArchiveError::Io(e.into()))?;
        if entry.file_type().is_file() {
            if let Ok(relative) = entry.path().strip_prefix(root) {
                files.push(relative.to_path_buf());
            }
        }
    }
    files.sort();
    Ok(files)
}
