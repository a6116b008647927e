use super::base_name;
use crate::error::Error;
use crate::model::{ArchiveRecord, CandidateFile, CompressionKind, Group};
use crate::progress::ArchiveReporter;
use crate::stats::SharedStats;
use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const MAX_NAME_ATTEMPTS: usize = 1000;

/// Exclusively create `file_name` in `dest_dir`. If it is taken, try
/// `<stem>_1<ext>`, `<stem>_2<ext>`, ... so an existing container is never reused.
pub fn create_container(
    dest_dir: &Path,
    file_name: &str,
    kind: CompressionKind,
) -> io::Result<(File, PathBuf)> {
    let extension = kind.extension();
    let stem = file_name.strip_suffix(extension).unwrap_or(file_name);

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            file_name.to_string()
        } else {
            format!("{}_{}{}", stem, attempt, extension)
        };
        let path = dest_dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((file, path)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(io::Error::new(
                    err.kind(),
                    format!(
                        "failed to create destination file {}: {}",
                        path.display(),
                        err
                    ),
                ))
            }
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!(
            "no free container name for {} in {}",
            file_name,
            dest_dir.display()
        ),
    ))
}

fn entry_options(size: u64) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(size >= u32::MAX as u64)
}

/// Where a container's bytes go. `sync` runs once the archive is closed.
pub trait ContainerSink: Write + Seek {
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ContainerSink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Write every member of `group` into a zip at `container`.
///
/// Members sharing a base name collapse into one entry: the later member in
/// group order wins and the earlier ones are left out of the record, so they are
/// never verified or deleted. A member that cannot be opened, read or written is
/// recorded in `stats` and skipped. Failing to finish the zip removes it and
/// fails the whole group.
pub fn build_group_archive<W: ContainerSink>(
    group: &Group,
    sink: W,
    container: &Path,
    stats: &SharedStats,
    reporter: &dyn ArchiveReporter,
) -> Result<ArchiveRecord, Error> {
    let mut zip = ZipWriter::new(sink);
    let members = latest_by_base_name(&group.files);
    let mut sources = Vec::with_capacity(members.len());
    let mut bytes_in = 0u64;

    for candidate in members {
        match add_zip_entry(&mut zip, candidate) {
            Ok(()) => {
                info!(
                    "Added to {}: {}",
                    container.display(),
                    candidate.path.display()
                );
                reporter.on_file_added(container, &candidate.path);
                sources.push(candidate.path.clone());
                bytes_in += candidate.size;
            }
            Err(message) => {
                warn!("{}", message);
                stats.record_error(message);
            }
        }
    }

    if let Err(err) = finish_zip(zip) {
        remove_partial(container);
        return Err(Error::Other(format!(
            "closing container {}: {}",
            container.display(),
            err
        )));
    }

    Ok(ArchiveRecord {
        container: container.to_path_buf(),
        kind: CompressionKind::Zip,
        sources,
        bytes_in,
    })
}

/// Group members in order, keeping only the last one for each base name.
fn latest_by_base_name(files: &[CandidateFile]) -> Vec<&CandidateFile> {
    let mut last_index: HashMap<String, usize> = HashMap::with_capacity(files.len());
    for (i, candidate) in files.iter().enumerate() {
        if let Some(name) = base_name(&candidate.path) {
            last_index.insert(name, i);
        }
    }

    files
        .iter()
        .enumerate()
        .filter(|(i, candidate)| {
            let Some(name) = base_name(&candidate.path) else {
                return true;
            };
            let latest = last_index.get(&name) == Some(i);
            if !latest {
                debug!(
                    "{} is replaced in the container by a later {}",
                    candidate.path.display(),
                    name
                );
            }
            latest
        })
        .map(|(_, candidate)| candidate)
        .collect()
}

fn add_zip_entry<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    candidate: &CandidateFile,
) -> Result<(), String> {
    let path = candidate.path.display();
    let entry_name =
        base_name(&candidate.path).ok_or_else(|| format!("zip entry {}: no file name", path))?;

    let mut source = File::open(&candidate.path).map_err(|e| format!("open {}: {}", path, e))?;

    zip.start_file(entry_name.as_str(), entry_options(candidate.size))
        .map_err(|e| format!("zip entry {}: {}", path, e))?;

    if let Err(err) = io::copy(&mut source, zip) {
        let mut message = format!("zip copy {}: {}", path, err);
        if let Err(abort_err) = zip.abort_file() {
            message.push_str(&format!(" (discarding partial entry failed: {})", abort_err));
        }
        return Err(message);
    }

    Ok(())
}

fn finish_zip<W: ContainerSink>(zip: ZipWriter<W>) -> Result<(), Error> {
    let mut sink = zip.finish()?;
    sink.sync()?;
    Ok(())
}

/// Archive one file into its own container (per-file mode).
///
/// Any failure removes the container; the caller records it against that file only.
pub fn build_single_archive(
    candidate: &CandidateFile,
    kind: CompressionKind,
    file: File,
    container: &Path,
    reporter: &dyn ArchiveReporter,
) -> Result<ArchiveRecord, Error> {
    let written = match kind {
        CompressionKind::Zip => write_single_zip(candidate, file),
        CompressionKind::Gzip => write_single_gzip(candidate, file),
    };
    if let Err(err) = written {
        remove_partial(container);
        return Err(err);
    }

    info!(
        "Compressed: {} -> {}",
        candidate.path.display(),
        container.display()
    );
    reporter.on_file_added(container, &candidate.path);

    Ok(ArchiveRecord {
        container: container.to_path_buf(),
        kind,
        sources: vec![candidate.path.clone()],
        bytes_in: candidate.size,
    })
}

fn write_single_zip(candidate: &CandidateFile, file: File) -> Result<(), Error> {
    let mut zip = ZipWriter::new(file);
    add_zip_entry(&mut zip, candidate).map_err(Error::Other)?;
    finish_zip(zip)
}

fn write_single_gzip(candidate: &CandidateFile, file: File) -> Result<(), Error> {
    let mut source = File::open(&candidate.path)?;
    let mut encoder: GzEncoder<File> = GzBuilder::new()
        .filename(base_name(&candidate.path).unwrap_or_default())
        .write(file, Compression::default());
    io::copy(&mut source, &mut encoder)?;
    let file = encoder.finish()?;
    file.sync_all()?;
    Ok(())
}

fn remove_partial(container: &Path) {
    if let Err(err) = fs::remove_file(container) {
        if err.kind() != io::ErrorKind::NotFound {
            warn!(
                "Failed to remove partial container {}: {}",
                container.display(),
                err
            );
        }
    }
}
