use std::{
    fs::{self, File},
    io::{self, Read},
    path::Path,
};

use bytes::{BufMut, Bytes, BytesMut};
use flate2::{write::GzEncoder, Compression};
use ignore::WalkBuilder;
use log::{debug, trace};
use sha2::{Digest, Sha256};

use crate::{
    domain::{
        model::{Archive, FileDescriptor, UploadPlan},
        port::{AppFiles, Packager},
    },
    error::{PushError, PushResult},
};

/// Per-directory ignore file, gitignore syntax.
pub const IGNORE_FILE: &str = ".cfignore";

/// Never uploaded, whatever the ignore file says.
const ALWAYS_IGNORED: [&str; 8] = [
    ".cfignore",
    ".git",
    ".gitignore",
    ".hg",
    ".svn",
    "_darcs",
    ".DS_Store",
    "manifest.yml",
];

/// Walks application directories on the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsAppFiles;

impl AppFiles for FsAppFiles {
    fn enumerate(&self, dir: &Path) -> PushResult<Vec<FileDescriptor>> {
        let display = dir.display().to_string();
        let metadata = fs::metadata(dir).map_err(|error| PushError::files(&display, error))?;
        if metadata.is_file() {
            return if is_zip(dir) {
                let name = dir
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_default();
                Ok(vec![describe(dir, name).map_err(|error| PushError::files(&display, error))?])
            } else {
                Err(PushError::files(&display, "not a directory or zip archive"))
            };
        }

        let walker = WalkBuilder::new(dir)
            .hidden(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .ignore(false)
            .parents(false)
            .add_custom_ignore_filename(IGNORE_FILE)
            .filter_entry(|entry| {
                !ALWAYS_IGNORED
                    .iter()
                    .any(|ignored| entry.file_name() == *ignored)
            })
            .build();

        let mut descriptors = vec![];
        for entry in walker {
            let entry = entry.map_err(|error| PushError::files(&display, error))?;
            if !entry.file_type().is_some_and(|kind| kind.is_file()) {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(dir)
                .map_err(|error| PushError::files(&display, error))?;
            let name = relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            trace!("Found app file {}", name);
            descriptors.push(
                describe(entry.path(), name).map_err(|error| PushError::files(&display, error))?,
            );
        }
        debug!("Enumerated {} files in {}", descriptors.len(), display);
        Ok(descriptors)
    }
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("zip"))
}

fn describe(path: &Path, name: String) -> io::Result<FileDescriptor> {
    let metadata = fs::metadata(path)?;
    let mut hasher = Sha256::new();
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(FileDescriptor {
        path: name,
        digest: format!("{:x}", hasher.finalize()),
        mode: file_mode(&metadata),
        size: metadata.len(),
    })
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

/// Packages the planned files as a gzipped tarball. A zip archive is sent as is.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarGzPackager;

impl Packager for TarGzPackager {
    fn package(&self, dir: &Path, plan: &UploadPlan) -> PushResult<Archive> {
        let display = dir.display().to_string();
        if dir.is_file() && is_zip(dir) {
            let bytes = fs::read(dir).map_err(|error| PushError::files(&display, error))?;
            return Ok(Archive {
                bytes: Bytes::from(bytes),
                file_count: plan.file_count(),
            });
        }
        let bytes = tar_gz(dir, plan).map_err(|error| PushError::files(&display, error))?;
        Ok(Archive {
            bytes,
            file_count: plan.file_count(),
        })
    }
}

fn tar_gz(dir: &Path, plan: &UploadPlan) -> io::Result<Bytes> {
    let tar_gz = BytesMut::new().writer();
    let enc = GzEncoder::new(tar_gz, Compression::default());
    let mut tar = tar::Builder::new(enc);
    for entry in plan.entries() {
        let mut file = File::open(dir.join(&entry.path))?;
        let mut header = tar::Header::new_gnu();
        header.set_size(entry.size);
        header.set_mode(entry.mode);
        header.set_cksum();
        tar.append_data(&mut header, &entry.path, &mut file)?;
    }
    let tar_gz = tar.into_inner()?.finish()?;
    Ok(tar_gz.into_inner().freeze())
}
