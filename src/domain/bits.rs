use std::path::Path;

use log::{debug, info};

use super::{
    model::{DesiredAppState, RemoteApplication, UploadPlan, UploadProgress},
    port::{AppFiles, BitsUploader, Packager, Ui},
};
use crate::error::{PushError, PushResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Uploaded { files: usize, bytes: u64 },
    NoFiles,
    SkippedDockerImage,
}

pub struct BitsTransferManager<'a> {
    files: &'a dyn AppFiles,
    packager: &'a dyn Packager,
    uploader: &'a dyn BitsUploader,
    ui: &'a dyn Ui,
}

impl<'a> BitsTransferManager<'a> {
    pub fn new(
        files: &'a dyn AppFiles,
        packager: &'a dyn Packager,
        uploader: &'a dyn BitsUploader,
        ui: &'a dyn Ui,
    ) -> Self {
        Self {
            files,
            packager,
            uploader,
            ui,
        }
    }

    /// Enumerates, packages and uploads the application bits found under `dir`.
    pub async fn transfer(
        &self,
        desired: &DesiredAppState,
        application: &RemoteApplication,
        dir: &Path,
    ) -> PushResult<TransferOutcome> {
        if desired.docker_image.is_some() {
            debug!("{} runs a docker image, no bits to upload", application.name);
            return Ok(TransferOutcome::SkippedDockerImage);
        }

        let display = dir.display().to_string();
        let files = self
            .files
            .enumerate(dir)
            .map_err(|error| with_path(error, &display))?;
        if files.is_empty() {
            self.ui.warn(&format!("No app files found in '{}'", display));
            return Ok(TransferOutcome::NoFiles);
        }

        let plan = UploadPlan::new(files);
        let archive = self
            .packager
            .package(dir, &plan)
            .map_err(|error| with_path(error, &display))?;
        let bytes = archive.bytes.len() as u64;
        let file_count = archive.file_count;

        self.ui.say(&format!("Uploading {}...", application.name));
        self.ui.say(&format!("Uploading app files from: {}", display));
        self.ui.say(&format!(
            "Uploading {}, {} files",
            byte_size(bytes),
            plan.file_count()
        ));
        let ui = self.ui;
        let progress = move |progress: UploadProgress| {
            debug!(
                "Uploaded {}/{} bytes ({} files)",
                progress.bytes_sent, progress.total_bytes, progress.files
            );
            ui.progress(progress);
        };
        self.uploader
            .upload(&application.guid, archive, &progress)
            .await?;
        self.ui.ok();
        info!("Uploaded {} bytes for {}", bytes, application.guid);
        Ok(TransferOutcome::Uploaded {
            files: file_count,
            bytes,
        })
    }
}

fn with_path(error: PushError, path: &str) -> PushError {
    match error {
        PushError::Files { .. } => error,
        other => PushError::files(path, other),
    }
}

/// Human readable size, `6100000` renders as `5.8M`.
pub fn byte_size(bytes: u64) -> String {
    const UNITS: [(&str, f64); 4] = [
        ("T", 1024.0 * 1024.0 * 1024.0 * 1024.0),
        ("G", 1024.0 * 1024.0 * 1024.0),
        ("M", 1024.0 * 1024.0),
        ("K", 1024.0),
    ];
    let value = bytes as f64;
    for (unit, size) in UNITS {
        if value >= size {
            let scaled = format!("{:.1}", value / size);
            return format!("{}{}", scaled.trim_end_matches(".0"), unit);
        }
    }
    format!("{}B", bytes)
}
