use crate::domain::{bits::byte_size, model::UploadProgress, port::Ui};

/// Writes user facing status lines to stdout, failures to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalUi;

impl Ui for TerminalUi {
    fn say(&self, message: &str) {
        println!("{}", message);
    }

    fn ok(&self) {
        println!("OK\n");
    }

    fn warn(&self, message: &str) {
        println!("WARNING: {}", message);
    }

    fn failed(&self, message: &str) {
        eprintln!("FAILED\n{}", message);
    }

    fn progress(&self, progress: UploadProgress) {
        println!(
            "  {} of {} uploaded ({} files)",
            byte_size(progress.bytes_sent),
            byte_size(progress.total_bytes),
            progress.files
        );
    }
}
