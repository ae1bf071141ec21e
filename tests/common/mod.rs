use std::{
    fs,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use cleverpush::{
    domain::{
        self,
        model::{Domain, PushFlags, RoutingType, UploadProgress},
        port::{Ui, WordGenerator},
        reconciler::Target,
        PushReport, PushRequest, PushService,
    },
    error::PushResult,
    infra::{
        files::{FsAppFiles, TarGzPackager},
        manifest_file::YamlManifestReader,
        memory::InMemoryPlatform,
    },
};
use semver::Version;
use tempfile::TempDir;

/// Keeps every line the push reported to the user.
#[derive(Default)]
pub struct RecordingUi {
    lines: Mutex<Vec<String>>,
    progress: Mutex<Vec<UploadProgress>>,
}

impl RecordingUi {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn progress_reports(&self) -> Vec<UploadProgress> {
        self.progress.lock().unwrap().clone()
    }

    pub fn mentions(&self, fragment: &str) -> bool {
        self.lines().iter().any(|line| line.contains(fragment))
    }

    fn push(&self, line: String) {
        self.lines.lock().unwrap().push(line);
    }
}

impl Ui for RecordingUi {
    fn say(&self, message: &str) {
        self.push(message.to_string());
    }

    fn ok(&self) {
        self.push("OK".to_string());
    }

    fn warn(&self, message: &str) {
        self.push(format!("WARNING: {}", message));
    }

    fn failed(&self, message: &str) {
        self.push(format!("FAILED: {}", message));
    }

    fn progress(&self, progress: UploadProgress) {
        self.progress.lock().unwrap().push(progress);
    }
}

pub struct FixedWord;

impl WordGenerator for FixedWord {
    fn babble(&self) -> String {
        "random-word".to_string()
    }
}

/// A different word on every call, like the real generator.
#[derive(Default)]
pub struct CountingWords {
    calls: AtomicUsize,
}

impl WordGenerator for CountingWords {
    fn babble(&self) -> String {
        format!("word{}", self.calls.fetch_add(1, Ordering::SeqCst))
    }
}

pub fn domain(name: &str, shared: bool) -> Domain {
    Domain {
        guid: format!("{}-guid", name),
        name: name.to_string(),
        shared,
        routing: RoutingType::Http,
    }
}

pub fn named(name: &str) -> PushFlags {
    PushFlags {
        app_name: Some(name.to_string()),
        ..Default::default()
    }
}

pub struct Harness {
    pub platform: Arc<InMemoryPlatform>,
    pub ui: Arc<RecordingUi>,
    pub service: PushService,
    pub dir: TempDir,
}

impl Harness {
    /// Working directory holds a single application file and no manifest.
    pub fn new(domains: Vec<Domain>) -> Self {
        let platform = Arc::new(InMemoryPlatform::new());
        for domain in domains {
            platform.add_domain(domain);
        }
        platform.add_stack("cflinuxfs4");
        let ui = Arc::new(RecordingUi::default());
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.js"), "console.log('hello')").unwrap();

        let service = PushService {
            applications: platform.clone(),
            domains: platform.clone(),
            routes: platform.clone(),
            service_instances: platform.clone(),
            service_binder: platform.clone(),
            stacks: platform.clone(),
            lifecycle: platform.clone(),
            uploader: platform.clone(),
            app_files: Arc::new(FsAppFiles),
            packager: Arc::new(TarGzPackager),
            manifests: Arc::new(YamlManifestReader),
            words: Arc::new(FixedWord),
            ui: ui.clone(),
            target: Target {
                org_guid: "my-org-guid".to_string(),
                org_name: "my-org".to_string(),
                space_guid: "my-space-guid".to_string(),
                space_name: "my-space".to_string(),
                user: "my-user".to_string(),
            },
            api_version: Version::new(2, 75, 0),
        };
        Self {
            platform,
            ui,
            service,
            dir,
        }
    }

    pub fn working_dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_manifest(&self, content: &str) {
        fs::write(self.dir.path().join("manifest.yml"), content).unwrap();
    }

    pub async fn push(&self, flags: PushFlags) -> PushResult<PushReport> {
        domain::push(
            &self.service,
            PushRequest {
                flags,
                working_dir: self.dir.path().to_path_buf(),
            },
        )
        .await
    }
}
