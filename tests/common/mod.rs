//! 통합 테스트 공용 fake collaborator

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use game_importer::collaborators::{
    BoxFuture, DependencyInstaller, FetchError, InstallError, InstallPlan, SourceFetcher,
};
use game_importer::config::GlobalConfig;
use game_importer::importer::GameImporter;

pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Populates the destination with fixed files, optionally after waiting on a
/// gate or running into the timeout.
#[derive(Default)]
pub struct FakeFetcher {
    pub files: Vec<(String, String)>,
    pub gate: Option<Arc<Notify>>,
    pub hang: bool,
    pub calls: AtomicUsize,
    pub dest_existed: AtomicBool,
}

impl FakeFetcher {
    pub fn with(files: &[(&str, &str)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SourceFetcher for FakeFetcher {
    fn fetch<'a>(
        &'a self,
        _url: &'a str,
        dest: &'a Path,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<(), FetchError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.dest_existed.store(dest.exists(), Ordering::SeqCst);
        Box::pin(async move {
            for (rel, content) in &self.files {
                write(dest, rel, content);
            }
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.hang {
                tokio::time::sleep(timeout).await;
                return Err(FetchError::Timeout(timeout));
            }
            Ok(())
        })
    }

    fn is_available(&self) -> BoxFuture<'_, bool> {
        Box::pin(async { true })
    }
}

/// Records every plan; succeeds unless `fail` is set.
#[derive(Default)]
pub struct RecordingInstaller {
    pub plans: Mutex<Vec<InstallPlan>>,
    pub fail: bool,
}

impl RecordingInstaller {
    pub fn plans(&self) -> Vec<InstallPlan> {
        self.plans.lock().unwrap().clone()
    }
}

impl DependencyInstaller for RecordingInstaller {
    fn install<'a>(&'a self, plan: &'a InstallPlan) -> BoxFuture<'a, Result<(), InstallError>> {
        self.plans.lock().unwrap().push(plan.clone());
        let fail = self.fail;
        Box::pin(async move {
            if fail {
                Err(InstallError::Failed {
                    tool: "npm".into(),
                    status: "exit status: 1".into(),
                    stderr: "ERR! network".into(),
                })
            } else {
                Ok(())
            }
        })
    }
}

pub fn test_config(game_dir: &Path) -> GlobalConfig {
    let mut cfg = GlobalConfig::default();
    cfg.importer.game_dir = game_dir.to_path_buf();
    cfg.importer.fetch_timeout_secs = 1;
    cfg.launch.port = 0;
    cfg.launch.drain_timeout_secs = 2;
    cfg
}

pub fn importer(
    game_dir: &Path,
    fetcher: Arc<FakeFetcher>,
    installer: Arc<RecordingInstaller>,
) -> GameImporter {
    GameImporter::new(&test_config(game_dir), fetcher, installer)
}
