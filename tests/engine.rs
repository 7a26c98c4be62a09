//! 同步引擎集成测试：使用内存 mock 远端验证调度语义

use async_trait::async_trait;
use jfsync_lib::core::LocalFile;
use jfsync_lib::remote::{ProbeOutcome, ProgressSender, Remote};
use jfsync_lib::{SyncConfig, SyncEngine, SyncError, TransferOutcome};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// 记录调用并可注入失败的内存远端
#[derive(Default)]
struct MockRemote {
    /// 已上传完成的指纹集合（探测对这些返回 Exists）
    completed: Mutex<HashSet<String>>,
    /// 记录的上传调用 (folder, file_name, fingerprint)
    uploads: Mutex<Vec<(String, String, String)>>,
    /// 上传这些文件名时返回失败状态
    fail_uploads: HashSet<String>,
    /// 上传时的人工延迟（毫秒），用于并发度测试
    upload_delay_ms: u64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockRemote {
    fn with_completed(fingerprints: &[&str]) -> Self {
        Self {
            completed: Mutex::new(fingerprints.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Remote for MockRemote {
    async fn probe(
        &self,
        _remote_folder: &str,
        _file: &LocalFile,
        fingerprint: &str,
    ) -> ProbeOutcome {
        if self.completed.lock().await.contains(fingerprint) {
            ProbeOutcome::Exists
        } else {
            ProbeOutcome::Absent
        }
    }

    async fn upload(
        &self,
        remote_folder: &str,
        file: &LocalFile,
        fingerprint: &str,
        _progress: Option<ProgressSender>,
    ) -> Result<u16, SyncError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if self.upload_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.upload_delay_ms)).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let name = file.file_name();
        self.uploads.lock().await.push((
            remote_folder.to_string(),
            name.clone(),
            fingerprint.to_string(),
        ));

        if self.fail_uploads.contains(&name) {
            return Ok(500);
        }

        self.completed.lock().await.insert(fingerprint.to_string());
        Ok(201)
    }
}

fn make_scenario_tree(dir: &Path) {
    std::fs::write(dir.join("a.txt"), "hi").unwrap();
    std::fs::create_dir_all(dir.join("sub")).unwrap();
    std::fs::write(dir.join("sub").join("b.txt"), "yo").unwrap();
}

fn count_uploaded(outcomes: &[TransferOutcome]) -> usize {
    outcomes
        .iter()
        .filter(|o| matches!(o, TransferOutcome::Uploaded { .. }))
        .count()
}

fn count_skipped(outcomes: &[TransferOutcome]) -> usize {
    outcomes
        .iter()
        .filter(|o| matches!(o, TransferOutcome::Skipped { .. }))
        .count()
}

#[tokio::test]
async fn test_first_run_uploads_then_second_run_skips() {
    let dir = tempfile::tempdir().unwrap();
    make_scenario_tree(dir.path());

    let remote = Arc::new(MockRemote::default());
    let engine = SyncEngine::new(remote.clone());

    // 首次运行：远端为空，两个文件都上传
    let report = engine.sync_directory("backup", dir.path(), &[]).await;
    assert_eq!(report.files_scanned, 2);
    assert_eq!(report.files_uploaded, 2);
    assert_eq!(report.files_skipped, 0);
    assert_eq!(report.files_failed, 0);
    assert_eq!(count_uploaded(&report.outcomes), 2);
    assert!(report.first_error.is_none());
    assert_eq!(report.bytes_transferred, 4);

    // 目录结构映射到远端目录
    let uploads = remote.uploads.lock().await.clone();
    let mut destinations: Vec<(String, String)> = uploads
        .iter()
        .map(|(folder, name, _)| (folder.clone(), name.clone()))
        .collect();
    destinations.sort();
    assert_eq!(
        destinations,
        [
            ("backup".to_string(), "a.txt".to_string()),
            ("backup/sub".to_string(), "b.txt".to_string()),
        ]
    );

    // 指纹是内容的 MD5
    assert!(uploads
        .iter()
        .any(|(_, name, md5)| name == "a.txt" && md5 == "49f68a5c8493ec2c0bf489821c21fc3b"));

    // 再次运行：全部跳过，不再发起上传
    let report = engine.sync_directory("backup", dir.path(), &[]).await;
    assert_eq!(report.files_skipped, 2);
    assert_eq!(report.files_uploaded, 0);
    assert_eq!(count_skipped(&report.outcomes), 2);
    assert_eq!(remote.uploads.lock().await.len(), 2);
}

#[tokio::test]
async fn test_unchanged_content_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "hi").unwrap();

    // 远端已有该内容的指纹记录
    let remote = Arc::new(MockRemote::with_completed(&[
        "49f68a5c8493ec2c0bf489821c21fc3b",
    ]));
    let engine = SyncEngine::new(remote.clone());

    let report = engine.sync_directory("backup", dir.path(), &[]).await;
    assert_eq!(report.files_skipped, 1);
    assert!(remote.uploads.lock().await.is_empty());
}

#[tokio::test]
async fn test_failed_upload_does_not_cancel_siblings() {
    let dir = tempfile::tempdir().unwrap();
    for i in 1..=5 {
        std::fs::write(dir.path().join(format!("f{}.txt", i)), format!("data{}", i)).unwrap();
    }

    let remote = Arc::new(MockRemote {
        fail_uploads: ["f3.txt".to_string()].into_iter().collect(),
        ..Default::default()
    });
    let engine = SyncEngine::new(remote.clone());

    let report = engine.sync_directory("backup", dir.path(), &[]).await;

    // 全部 5 个文件都有结果，失败只影响自身
    assert_eq!(report.outcomes.len(), 5);
    assert_eq!(report.files_uploaded, 4);
    assert_eq!(report.files_failed, 1);

    // 首个失败在积压跑完后一并给出
    let first_error = report.first_error.expect("应包含失败摘要");
    assert!(first_error.contains("f3.txt"));
    assert!(first_error.contains("500"));

    // 5 个上传请求都发出过（含失败的那个）
    assert_eq!(remote.uploads.lock().await.len(), 5);
}

#[tokio::test]
async fn test_concurrency_limit_is_respected() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..8 {
        std::fs::write(dir.path().join(format!("f{}.txt", i)), "x").unwrap();
    }

    let remote = Arc::new(MockRemote {
        upload_delay_ms: 30,
        ..Default::default()
    });
    let engine = SyncEngine::with_config(
        remote.clone(),
        SyncConfig {
            max_concurrent_transfers: 2,
        },
    );

    let report = engine.sync_directory("backup", dir.path(), &[]).await;
    assert_eq!(report.files_uploaded, 8);
    assert!(remote.max_in_flight.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_sequential_mode() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..4 {
        std::fs::write(dir.path().join(format!("f{}.txt", i)), "x").unwrap();
    }

    let remote = Arc::new(MockRemote {
        upload_delay_ms: 10,
        ..Default::default()
    });
    let engine = SyncEngine::with_config(
        remote.clone(),
        SyncConfig {
            max_concurrent_transfers: 1,
        },
    );

    let report = engine.sync_directory("backup", dir.path(), &[]).await;
    assert_eq!(report.files_uploaded, 4);
    assert_eq!(remote.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_ignore_patterns_exclude_files() {
    let dir = tempfile::tempdir().unwrap();
    make_scenario_tree(dir.path());
    std::fs::write(dir.path().join("noise.tmp"), "x").unwrap();

    let remote = Arc::new(MockRemote::default());
    let engine = SyncEngine::new(remote.clone());

    let report = engine
        .sync_directory("backup", dir.path(), &[".tmp".to_string()])
        .await;

    assert_eq!(report.files_scanned, 2);
    assert!(remote
        .uploads
        .lock()
        .await
        .iter()
        .all(|(_, name, _)| name != "noise.tmp"));
}

#[tokio::test]
async fn test_sync_file_single_operation() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "hi").unwrap();

    let remote = Arc::new(MockRemote::default());
    let engine = SyncEngine::new(remote.clone());

    let outcome = engine
        .sync_file("backup", &dir.path().join("a.txt"))
        .await;
    assert!(matches!(outcome, TransferOutcome::Uploaded { status: 201, .. }));

    // 缺失文件映射为失败结果而非 panic
    let outcome = engine
        .sync_file("backup", &dir.path().join("missing.txt"))
        .await;
    assert!(outcome.is_failed());
}
