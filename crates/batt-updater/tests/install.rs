//! Integration tests for the install pipeline with a fake disk image.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mockito::{Server, ServerGuard};
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use batt_updater::{
    DiskImageMounter, InstallerOptions, NoProxy, Relauncher, SwapStrategy, UpdateError,
    UpdateInfo, UpdateInstaller,
};

const IMAGE_BYTES: &[u8] = b"not really a disk image, but 1000 bytes would do as well";

/// Pretends that `volume` is the content of every attached image.
struct FakeMounter {
    volume: PathBuf,
    fail_attach: bool,
    attached: Mutex<Vec<PathBuf>>,
    detached: Mutex<Vec<PathBuf>>,
}

impl FakeMounter {
    fn new(volume: &Path) -> Self {
        Self {
            volume: volume.to_path_buf(),
            fail_attach: false,
            attached: Mutex::new(Vec::new()),
            detached: Mutex::new(Vec::new()),
        }
    }
}

impl DiskImageMounter for FakeMounter {
    fn attach(&self, image: &Path) -> batt_updater::Result<PathBuf> {
        assert!(image.exists(), "image should be downloaded before mounting");
        self.attached.lock().unwrap().push(image.to_path_buf());
        if self.fail_attach {
            return Err(UpdateError::Mount("hdiutil: attach failed - corrupt image".into()));
        }
        Ok(self.volume.clone())
    }

    fn detach(&self, mount_point: &Path) -> batt_updater::Result<()> {
        self.detached.lock().unwrap().push(mount_point.to_path_buf());
        Ok(())
    }
}

#[derive(Default)]
struct FakeRelauncher {
    fail: bool,
    launched: Mutex<Vec<PathBuf>>,
    backup_at_launch: Mutex<Option<bool>>,
    terminated: AtomicBool,
}

impl Relauncher for FakeRelauncher {
    fn launch(&self, bundle: &Path) -> batt_updater::Result<()> {
        assert!(
            !self.terminated.load(Ordering::SeqCst),
            "old process terminated before launch"
        );
        self.launched.lock().unwrap().push(bundle.to_path_buf());
        let mut backup = bundle.as_os_str().to_owned();
        backup.push(".backup");
        *self.backup_at_launch.lock().unwrap() = Some(Path::new(&backup).exists());
        if self.fail {
            return Err(UpdateError::Relaunch("open: not found".into()));
        }
        Ok(())
    }

    fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }
}

struct Fixture {
    root: TempDir,
    volume: PathBuf,
    installed: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let volume = root.path().join("Volumes/batt");
        let installed = root.path().join("Applications/batt.app");
        make_bundle(&volume.join("batt.app"), "new");
        make_bundle(&installed, "old");
        Self {
            root,
            volume,
            installed,
        }
    }

    fn options(&self) -> InstallerOptions {
        InstallerOptions {
            executable: Some(self.installed.join("Contents/MacOS/batt")),
            fallback_bundle_paths: Vec::new(),
            staging_dir: Some(self.root.path().to_path_buf()),
            backup_grace: Duration::from_millis(20),
            relaunch_delay: Duration::from_millis(10),
            ..Default::default()
        }
    }

    fn installed_version(&self) -> String {
        fs::read_to_string(self.installed.join("Contents/MacOS/batt")).unwrap()
    }
}

fn make_bundle(path: &Path, version: &str) {
    fs::create_dir_all(path.join("Contents/MacOS")).unwrap();
    fs::write(path.join("Contents/MacOS/batt"), version).unwrap();
    fs::write(path.join("Contents/Info.plist"), "<plist/>").unwrap();
}

async fn serve_image(server: &mut ServerGuard) -> mockito::Mock {
    server
        .mock("GET", "/download/batt-v9.9.9.dmg")
        .with_status(200)
        .with_header("content-type", "application/x-apple-diskimage")
        .with_body(IMAGE_BYTES)
        .create_async()
        .await
}

fn update_info(server: &ServerGuard, sha256: Option<String>) -> UpdateInfo {
    UpdateInfo {
        current_version: "v1.0.0".to_string(),
        latest_version: "v9.9.9".to_string(),
        has_update: true,
        release_url: "https://github.com/charlie0129/batt/releases/tag/v9.9.9".to_string(),
        download_url: format!("{}/download/batt-v9.9.9.dmg", server.url()),
        download_size: IMAGE_BYTES.len() as u64,
        sha256,
        release_notes: String::new(),
        published_at: None,
    }
}

fn image_digest() -> String {
    hex::encode(Sha256::digest(IMAGE_BYTES))
}

#[tokio::test]
async fn test_install_swaps_bundle_and_relaunches() {
    let fixture = Fixture::new();
    let mut server = Server::new_async().await;
    let mock = serve_image(&mut server).await;

    let mounter = Arc::new(FakeMounter::new(&fixture.volume));
    let relauncher = Arc::new(FakeRelauncher::default());
    let percents = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&percents);

    let installer = UpdateInstaller::new(fixture.options(), Arc::new(NoProxy))
        .unwrap()
        .with_mounter(mounter.clone())
        .with_relauncher(relauncher.clone())
        .on_progress(move |progress| sink.lock().unwrap().push(progress.percent));

    let outcome = installer
        .download_and_install(&update_info(&server, Some(image_digest())))
        .await
        .unwrap();

    assert_eq!(outcome.bundle_path, fixture.installed);
    assert_eq!(outcome.strategy, SwapStrategy::Direct);
    assert_eq!(fixture.installed_version(), "new");
    // Busy until the backup is removed and the relaunch has run.
    assert!(installer.is_installing());
    mock.assert_async().await;

    // The image is detached and its download directory is gone.
    assert_eq!(*mounter.detached.lock().unwrap(), vec![fixture.volume.clone()]);
    let image = mounter.attached.lock().unwrap()[0].clone();
    assert!(!image.exists());

    assert_eq!(
        *percents.lock().unwrap(),
        vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]
    );

    let backup = outcome.backup.clone().unwrap();
    let relaunched = tokio::time::timeout(Duration::from_secs(5), outcome.relaunch)
        .await
        .unwrap()
        .unwrap();
    assert!(relaunched.is_ok());
    assert_eq!(
        *relauncher.launched.lock().unwrap(),
        vec![fixture.installed.clone()]
    );
    assert!(relauncher.terminated.load(Ordering::SeqCst));
    assert_eq!(*relauncher.backup_at_launch.lock().unwrap(), Some(false));
    assert!(!backup.exists());
    assert!(!installer.is_installing());
}

#[tokio::test]
async fn test_install_is_busy_until_cleanup_finishes() {
    let fixture = Fixture::new();
    let mut server = Server::new_async().await;
    let _mock = serve_image(&mut server).await;
    let options = InstallerOptions {
        backup_grace: Duration::from_millis(300),
        ..fixture.options()
    };

    let installer = UpdateInstaller::new(options, Arc::new(NoProxy))
        .unwrap()
        .with_mounter(Arc::new(FakeMounter::new(&fixture.volume)))
        .with_relauncher(Arc::new(FakeRelauncher::default()));
    let info = update_info(&server, None);

    let first = installer.download_and_install(&info).await.unwrap();
    let backup = first.backup.clone().unwrap();

    let err = installer.download_and_install(&info).await.unwrap_err();
    assert!(matches!(err, UpdateError::Busy));
    assert!(backup.exists());

    tokio::time::timeout(Duration::from_secs(5), first.relaunch)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(!backup.exists());
    assert!(!installer.is_installing());

    // Accepted again once the first install is fully done, and its backup
    // survives until its own grace delay.
    let second = installer.download_and_install(&info).await.unwrap();
    assert!(second.backup.unwrap().exists());
}

#[tokio::test]
async fn test_checksum_mismatch_stops_before_mounting() {
    let fixture = Fixture::new();
    let mut server = Server::new_async().await;
    let _mock = serve_image(&mut server).await;
    let mounter = Arc::new(FakeMounter::new(&fixture.volume));

    let installer = UpdateInstaller::new(fixture.options(), Arc::new(NoProxy))
        .unwrap()
        .with_mounter(mounter.clone())
        .with_relauncher(Arc::new(FakeRelauncher::default()));

    let wrong = "0".repeat(64);
    let err = installer
        .download_and_install(&update_info(&server, Some(wrong)))
        .await
        .unwrap_err();

    assert!(matches!(err, UpdateError::ChecksumMismatch { .. }));
    assert!(mounter.attached.lock().unwrap().is_empty());
    assert_eq!(fixture.installed_version(), "old");
}

#[tokio::test]
async fn test_mount_failure_leaves_install_untouched() {
    let fixture = Fixture::new();
    let mut server = Server::new_async().await;
    let _mock = serve_image(&mut server).await;
    let mut mounter = FakeMounter::new(&fixture.volume);
    mounter.fail_attach = true;

    let installer = UpdateInstaller::new(fixture.options(), Arc::new(NoProxy))
        .unwrap()
        .with_mounter(Arc::new(mounter))
        .with_relauncher(Arc::new(FakeRelauncher::default()));

    let err = installer
        .download_and_install(&update_info(&server, None))
        .await
        .unwrap_err();

    assert!(matches!(err, UpdateError::Mount(_)));
    assert!(err.to_string().starts_with("failed to mount disk image"));
    assert_eq!(fixture.installed_version(), "old");
}

#[tokio::test]
async fn test_image_without_bundle_is_detached() {
    let fixture = Fixture::new();
    fs::remove_dir_all(fixture.volume.join("batt.app")).unwrap();
    let mut server = Server::new_async().await;
    let _mock = serve_image(&mut server).await;
    let mounter = Arc::new(FakeMounter::new(&fixture.volume));

    let installer = UpdateInstaller::new(fixture.options(), Arc::new(NoProxy))
        .unwrap()
        .with_mounter(mounter.clone())
        .with_relauncher(Arc::new(FakeRelauncher::default()));

    let err = installer
        .download_and_install(&update_info(&server, None))
        .await
        .unwrap_err();

    assert!(matches!(err, UpdateError::BundleNotFound(_)));
    assert_eq!(mounter.detached.lock().unwrap().len(), 1);
    assert_eq!(fixture.installed_version(), "old");
}

#[tokio::test]
async fn test_download_failure() {
    let fixture = Fixture::new();
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/download/batt-v9.9.9.dmg")
        .with_status(404)
        .create_async()
        .await;
    let mounter = Arc::new(FakeMounter::new(&fixture.volume));

    let installer = UpdateInstaller::new(fixture.options(), Arc::new(NoProxy))
        .unwrap()
        .with_mounter(mounter.clone());

    let err = installer
        .download_and_install(&update_info(&server, None))
        .await
        .unwrap_err();

    assert!(matches!(err, UpdateError::Download(_)));
    assert!(mounter.attached.lock().unwrap().is_empty());
    assert_eq!(fixture.installed_version(), "old");
}

#[tokio::test]
async fn test_relaunch_failure_keeps_installation() {
    let fixture = Fixture::new();
    let mut server = Server::new_async().await;
    let _mock = serve_image(&mut server).await;
    let relauncher = Arc::new(FakeRelauncher {
        fail: true,
        ..Default::default()
    });

    let installer = UpdateInstaller::new(fixture.options(), Arc::new(NoProxy))
        .unwrap()
        .with_mounter(Arc::new(FakeMounter::new(&fixture.volume)))
        .with_relauncher(relauncher.clone());

    let outcome = installer
        .download_and_install(&update_info(&server, None))
        .await
        .unwrap();
    let backup = outcome.backup.clone().unwrap();

    let relaunched = tokio::time::timeout(Duration::from_secs(5), outcome.relaunch)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(relaunched, Err(UpdateError::Relaunch(_))));
    assert!(!relauncher.terminated.load(Ordering::SeqCst));
    assert_eq!(fixture.installed_version(), "new");
    // Cleanup still ran.
    assert!(!backup.exists());
    assert!(!installer.is_installing());
}

#[tokio::test]
async fn test_falls_back_to_install_dirs() {
    let fixture = Fixture::new();
    let mut server = Server::new_async().await;
    let _mock = serve_image(&mut server).await;

    let options = InstallerOptions {
        executable: Some(PathBuf::from("/usr/local/bin/batt")),
        fallback_bundle_paths: vec![
            fixture.root.path().join("missing/batt.app"),
            fixture.installed.clone(),
        ],
        ..fixture.options()
    };
    let installer = UpdateInstaller::new(options, Arc::new(NoProxy))
        .unwrap()
        .with_mounter(Arc::new(FakeMounter::new(&fixture.volume)))
        .with_relauncher(Arc::new(FakeRelauncher::default()));

    let outcome = installer
        .download_and_install(&update_info(&server, None))
        .await
        .unwrap();

    assert_eq!(outcome.bundle_path, fixture.installed);
    assert_eq!(fixture.installed_version(), "new");
}
