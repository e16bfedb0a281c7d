//! Screen capture through an external helper program (grim)
//!
//! The helper writes a PPM to a fixed path in the runtime directory; the
//! file is loaded and removed straight away.

use crate::advisory::AdvisorySink;
use crate::geometry::GeometryUnifier;
use deskgrab_core::{BackendResult, CaptureConfig, CaptureError, CaptureResult, CapturedImage};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// File name of the helper's output inside the runtime directory
pub const HELPER_OUTPUT_NAME: &str = "deskgrab.ppm";

/// Captures the desktop by running `<program> -t ppm <path>`
pub struct HelperToolBackend {
    program: String,
    timeout: Duration,
    output_path: PathBuf,
    advisor: Arc<dyn AdvisorySink>,
}

impl HelperToolBackend {
    pub fn new(program: impl Into<String>, timeout: Duration, advisor: Arc<dyn AdvisorySink>) -> Self {
        Self {
            program: program.into(),
            timeout,
            output_path: Self::default_output_path(),
            advisor,
        }
    }

    pub fn from_config(config: &CaptureConfig, advisor: Arc<dyn AdvisorySink>) -> Self {
        Self::new(
            config.helper_program.clone(),
            Duration::from_millis(config.helper_timeout_ms),
            advisor,
        )
    }

    /// Write the helper's output somewhere other than the runtime directory
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    /// `$XDG_RUNTIME_DIR/deskgrab.ppm`, or the temp dir when there is no
    /// runtime directory
    pub fn default_output_path() -> PathBuf {
        dirs::runtime_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(HELPER_OUTPUT_NAME)
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Run the helper and return its image reconciled against the current
    /// desktop geometry
    pub async fn run_helper_capture(&self, unifier: &GeometryUnifier) -> BackendResult {
        match self.capture().await {
            Ok(image) => {
                info!(
                    "{} captured {}x{}",
                    self.program,
                    image.width(),
                    image.height()
                );
                BackendResult::success(unifier.reconcile(image).await)
            }
            Err(e) => {
                debug!("Helper capture failed: {}", e);
                self.advisor.error(&format!(
                    "The universal Wayland capture adapter requires `{}` as its screen capture \
                     component. If it is missing, please install it! ({})",
                    self.program, e
                ));
                BackendResult::failure()
            }
        }
    }

    async fn capture(&self) -> CaptureResult<CapturedImage> {
        debug!(
            "Running {} -t ppm {}",
            self.program,
            self.output_path.display()
        );

        let child = Command::new(&self.program)
            .args(["-t", "ppm"])
            .arg(&self.output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::HelperTool(format!("failed to start {}: {}", self.program, e)))?;
        let _output_file = OutputFile(&self.output_path);

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| CaptureError::HelperToolTimeout {
                program: self.program.clone(),
                timeout_ms: self.timeout.as_millis() as u64,
            })??;

        if !output.status.success() {
            return Err(CaptureError::HelperTool(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        CapturedImage::load(&self.output_path)
    }
}

/// Removes the helper's output file when dropped, so the file goes away on
/// every exit path once the helper has been started
struct OutputFile<'a>(&'a Path);

impl Drop for OutputFile<'_> {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", self.0.display(), e);
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::advisory::AdvisoryLevel;
    use crate::output::StaticOutputs;
    use crate::testing::RecordingAdvisor;
    use deskgrab_core::{DesktopSession, OutputDescriptor, Rect};
    use std::os::unix::fs::PermissionsExt;
    use tempfile::{tempdir, TempDir};

    /// Writes a 4x2 black PPM when called with `-t ppm <path>`
    const WRITES_PPM: &str = r#"#!/bin/sh
[ "$1" = "-t" ] && [ "$2" = "ppm" ] || exit 2
printf 'P6\n4 2\n255\n' > "$3"
head -c 24 /dev/zero >> "$3"
"#;

    fn script(dir: &TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn unifier(width: i32, height: i32) -> GeometryUnifier {
        GeometryUnifier::new(
            DesktopSession::x11(),
            Arc::new(StaticOutputs::new(vec![OutputDescriptor::new(
                1,
                "DP-1",
                Rect::new(0, 0, width, height),
                1.0,
            )])),
        )
    }

    #[tokio::test]
    async fn test_helper_success_loads_and_removes_output() {
        let dir = tempdir().unwrap();
        let program = script(&dir, "fake-grim", WRITES_PPM);
        let advisor = Arc::new(RecordingAdvisor::new());
        let out = dir.path().join("capture.ppm");
        let backend = HelperToolBackend::new(program, Duration::from_secs(10), advisor.clone())
            .with_output_path(&out);

        let result = backend.run_helper_capture(&unifier(4, 2)).await;

        assert!(result.ok());
        let image = result.image().unwrap();
        assert_eq!(image.size(), (4, 2));
        assert_eq!(image.scale, 1.0);
        assert!(!out.exists());
        assert!(advisor.messages().is_empty());
    }

    #[tokio::test]
    async fn test_helper_image_is_reconciled() {
        let dir = tempdir().unwrap();
        let program = script(&dir, "fake-grim", WRITES_PPM);
        let backend = HelperToolBackend::new(
            program,
            Duration::from_secs(10),
            Arc::new(RecordingAdvisor::new()),
        )
        .with_output_path(dir.path().join("capture.ppm"));

        // 4x2 buffer against a desktop the windowing system calls 3x1
        let result = backend.run_helper_capture(&unifier(3, 1)).await;
        assert_eq!(result.image().unwrap().scale, 2.0);
    }

    #[tokio::test]
    async fn test_helper_nonzero_exit_fails() {
        let dir = tempdir().unwrap();
        let program = script(&dir, "broken-grim", "#!/bin/sh\necho 'no outputs' >&2\nexit 1\n");
        let advisor = Arc::new(RecordingAdvisor::new());
        let backend = HelperToolBackend::new(program, Duration::from_secs(10), advisor.clone())
            .with_output_path(dir.path().join("capture.ppm"));

        let result = backend.run_helper_capture(&unifier(4, 2)).await;

        assert!(!result.ok());
        assert!(result.image().is_none());
        let errors = advisor.at_level(AdvisoryLevel::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("broken-grim"));
    }

    #[tokio::test]
    async fn test_missing_helper_names_dependency() {
        let dir = tempdir().unwrap();
        let advisor = Arc::new(RecordingAdvisor::new());
        let backend = HelperToolBackend::new(
            "deskgrab-no-such-grim",
            Duration::from_secs(1),
            advisor.clone(),
        )
        .with_output_path(dir.path().join("capture.ppm"));

        let result = backend.run_helper_capture(&unifier(4, 2)).await;

        assert!(!result.ok());
        assert!(advisor.at_level(AdvisoryLevel::Error)[0].contains("deskgrab-no-such-grim"));
    }

    #[tokio::test]
    async fn test_helper_timeout_fails_and_removes_partial_output() {
        let dir = tempdir().unwrap();
        let program = script(
            &dir,
            "slow-grim",
            "#!/bin/sh\nprintf 'P6\\n4 2\\n255\\n' > \"$3\"\nsleep 5\n",
        );
        let advisor = Arc::new(RecordingAdvisor::new());
        let out = dir.path().join("capture.ppm");
        let backend = HelperToolBackend::new(program, Duration::from_millis(300), advisor.clone())
            .with_output_path(&out);

        let result = backend.run_helper_capture(&unifier(4, 2)).await;

        assert!(!result.ok());
        assert_eq!(advisor.at_level(AdvisoryLevel::Error).len(), 1);
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_nonzero_exit_removes_output() {
        let dir = tempdir().unwrap();
        let program = script(&dir, "half-grim", "#!/bin/sh\nprintf 'P6\\n' > \"$3\"\nexit 1\n");
        let out = dir.path().join("capture.ppm");
        let backend = HelperToolBackend::new(
            program,
            Duration::from_secs(10),
            Arc::new(RecordingAdvisor::new()),
        )
        .with_output_path(&out);

        assert!(!backend.run_helper_capture(&unifier(4, 2)).await.ok());
        assert!(!out.exists());
    }
}
