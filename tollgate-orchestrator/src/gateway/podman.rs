//! Podman image builder
//!
//! Shells out to podman for the three builder operations:
//! - `podman build` + `podman image inspect` for builds
//! - `podman push --authfile` for pushes
//! - `podman rmi` for cleanup
//!
//! Registry credentials go into a per-push auth file that only the current
//! user can read and that is deleted when the push ends. They never appear in
//! arguments or logs, and podman's shared auth file is never touched.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tollgate_core::domain::build::{BuildResult, PushResult};
use tollgate_core::domain::image::ImageRef;
use tollgate_core::domain::secret::RegistryCredentials;
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::{BuilderError, ImageBuilder, classify};

/// Checks if podman is installed and available
pub async fn check_podman_available() -> Result<String, BuilderError> {
    let output = Command::new("podman")
        .arg("--version")
        .output()
        .await
        .map_err(|e| {
            BuilderError::Failed(format!(
                "failed to execute 'podman --version', is podman installed? ({})",
                e
            ))
        })?;

    if !output.status.success() {
        return Err(BuilderError::Failed(
            "podman is not working correctly".to_string(),
        ));
    }

    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    info!("Podman is available: {}", version);

    Ok(version)
}

/// Output of one podman invocation
struct CommandOutput {
    stdout: String,
    stderr: String,
    exit_code: i32,
    success: bool,
}

/// Image builder backed by the podman CLI
pub struct PodmanBuilder {
    /// Executable to run, `podman` unless overridden
    program: PathBuf,
    /// Directory holding the build contexts
    context_root: PathBuf,
    /// Where build output is written, if anywhere
    log_dir: Option<PathBuf>,
}

impl PodmanBuilder {
    /// Creates a new podman builder
    ///
    /// # Arguments
    /// * `context_root` - Build context root. An image whose repository name
    ///   matches a subdirectory (e.g. `backend` for `acme/backend`) is built
    ///   from that subdirectory, otherwise from the root itself.
    pub fn new(context_root: impl Into<PathBuf>) -> Self {
        Self {
            program: PathBuf::from("podman"),
            context_root: context_root.into(),
            log_dir: None,
        }
    }

    /// Runs `program` instead of the `podman` found on `PATH`
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Writes each build's output to `<dir>/<name>-<tag>.log`
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Build context for an image
    pub fn context_for(&self, image: &ImageRef) -> PathBuf {
        let name = image
            .repository
            .rsplit('/')
            .next()
            .unwrap_or(&image.repository);
        let candidate = self.context_root.join(name);

        if candidate.is_dir() {
            candidate
        } else {
            self.context_root.clone()
        }
    }

    async fn run(&self, args: &[&str]) -> Result<CommandOutput, BuilderError> {
        // A stage timeout drops this future; the child must not outlive it
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                BuilderError::Failed(format!("failed to execute podman {}: {}", args[0], e))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !stdout.trim().is_empty() {
            debug!("podman {} stdout: {}", args[0], stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!("podman {} stderr: {}", args[0], stderr.trim());
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code: output.status.code().unwrap_or(-1),
            success: output.status.success(),
        })
    }

    async fn write_build_log(&self, image: &ImageRef, output: &CommandOutput) -> Option<String> {
        let dir = self.log_dir.as_ref()?;
        let name = image.repository.replace(['/', ':'], "_");
        let path = dir.join(format!("{}-{}.log", name, image.tag));

        let content = format!("{}\n--- stderr ---\n{}", output.stdout, output.stderr);
        let written = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, content).await
        }
        .await;

        match written {
            Ok(()) => Some(path.to_string_lossy().to_string()),
            Err(e) => {
                debug!("Failed to write build log {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Reads the image id and configured user of a built image
    async fn inspect(&self, reference: &str) -> Result<(String, Option<String>), BuilderError> {
        let output = self
            .run(&[
                "image",
                "inspect",
                "--format",
                "{{.Id}}|{{.Config.User}}",
                reference,
            ])
            .await?;

        if !output.success {
            return Err(classify(output.exit_code, &output.stderr));
        }

        Ok(parse_inspect(&output.stdout))
    }
}

/// Parses `<id>|<user>` as printed by `podman image inspect`
fn parse_inspect(stdout: &str) -> (String, Option<String>) {
    let line = stdout.lines().next().unwrap_or_default().trim();
    let (id, user) = line.split_once('|').unwrap_or((line, ""));

    let id = id.trim();
    let sha256 = if id.starts_with("sha256:") {
        id.to_string()
    } else {
        format!("sha256:{}", id)
    };
    let user = Some(user.trim())
        .filter(|u| !u.is_empty())
        .map(str::to_string);

    (sha256, user)
}

/// Registry host an image is pushed to
///
/// The first path component is a registry if it looks like a host name
/// (contains `.` or `:`, or is `localhost`); otherwise Docker Hub.
pub fn registry_host(repository: &str) -> &str {
    match repository.split_once('/') {
        Some((first, _)) if first.contains('.') || first.contains(':') || first == "localhost" => {
            first
        }
        _ => "docker.io",
    }
}

/// Writes a podman auth file holding one registry's credentials
///
/// The entry is `base64(user:password)`, the same encoding `podman login`
/// stores. The file is created owner-only; `dir` must be removed once the
/// push is over.
fn write_auth_file(
    dir: &Path,
    registry: &str,
    credentials: &RegistryCredentials,
) -> Result<PathBuf, BuilderError> {
    let username = credentials.username.expose();
    let password = credentials.password.expose();

    let mut pair = Zeroizing::new(Vec::with_capacity(username.len() + password.len() + 1));
    pair.extend_from_slice(username);
    pair.push(b':');
    pair.extend_from_slice(password);
    let encoded = Zeroizing::new(STANDARD.encode(&*pair));

    let key = serde_json::to_string(registry)
        .map_err(|e| BuilderError::Failed(format!("failed to encode registry name: {}", e)))?;
    let content = Zeroizing::new(format!(
        "{{\"auths\":{{{}:{{\"auth\":\"{}\"}}}}}}",
        key, *encoded
    ));

    let path = dir.join("auth.json");
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options
        .open(&path)
        .and_then(|mut file| file.write_all(content.as_bytes()))
        .map_err(|e| {
            BuilderError::Failed(format!("failed to write auth file {}: {}", path.display(), e))
        })?;

    Ok(path)
}

async fn read_digest(path: &Path) -> Option<String> {
    tokio::fs::read_to_string(path)
        .await
        .ok()
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

#[async_trait]
impl ImageBuilder for PodmanBuilder {
    async fn build(&self, image: &ImageRef) -> Result<BuildResult, BuilderError> {
        let reference = image.reference();
        let context = self.context_for(image);
        let context_str = context.to_string_lossy().to_string();

        info!("Building {} from {}", reference, context.display());

        let output = self
            .run(&["build", "-t", &reference, &context_str])
            .await?;
        let log_ref = self.write_build_log(image, &output).await;

        if !output.success {
            return Err(classify(output.exit_code, &output.stderr));
        }

        let (sha256, runtime_user) = self.inspect(&reference).await?;
        info!("Built {} ({})", reference, sha256);

        Ok(BuildResult {
            success: true,
            sha256,
            log_ref,
            runtime_user,
        })
    }

    async fn push(
        &self,
        image: &ImageRef,
        credentials: &RegistryCredentials,
    ) -> Result<PushResult, BuilderError> {
        let reference = image.reference();
        let registry = registry_host(&image.repository);

        // Holds the auth and digest files; removed on drop, including when
        // the push stage times out
        let workdir = tempfile::Builder::new()
            .prefix("tollgate-push-")
            .tempdir()
            .map_err(|e| BuilderError::Failed(format!("failed to create push directory: {}", e)))?;
        let auth_path = write_auth_file(workdir.path(), registry, credentials)?;
        let auth_path_str = auth_path.to_string_lossy().to_string();
        let digest_path = workdir.path().join("digest");
        let digest_path_str = digest_path.to_string_lossy().to_string();

        info!("Pushing {} to {}", reference, registry);
        let output = self
            .run(&[
                "push",
                "--authfile",
                &auth_path_str,
                "--digestfile",
                &digest_path_str,
                &reference,
            ])
            .await?;
        let digest = read_digest(&digest_path).await;

        if !output.success {
            return Err(classify(output.exit_code, &output.stderr));
        }

        info!("Pushed {}", reference);
        Ok(PushResult {
            repository: image.repository.clone(),
            tag: image.tag.clone(),
            success: true,
            digest,
        })
    }

    async fn remove(&self, image: &ImageRef) -> Result<(), BuilderError> {
        let reference = image.reference();
        let output = self.run(&["rmi", &reference]).await?;

        if !output.success {
            return Err(classify(output.exit_code, &output.stderr));
        }

        debug!("Removed local image {}", reference);
        Ok(())
    }
}
