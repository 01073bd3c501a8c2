use std::{
    io::ErrorKind,
    path::PathBuf,
    process::Stdio,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::{fs, process::Command};
use tracing::{info, warn};

use crate::config::RendererSettings;

use super::types::{RenderError, RenderInvocation, Renderer};

/// Runs the artifact engine as a child process, one process per attempt.
///
/// The child receives `--kind`, `--request <file>`, `--output-dir`,
/// `--output` and `--job-id`; the request file carries the canonical request body and
/// the invocation's painter settings.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    cli_path: PathBuf,
    timeout: Duration,
    invalid_input_exit_code: i32,
}

impl CommandRenderer {
    pub fn new(cli_path: PathBuf, timeout: Duration, invalid_input_exit_code: i32) -> Self {
        Self {
            cli_path,
            timeout,
            invalid_input_exit_code,
        }
    }

    pub fn from_settings(settings: &RendererSettings) -> Self {
        Self::new(
            settings.cli_path.clone(),
            settings.timeout,
            settings.invalid_input_exit_code,
        )
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(&self, invocation: &RenderInvocation) -> Result<(), RenderError> {
        let started_at = Instant::now();
        let kind = invocation.request.kind();

        fs::create_dir_all(&invocation.output_dir)
            .await
            .map_err(|err| RenderError::io(format!("failed to prepare output dir: {err}")))?;

        let request_path = invocation
            .output_dir
            .join(format!("{}.request.json", invocation.job_id));
        let document = invocation
            .request_document()
            .map_err(|err| RenderError::io(format!("failed to encode request: {err}")))?;
        fs::write(&request_path, document)
            .await
            .map_err(|err| RenderError::io(format!("failed to write request file: {err}")))?;

        let child = Command::new(&self.cli_path)
            .arg("--kind")
            .arg(kind.as_str())
            .arg("--request")
            .arg(&request_path)
            .arg("--output-dir")
            .arg(&invocation.output_dir)
            .arg("--output")
            .arg(invocation.output_path())
            .arg("--job-id")
            .arg(invocation.job_id.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                warn!(
                    target = "application::render::command",
                    op = "command::render",
                    result = "error",
                    job_id = %invocation.job_id,
                    kind = kind.as_str(),
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    error_code = "spawn_cli",
                    error = %err,
                    "Failed to spawn renderer CLI"
                );
                if err.kind() == ErrorKind::NotFound {
                    RenderError::Unavailable {
                        message: format!("`{}` not found", self.cli_path.display()),
                    }
                } else {
                    RenderError::io(err.to_string())
                }
            })?;

        // Dropping the timed-out future drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(|err| RenderError::io(err.to_string()))?,
            Err(_) => {
                let elapsed_ms = started_at.elapsed().as_millis() as u64;
                warn!(
                    target = "application::render::command",
                    op = "command::render",
                    result = "timeout",
                    job_id = %invocation.job_id,
                    kind = kind.as_str(),
                    elapsed_ms,
                    "Renderer CLI exceeded its time limit"
                );
                return Err(RenderError::TimedOut { elapsed_ms });
            }
        };

        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        if output.status.success() {
            info!(
                target = "application::render::command",
                op = "command::render",
                result = "ok",
                job_id = %invocation.job_id,
                kind = kind.as_str(),
                elapsed_ms,
                "Renderer CLI finished"
            );
            return Ok(());
        }

        let exit_code = output.status.code();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!(
            target = "application::render::command",
            op = "command::render",
            result = "error",
            job_id = %invocation.job_id,
            kind = kind.as_str(),
            elapsed_ms,
            exit_code = exit_code.map(i64::from).unwrap_or(-1),
            stderr = %stderr,
            "Renderer CLI invocation failed"
        );

        if exit_code == Some(self.invalid_input_exit_code) {
            Err(RenderError::invalid_input(stderr))
        } else {
            Err(RenderError::Crashed { exit_code, stderr })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::{
        collections::{BTreeMap, BTreeSet},
        fs,
        os::unix::fs::PermissionsExt,
        path::Path,
        sync::Arc,
    };

    use serde_json::json;
    use tempfile::TempDir;
    use uuid::Uuid;

    use super::*;
    use crate::{
        application::render::RenderProfile,
        domain::{
            canonical::Canonicalizer,
            entities::GenerationRequest,
            schema::ShapeSchema,
            types::OperationKind,
        },
    };

    struct ESchema(BTreeMap<(String, String), BTreeSet<String>>);

    impl ShapeSchema for ESchema {
        fn dimension_keys(&self, family: &str, subtype: &str) -> Option<&BTreeSet<String>> {
            self.0.get(&(family.to_string(), subtype.to_string()))
        }
    }

    fn make_executable(path: &Path) {
        let mut perms = fs::metadata(path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).expect("set perms");
    }

    fn write_script(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("fake-renderer");
        fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write script");
        make_executable(&path);
        path
    }

    fn invocation(output_dir: PathBuf) -> RenderInvocation {
        let mut families = BTreeMap::new();
        families.insert(
            ("e".to_string(), "1".to_string()),
            BTreeSet::from(["A".to_string()]),
        );
        let request = Canonicalizer::new(Arc::new(ESchema(families)))
            .canonicalize(&GenerationRequest::new(
                OperationKind::ShapeModel,
                json!({"family": "e", "dimensions": {"A": 11}}),
            ))
            .expect("canonical");
        RenderInvocation {
            job_id: Uuid::new_v4(),
            request: Arc::new(request),
            profile: RenderProfile::default(),
            output_dir,
        }
    }

    #[tokio::test]
    async fn writes_output_with_valid_cli() {
        let dir = TempDir::new().expect("temp dir");
        let args_path = dir.path().join("args.log");
        let script = write_script(
            &dir,
            &format!(
                r#"set -eu
echo "$@" > "{args}"
out=""
while [ "$#" -gt 0 ]; do
  case "$1" in
    --output) shift; out="$1" ;;
    *) ;;
  esac
  shift
done
echo "solid shape" > "$out"
"#,
                args = args_path.display()
            ),
        );
        let renderer = CommandRenderer::new(script, Duration::from_secs(10), 65);
        let invocation = invocation(dir.path().join("staging"));

        renderer.render(&invocation).await.expect("render");

        let output = fs::read_to_string(invocation.output_path()).expect("output");
        assert_eq!(output.trim(), "solid shape");
        let args = fs::read_to_string(&args_path).expect("args");
        assert!(args.contains("--kind shape_model"), "unexpected args: {args}");
        assert!(args.contains("--request"), "unexpected args: {args}");

        let request_file = invocation
            .output_dir
            .join(format!("{}.request.json", invocation.job_id));
        let document: serde_json::Value =
            serde_json::from_slice(&fs::read(request_file).expect("request file")).expect("json");
        assert_eq!(document["spec"]["dimensions"]["A"], json!(11.0));
    }

    #[tokio::test]
    async fn invalid_input_exit_code_is_permanent() {
        let dir = TempDir::new().expect("temp dir");
        let script = write_script(&dir, "echo 'shape cannot be built' >&2\nexit 65\n");
        let renderer = CommandRenderer::new(script, Duration::from_secs(10), 65);

        let err = renderer
            .render(&invocation(dir.path().join("staging")))
            .await
            .expect_err("invalid input");
        assert_eq!(err, RenderError::invalid_input("shape cannot be built"));
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn other_exit_codes_are_crashes() {
        let dir = TempDir::new().expect("temp dir");
        let script = write_script(&dir, "echo boom >&2\nexit 42\n");
        let renderer = CommandRenderer::new(script, Duration::from_secs(10), 65);

        let err = renderer
            .render(&invocation(dir.path().join("staging")))
            .await
            .expect_err("crash");
        match err {
            RenderError::Crashed { exit_code, stderr } => {
                assert_eq!(exit_code, Some(42));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_cli_times_out() {
        let dir = TempDir::new().expect("temp dir");
        let script = write_script(&dir, "sleep 5\n");
        let renderer = CommandRenderer::new(script, Duration::from_millis(100), 65);

        let err = renderer
            .render(&invocation(dir.path().join("staging")))
            .await
            .expect_err("timeout");
        assert!(matches!(err, RenderError::TimedOut { .. }));
        assert!(!err.is_permanent());
    }

    #[tokio::test]
    async fn missing_cli_is_unavailable() {
        let dir = TempDir::new().expect("temp dir");
        let renderer = CommandRenderer::new(
            dir.path().join("does-not-exist"),
            Duration::from_secs(1),
            65,
        );

        let err = renderer
            .render(&invocation(dir.path().join("staging")))
            .await
            .expect_err("missing");
        assert!(matches!(err, RenderError::Unavailable { .. }));
    }
}
