//! The orchestrator: drives a submission from uploaded archive to
//! registered image, and an execution from function id to captured
//! output.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::io::AsyncRead;
use tokio::task;
use tracing::{info, warn};
use uuid::Uuid;
use which::which;

use crate::archive;
use crate::config::Config;
use crate::detect;
use crate::error::Error;
use crate::image::ImageBuilder;
use crate::registry::Registry;
use crate::sandbox::SandboxRunner;
use crate::types::{unix_now, FunctionMetadata};

/// Result of a successful invocation.
#[derive(Debug, Clone)]
pub struct Execution {
    /// Combined stdout/stderr of the container, verbatim.
    pub output: String,
    pub executed_at: i64,
}

pub struct Pipeline {
    config: Config,
    builder: ImageBuilder,
    runner: SandboxRunner,
    registry: Arc<dyn Registry>,
}

impl Pipeline {
    pub fn new(config: Config, registry: Arc<dyn Registry>) -> Self {
        if which("docker").is_err() {
            warn!("docker binary not found on PATH; submissions and executions will fail");
        }

        let builder = ImageBuilder::new(&config);
        let runner = SandboxRunner::new(config.run_timeout);
        Self {
            config,
            builder,
            runner,
            registry,
        }
    }

    /// Take an uploaded archive through extraction, handler detection,
    /// image build, and registration. The working directory is torn down
    /// on every path out of this function.
    pub async fn submit<R>(
        &self,
        filename: &str,
        body: &mut R,
        name: &str,
    ) -> Result<FunctionMetadata, Error>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let workdir = self.create_workdir()?;

        let result = self.run_submission(workdir.path(), filename, body, name).await;

        let path = workdir.path().to_path_buf();
        if let Err(err) = workdir.close() {
            // The submission outcome is already decided; a cleanup
            // failure only gets logged.
            warn!(path = %path.display(), error = %err, "failed to remove working directory");
        }

        result
    }

    async fn run_submission<R>(
        &self,
        workdir: &Path,
        filename: &str,
        body: &mut R,
        name: &str,
    ) -> Result<FunctionMetadata, Error>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        info!(stage = "extracting", filename, name, "submission started");
        let archive_path =
            archive::save_archive(workdir, filename, body, self.config.max_upload_size).await?;

        let workdir_owned = workdir.to_path_buf();
        let extracted =
            task::spawn_blocking(move || archive::extract_archive(&archive_path, &workdir_owned))
                .await
                .map_err(|e| Error::Io(std::io::Error::other(e)))??;

        info!(stage = "detecting_handler", "archive extracted");
        let descriptor = detect::detect_handler(&extracted)?;

        info!(
            stage = "building",
            handler = %descriptor.handler,
            language = %descriptor.language,
            "handler detected"
        );
        let image_id = self
            .builder
            .build(&extracted, descriptor.language, &descriptor.handler)
            .await?;

        info!(stage = "registering", image_id = %image_id, "image built");
        let metadata = FunctionMetadata {
            function_id: Uuid::new_v4().to_string(),
            image_id,
            language: descriptor.language,
            created_at: unix_now(),
            last_executed: None,
            name: name.to_string(),
        };
        self.registry.insert(metadata.clone()).await?;

        Ok(metadata)
    }

    /// Look up a function and run its image. Recording the invocation
    /// timestamp is best-effort: the execution already succeeded, so a
    /// failed bookkeeping write is logged, not surfaced.
    pub async fn execute(
        &self,
        function_id: &str,
        input: Option<&HashMap<String, String>>,
    ) -> Result<Execution, Error> {
        let metadata = self.registry.get(function_id).await?;

        let output = self.runner.run(&metadata.image_id, input).await?;

        let executed_at = unix_now();
        if let Err(err) = self.registry.mark_executed(function_id, executed_at).await {
            warn!(function_id, error = %err, "failed to record execution timestamp");
        }

        Ok(Execution {
            output,
            executed_at,
        })
    }

    fn create_workdir(&self) -> Result<TempDir, Error> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("faas-");
        let workdir = match &self.config.temp_dir {
            Some(base) => builder.tempdir_in(base)?,
            None => builder.tempdir()?,
        };
        Ok(workdir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;
    use std::fs::{self, File};
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = SimpleFileOptions::default();
            for (name, content) in entries {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    fn test_pipeline(base: &Path) -> (Pipeline, Arc<InMemoryRegistry>) {
        let registry = Arc::new(InMemoryRegistry::new());
        let config = Config {
            temp_dir: Some(base.to_path_buf()),
            ..Config::default()
        };
        (Pipeline::new(config, registry.clone()), registry)
    }

    #[tokio::test]
    async fn submit_rejects_unreadable_archive() {
        let base = tempfile::tempdir().unwrap();
        let (pipeline, registry) = test_pipeline(base.path());

        let mut body: &[u8] = b"this is not a zip";
        let result = pipeline.submit("code.zip", &mut body, "demo").await;

        assert!(matches!(result, Err(Error::Archive(_))));
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn submit_requires_a_handler() {
        let base = tempfile::tempdir().unwrap();
        let (pipeline, _) = test_pipeline(base.path());

        let bytes = zip_bytes(&[("readme.md", "# nothing runnable")]);
        let mut body: &[u8] = &bytes;
        let result = pipeline.submit("code.zip", &mut body, "demo").await;

        assert!(matches!(result, Err(Error::NoHandlerFound)));
    }

    #[tokio::test]
    async fn submit_enforces_upload_ceiling() {
        let base = tempfile::tempdir().unwrap();
        let registry = Arc::new(InMemoryRegistry::new());
        let config = Config {
            temp_dir: Some(base.path().to_path_buf()),
            max_upload_size: 16,
            ..Config::default()
        };
        let pipeline = Pipeline::new(config, registry);

        let bytes = zip_bytes(&[("app.py", "print('hello')")]);
        let mut body: &[u8] = &bytes;
        let result = pipeline.submit("code.zip", &mut body, "demo").await;

        assert!(matches!(result, Err(Error::TooLarge(16))));
    }

    #[tokio::test]
    async fn workdir_is_removed_after_failure() {
        let base = tempfile::tempdir().unwrap();
        let (pipeline, _) = test_pipeline(base.path());

        let mut body: &[u8] = b"garbage";
        let _ = pipeline.submit("code.zip", &mut body, "demo").await;

        assert_eq!(fs::read_dir(base.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn execute_unknown_function_fails_fast() {
        let base = tempfile::tempdir().unwrap();
        let (pipeline, registry) = test_pipeline(base.path());

        let result = pipeline.execute("no-such-function", None).await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn submit_accepts_a_saved_archive_file() {
        // Covers the save path with a real file handle rather than an
        // in-memory slice.
        let base = tempfile::tempdir().unwrap();
        let (pipeline, _) = test_pipeline(base.path());

        let staged = base.path().join("staged.zip");
        {
            let mut file = File::create(&staged).unwrap();
            file.write_all(&zip_bytes(&[("notes.txt", "no handler here")]))
                .unwrap();
        }

        let mut body = tokio::fs::File::open(&staged).await.unwrap();
        fs::remove_file(&staged).unwrap();
        let result = pipeline.submit("staged.zip", &mut body, "demo").await;

        assert!(matches!(result, Err(Error::NoHandlerFound)));
    }
}
