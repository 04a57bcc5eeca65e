//! Image building: render the recipe into the build context, drive
//! `docker build` under the build deadline, extract the image digest.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Error;
use crate::process;
use crate::recipe::BuildRecipe;
use crate::types::{unix_now, Language};

/// Fixed filename of the rendered recipe inside the build context.
const RECIPE_FILENAME: &str = "Dockerfile";

/// Cap on build output carried inside a `BuildFailed` error.
const OUTPUT_INSPECT_LIMIT: usize = 4096;

pub struct ImageBuilder {
    image_prefix: String,
    template_dir: PathBuf,
    build_timeout: Duration,
}

impl ImageBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            image_prefix: config.image_prefix.clone(),
            template_dir: config.template_dir.clone(),
            build_timeout: config.build_timeout,
        }
    }

    /// Build an image for the extracted tree and return its handle: the
    /// content-addressed digest when the build output yields one, else
    /// the generated tag.
    pub async fn build(
        &self,
        context_dir: &Path,
        language: Language,
        handler: &str,
    ) -> Result<String, Error> {
        let recipe = BuildRecipe::load(&self.template_dir, language)?;
        let dockerfile = recipe.render(handler);
        tokio::fs::write(context_dir.join(RECIPE_FILENAME), dockerfile).await?;

        // Timestamp uniqueness is enough here; two builds of the same
        // language within one second is an accepted collision risk.
        let tag = format!("{}:{}-{}", self.image_prefix, language, unix_now());
        info!(%tag, dir = %context_dir.display(), "building image");

        let mut command = Command::new("docker");
        command.args(["build", "-t"]).arg(&tag).arg(context_dir);

        let output = process::run_with_deadline(command, self.build_timeout).await?;
        if !output.success {
            return Err(Error::BuildFailed(truncate_output(&output.combined)));
        }

        match extract_image_digest(&output.combined) {
            Some(digest) => {
                info!(image = %digest, %tag, "image built");
                Ok(digest)
            }
            None => {
                warn!(%tag, "image digest not found in build output, using tag");
                Ok(tag)
            }
        }
    }
}

/// Pull the content-addressed identifier out of successful build output.
/// BuildKit prints `writing image sha256:<digest>` when it commits the
/// image.
fn extract_image_digest(output: &str) -> Option<String> {
    let pattern = Regex::new(r"writing image\s+(sha256:[0-9a-f]+)").ok()?;
    pattern
        .captures(output)
        .map(|captures| captures[1].to_string())
}

fn truncate_output(output: &str) -> String {
    if output.len() <= OUTPUT_INSPECT_LIMIT {
        return output.to_string();
    }
    let mut end = OUTPUT_INSPECT_LIMIT;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &output[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_extracted_from_buildkit_output() {
        let output = "\
#7 exporting to image\n\
#7 exporting layers done\n\
#7 writing image sha256:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08 done\n\
#7 naming to docker.io/library/faas:python-1700000000 done\n";

        assert_eq!(
            extract_image_digest(output).as_deref(),
            Some("sha256:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08")
        );
    }

    #[test]
    fn digest_absent_yields_none() {
        assert_eq!(extract_image_digest("Successfully built 9f86d081884c"), None);
    }

    #[test]
    fn long_output_is_truncated() {
        let output = "x".repeat(OUTPUT_INSPECT_LIMIT * 2);
        let truncated = truncate_output(&output);
        assert!(truncated.len() < output.len());
        assert!(truncated.ends_with("... (truncated)"));

        let short = "short output";
        assert_eq!(truncate_output(short), short);
    }

    #[tokio::test]
    async fn missing_template_fails_before_any_build() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            template_dir: dir.path().join("no-templates"),
            ..Config::default()
        };
        let builder = ImageBuilder::new(&config);

        let result = builder.build(dir.path(), Language::Python, "app.py").await;
        assert!(matches!(result, Err(Error::Template(_))));
        assert!(!dir.path().join(RECIPE_FILENAME).exists());
    }
}
