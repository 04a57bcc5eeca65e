//! Build recipes: per-language Dockerfile templates and their rendering.
//! Rendering is pure so it stays unit-testable without invoking a build.

use std::path::Path;

use serde::Deserialize;

use crate::error::Error;
use crate::types::Language;

/// Substitution point for the entry-point path in interpreted-language
/// templates.
pub const HANDLER_PLACEHOLDER: &str = "{{handler}}";

/// Language-keyed Dockerfile template, loaded from
/// `<template_dir>/<language>.toml`.
#[derive(Debug, Clone)]
pub struct BuildRecipe {
    language: Language,
    dockerfile: String,
}

#[derive(Debug, Deserialize)]
struct RecipeFile {
    dockerfile: String,
}

impl BuildRecipe {
    /// Load and validate the template for a language. Interpreted
    /// languages must carry exactly one substitution point; compiled
    /// languages none (their recipe builds in its own stage and copies
    /// only the artifact out).
    pub fn load(template_dir: &Path, language: Language) -> Result<Self, Error> {
        let path = template_dir.join(format!("{}.toml", language));
        let data = std::fs::read_to_string(&path)
            .map_err(|e| Error::Template(format!("failed to read {}: {}", path.display(), e)))?;
        let file: RecipeFile = toml::from_str(&data)
            .map_err(|e| Error::Template(format!("failed to parse {}: {}", path.display(), e)))?;

        let placeholders = file.dockerfile.matches(HANDLER_PLACEHOLDER).count();
        if language.is_interpreted() && placeholders != 1 {
            return Err(Error::Template(format!(
                "template for {} must contain exactly one {} substitution, found {}",
                language, HANDLER_PLACEHOLDER, placeholders
            )));
        }
        if !language.is_interpreted() && placeholders != 0 {
            return Err(Error::Template(format!(
                "template for compiled language {} must not contain {}",
                language, HANDLER_PLACEHOLDER
            )));
        }

        Ok(Self {
            language,
            dockerfile: file.dockerfile,
        })
    }

    /// Render the Dockerfile for the given entry point.
    pub fn render(&self, handler: &str) -> String {
        if self.language.is_interpreted() {
            self.dockerfile.replace(HANDLER_PLACEHOLDER, handler)
        } else {
            self.dockerfile.clone()
        }
    }
}
