use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Languages the platform can containerize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Golang,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Golang => "golang",
        }
    }

    /// Interpreted languages get the entry point substituted into their
    /// build recipe; compiled languages build inside the recipe itself.
    pub fn is_interpreted(&self) -> bool {
        matches!(self, Language::Python)
    }

    /// Map a source file to its language by extension.
    pub fn from_extension(path: &Path) -> Option<Language> {
        match path.extension()?.to_str()? {
            "py" => Some(Language::Python),
            "go" => Some(Language::Golang),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "python" => Ok(Language::Python),
            "golang" => Ok(Language::Golang),
            _ => Err(Error::UnsupportedLanguage(s.to_string())),
        }
    }
}

/// Registry record linking a function id to its image and language.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionMetadata {
    pub function_id: String,
    pub image_id: String,
    pub language: Language,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_executed: Option<i64>,
    pub name: String,
}

/// Entry point resolved for a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerDescriptor {
    /// Path of the handler file, relative to the extracted archive root.
    pub handler: String,
    pub language: Language,
}

/// Optional manifest recognized at the root of an uploaded archive.
#[derive(Debug, Deserialize)]
pub struct HandlerManifest {
    pub handler: String,
    pub language: String,
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
