//! Compose project configuration types.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Prefix applied to every derived compose project name.
pub const PROJECT_PREFIX: &str = "carve";

/// A compose project: one build descriptor plus the namespace it runs under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeProject {
    /// Compose project name (`-p`). Namespaces networks, volumes and containers.
    pub name: String,
    /// Path to the compose descriptor
    pub compose_file: PathBuf,
    /// Directory commands run in (defaults to the descriptor's parent)
    pub working_dir: Option<PathBuf>,
}

impl ComposeProject {
    pub fn new(name: impl Into<String>, compose_file: impl Into<PathBuf>) -> Self {
        Self {
            name: sanitize_project_name(&name.into()),
            compose_file: compose_file.into(),
            working_dir: None,
        }
    }

    /// Create a project namespaced to a migration job.
    ///
    /// Two jobs on the same host never share a project name, so their
    /// networks and containers cannot collide.
    pub fn for_job(job_id: &str, compose_file: impl Into<PathBuf>) -> Self {
        Self::new(format!("{}-{}", PROJECT_PREFIX, job_id), compose_file)
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Directory compose commands execute in.
    pub fn effective_working_dir(&self) -> &Path {
        match &self.working_dir {
            Some(dir) => dir.as_path(),
            None => self
                .compose_file
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new(".")),
        }
    }

    /// Whether the compose descriptor exists on disk.
    pub fn descriptor_exists(&self) -> bool {
        self.compose_file.is_file()
    }
}

/// Normalize a string into a valid compose project name.
///
/// Compose only accepts lowercase alphanumerics, `-` and `_`, and the
/// name must start with a letter or digit.
pub fn sanitize_project_name(raw: &str) -> String {
    let mut name: String = raw
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();

    while name.starts_with(['-', '_']) {
        name.remove(0);
    }

    if name.is_empty() {
        PROJECT_PREFIX.to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_for_job_is_namespaced() {
        let a = ComposeProject::for_job("Job 42", "/tmp/a/docker-compose.yml");
        let b = ComposeProject::for_job("job-43", "/tmp/a/docker-compose.yml");

        assert_eq!(a.name, "carve-job-42");
        assert_eq!(b.name, "carve-job-43");
        assert_ne!(a.name, b.name);
    }

    #[test]
    fn test_sanitize_project_name() {
        assert_eq!(sanitize_project_name("My.App/v2"), "my-app-v2");
        assert_eq!(sanitize_project_name("__x"), "x");
        assert_eq!(sanitize_project_name("***"), "carve");
    }

    #[test]
    fn test_effective_working_dir() {
        let project = ComposeProject::new("p", "/srv/out/docker-compose.yml");
        assert_eq!(project.effective_working_dir(), Path::new("/srv/out"));

        let bare = ComposeProject::new("p", "docker-compose.yml");
        assert_eq!(bare.effective_working_dir(), Path::new("."));

        let explicit = ComposeProject::new("p", "docker-compose.yml").working_dir("/work");
        assert_eq!(explicit.effective_working_dir(), Path::new("/work"));
    }
}
