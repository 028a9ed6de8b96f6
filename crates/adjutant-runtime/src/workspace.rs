//! Workspace context: bootstrap docs and skills.
//!
//! Both are read once at startup and shared immutably; editing the
//! files takes effect on the next restart.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

/// Root-level markdown files folded into every system prompt, in this
/// order. `CLAUDE.md` is the legacy alias for `AGENTS.md`.
const BOOTSTRAP_FILES: &[&str] = &[
    "AGENTS.md",
    "CLAUDE.md",
    "SOUL.md",
    "USER.md",
    "TOOLS.md",
    "IDENTITY.md",
];

/// One user-supplied skill document.
#[derive(Debug, Clone)]
pub struct Skill {
    pub name: String,
    pub content: String,
}

/// Once-initialized workspace context.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceContext {
    pub workspace_dir: PathBuf,
    /// Concatenated bootstrap docs.
    pub bootstrap: String,
    pub skills: Vec<Skill>,
}

impl WorkspaceContext {
    /// Load bootstrap files and skills from the workspace.
    pub async fn load(workspace_dir: impl AsRef<Path>) -> Self {
        let workspace_dir = workspace_dir.as_ref().to_path_buf();

        let mut bootstrap = String::new();
        for name in BOOTSTRAP_FILES {
            if let Ok(content) = fs::read_to_string(workspace_dir.join(name)).await {
                if !bootstrap.is_empty() {
                    bootstrap.push_str("\n\n");
                }
                bootstrap.push_str(&format!("## {}\n\n{}", name, content.trim()));
            }
        }

        let skills = load_skills(&workspace_dir).await;
        info!(
            skills = skills.len(),
            bootstrap_chars = bootstrap.len(),
            "loaded workspace context"
        );

        Self {
            workspace_dir,
            bootstrap,
            skills,
        }
    }
}

/// Skills live at `skills/<name>.md` and `skills/<name>/SKILL.md`.
async fn load_skills(workspace_dir: &Path) -> Vec<Skill> {
    let skills_dir = workspace_dir.join("skills");
    let mut skills = Vec::new();

    let Ok(mut entries) = fs::read_dir(&skills_dir).await else {
        return skills;
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let file_type = match entry.file_type().await {
            Ok(t) => t,
            Err(_) => continue,
        };

        if file_type.is_file() && path.extension().is_some_and(|e| e == "md") {
            if let (Some(stem), Ok(content)) = (
                path.file_stem().and_then(|s| s.to_str()),
                fs::read_to_string(&path).await,
            ) {
                skills.push(Skill {
                    name: stem.to_string(),
                    content,
                });
            }
        } else if file_type.is_dir() {
            let nested = path.join("SKILL.md");
            if let Ok(content) = fs::read_to_string(&nested).await {
                if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                    skills.push(Skill {
                        name: name.to_string(),
                        content,
                    });
                }
            }
        }
    }

    skills.sort_by(|a, b| a.name.cmp(&b.name));
    debug!("loaded {} skills", skills.len());
    skills
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_bootstrap_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("SOUL.md"), "be kind").await.unwrap();
        fs::write(dir.path().join("AGENTS.md"), "you are adjutant")
            .await
            .unwrap();

        let ctx = WorkspaceContext::load(dir.path()).await;
        let agents_pos = ctx.bootstrap.find("you are adjutant").unwrap();
        let soul_pos = ctx.bootstrap.find("be kind").unwrap();
        assert!(agents_pos < soul_pos);
    }

    #[tokio::test]
    async fn loads_flat_and_nested_skills() {
        let dir = tempfile::tempdir().unwrap();
        let skills = dir.path().join("skills");
        fs::create_dir_all(skills.join("travel")).await.unwrap();
        fs::write(skills.join("cooking.md"), "how to cook").await.unwrap();
        fs::write(skills.join("travel").join("SKILL.md"), "how to travel")
            .await
            .unwrap();
        // Non-skill noise is ignored.
        fs::write(skills.join("README.txt"), "not a skill").await.unwrap();

        let ctx = WorkspaceContext::load(dir.path()).await;
        let names: Vec<&str> = ctx.skills.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["cooking", "travel"]);
    }

    #[tokio::test]
    async fn empty_workspace_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = WorkspaceContext::load(dir.path()).await;
        assert!(ctx.bootstrap.is_empty());
        assert!(ctx.skills.is_empty());
    }
}
