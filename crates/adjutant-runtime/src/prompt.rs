//! System-prompt assembly.

use chrono::Utc;

use crate::workspace::WorkspaceContext;

/// Everything that varies per turn.
#[derive(Debug, Clone, Default)]
pub struct PromptInputs {
    /// Current long-term facts (MEMORY.md), if any.
    pub memory: Option<String>,
    /// Channel context line, e.g. "group chat 'family'".
    pub channel_context: Option<String>,
    pub is_group: bool,
    /// Note describing the active sandbox, if commands run somewhere
    /// unusual.
    pub sandbox_note: Option<String>,
    /// Extra suffix appended last (subagent mode).
    pub extra: Option<String>,
}

/// Assemble the system prompt from the workspace context and the
/// per-turn inputs.
pub fn build_system_prompt(workspace: &WorkspaceContext, inputs: &PromptInputs) -> String {
    let mut sections: Vec<String> = Vec::new();

    sections.push(
        "You are Adjutant, a personal assistant reachable over chat. You have tools for \
         files, shell, web, memory, scheduling and subagents; use them rather than \
         guessing."
            .to_string(),
    );

    if !workspace.bootstrap.is_empty() {
        sections.push(workspace.bootstrap.clone());
    }

    sections.push(format!(
        "# Workspace\n\nYour workspace directory is `{}`. Long-term memory docs live in \
         `memory/`, skills in `skills/`.",
        workspace.workspace_dir.display()
    ));

    if let Some(memory) = &inputs.memory {
        if !memory.trim().is_empty() {
            sections.push(format!("# Long-term memory\n\n{}", memory.trim()));
        }
    }

    if !workspace.skills.is_empty() {
        let mut section = String::from("# Skills\n");
        for skill in &workspace.skills {
            section.push_str(&format!("\n## {}\n\n{}\n", skill.name, skill.content.trim()));
        }
        sections.push(section);
    }

    sections.push(format!(
        "# Runtime\n\nos: {}\ntime (UTC): {}\ncwd: {}",
        std::env::consts::OS,
        Utc::now().format("%Y-%m-%d %H:%M"),
        std::env::current_dir()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|_| "?".to_string()),
    ));

    if let Some(note) = &inputs.sandbox_note {
        sections.push(format!("# Sandbox\n\n{}", note));
    }

    sections.push(
        "# Subagents\n\nFor long or parallelizable work, spawn a subagent instead of \
         blocking this conversation; its result is announced back here when it finishes. \
         Subagent results arrive as messages from 'system'."
            .to_string(),
    );

    if let Some(channel) = &inputs.channel_context {
        let mut section = format!("# Conversation\n\n{}", channel);
        if inputs.is_group {
            section.push_str(
                "\nThis is a group conversation; reply only when addressed or useful, \
                 otherwise respond with exactly NO_REPLY.",
            );
        }
        sections.push(section);
    }

    if let Some(extra) = &inputs.extra {
        sections.push(extra.clone());
    }

    sections.join("\n\n---\n\n")
}

/// Extra system-prompt suffix for subagent runs.
pub fn subagent_suffix(depth: u32, max_depth: u32) -> String {
    let mut suffix = String::from(
        "# Subagent mode\n\nYou are a subagent working one task for a parent session. \
         Produce the task result as your final message: no greetings, no questions back \
         to the user, and never schedule jobs or send messages on other channels.",
    );
    if depth < max_depth {
        suffix.push_str("\nYou may spawn further subagents if the task genuinely splits.");
    } else {
        suffix.push_str("\nYou are at the maximum nesting depth: do not spawn subagents.");
    }
    suffix
}
