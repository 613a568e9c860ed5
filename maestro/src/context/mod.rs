//! Context assembler — the workspace-aware system-prompt prefix.
//!
//! Merges the workspace tree (depth-limited, ignore-filtered), project
//! hints from well-known manifests, the current git branch, editor state,
//! and the optional memory / retrieval / attachment blocks into one text
//! block appended to every specialist's system prompt. Memory, retrieval,
//! and attachment loading are external collaborators behind small traits.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ignore::WalkBuilder;
use tracing::debug;

use crate::error::Result;
use crate::usage::Usage;

/// Maximum tree depth rendered into the context block.
pub const TREE_DEPTH: usize = 3;

/// Maximum entries rendered from the workspace tree.
pub const TREE_ENTRY_LIMIT: usize = 200;

/// Token budget for the retrieval block.
pub const RETRIEVAL_TOKEN_BUDGET: u64 = 3_000;

/// Persistent conversation memory, summarized per goal.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Return the memory context relevant to a goal, if any.
    async fn recall(&self, goal: &str) -> Result<Option<String>>;
}

/// A retrieved chunk with its ranking score.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    /// Source path of the chunk.
    pub path: String,
    /// Chunk text.
    pub text: String,
    /// Ranking score (higher is better).
    pub score: f64,
}

/// Lexical retrieval over the indexed workspace.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Top-k chunks for a query.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>>;
}

/// A request attachment.
#[derive(Debug, Clone)]
pub enum Attachment {
    /// Plain text (diffs, selections, pasted snippets).
    Text {
        /// Display label.
        label: String,
        /// The attached text.
        content: String,
    },
    /// An image, passed separately to vision-capable models.
    Image {
        /// Display label.
        label: String,
        /// Base64-encoded payload.
        base64: String,
    },
}

/// Editor state worth showing the model.
#[derive(Debug, Clone, Default)]
pub struct EditorState {
    /// Paths of open editors.
    pub open_files: Vec<String>,
    /// The current selection, if any.
    pub selection: Option<String>,
}

/// Builds the workspace context block.
pub struct ContextAssembler {
    workspace_root: PathBuf,
    memory: Option<Box<dyn MemoryStore>>,
    retriever: Option<Box<dyn Retriever>>,
    editor: EditorState,
    retrieval_k: usize,
}

impl std::fmt::Debug for ContextAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextAssembler")
            .field("workspace_root", &self.workspace_root)
            .field("memory", &self.memory.is_some())
            .field("retriever", &self.retriever.is_some())
            .finish()
    }
}

impl ContextAssembler {
    /// Create an assembler for a workspace.
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            memory: None,
            retriever: None,
            editor: EditorState::default(),
            retrieval_k: 5,
        }
    }

    /// Attach a memory store.
    #[must_use]
    pub fn memory(mut self, memory: Box<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Attach a retriever.
    #[must_use]
    pub fn retriever(mut self, retriever: Box<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Set the editor state.
    #[must_use]
    pub fn editor(mut self, editor: EditorState) -> Self {
        self.editor = editor;
        self
    }

    /// Assemble the full context block for a goal.
    pub async fn assemble(&self, goal: &str, attachments: &[Attachment]) -> String {
        let mut block = String::new();

        let tree = workspace_tree(&self.workspace_root);
        if !tree.is_empty() {
            let _ = write!(block, "Workspace tree:\n{tree}");
        }

        let hints = project_hints(&self.workspace_root);
        if !hints.is_empty() {
            let _ = writeln!(block, "\nProject type: {}", hints.join(", "));
        }

        if let Some(branch) = git_branch(&self.workspace_root) {
            let _ = writeln!(block, "Git branch: {branch}");
        }

        if !self.editor.open_files.is_empty() {
            let _ = writeln!(block, "Open editors: {}", self.editor.open_files.join(", "));
        }
        if let Some(selection) = &self.editor.selection {
            let _ = writeln!(block, "Current selection:\n{selection}");
        }

        if let Some(memory) = &self.memory {
            match memory.recall(goal).await {
                Ok(Some(context)) if !context.is_empty() => {
                    let _ = writeln!(block, "\nRelevant memory:\n{context}");
                }
                Ok(_) => {}
                Err(err) => debug!(error = %err, "Memory recall failed"),
            }
        }

        if let Some(retriever) = &self.retriever {
            match retriever.retrieve(goal, self.retrieval_k).await {
                Ok(chunks) if !chunks.is_empty() => {
                    let _ = write!(block, "\nRelevant code:\n{}", retrieval_block(&chunks));
                }
                Ok(_) => {}
                Err(err) => debug!(error = %err, "Retrieval failed"),
            }
        }

        let texts: Vec<&Attachment> = attachments
            .iter()
            .filter(|a| matches!(a, Attachment::Text { .. }))
            .collect();
        if !texts.is_empty() {
            block.push_str("\nAttachments:\n");
            for attachment in texts {
                if let Attachment::Text { label, content } = attachment {
                    let _ = writeln!(block, "--- {label} ---\n{content}");
                }
            }
        }

        block
    }
}

/// Render the workspace tree, depth-limited and ignore-filtered.
#[must_use]
pub fn workspace_tree(root: &Path) -> String {
    let mut entries: Vec<(usize, String, bool)> = Vec::new();
    let walker = WalkBuilder::new(root)
        .max_depth(Some(TREE_DEPTH))
        .hidden(true)
        .git_ignore(true)
        .git_exclude(true)
        .build();

    for entry in walker.flatten() {
        if entry.depth() == 0 {
            continue;
        }
        let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
        entries.push((
            entry.depth(),
            entry.file_name().to_string_lossy().into_owned(),
            is_dir,
        ));
        if entries.len() >= TREE_ENTRY_LIMIT {
            break;
        }
    }

    let mut out = String::new();
    for (depth, name, is_dir) in entries {
        let indent = "  ".repeat(depth - 1);
        let suffix = if is_dir { "/" } else { "" };
        let _ = writeln!(out, "{indent}{name}{suffix}");
    }
    out
}

/// Project-type hints from well-known manifests.
#[must_use]
pub fn project_hints(root: &Path) -> Vec<String> {
    const MANIFESTS: [(&str, &str); 7] = [
        ("Cargo.toml", "Rust"),
        ("package.json", "Node.js"),
        ("pyproject.toml", "Python"),
        ("go.mod", "Go"),
        ("pom.xml", "Java (Maven)"),
        ("Gemfile", "Ruby"),
        ("Dockerfile", "Docker"),
    ];
    MANIFESTS
        .iter()
        .filter(|(file, _)| root.join(file).exists())
        .map(|(_, hint)| (*hint).to_owned())
        .collect()
}

/// Current git branch, read from `.git/HEAD` without shelling out.
#[must_use]
pub fn git_branch(root: &Path) -> Option<String> {
    let head = std::fs::read_to_string(root.join(".git/HEAD")).ok()?;
    let head = head.trim();
    head.strip_prefix("ref: refs/heads/")
        .map(str::to_owned)
        .or_else(|| (head.len() >= 7).then(|| format!("(detached {})", &head[..7])))
}

/// Render retrieved chunks within the token budget.
#[must_use]
pub fn retrieval_block(chunks: &[RetrievedChunk]) -> String {
    let mut out = String::new();
    let mut spent: u64 = 0;
    for chunk in chunks {
        let cost = Usage::estimate(&chunk.text);
        if spent + cost > RETRIEVAL_TOKEN_BUDGET {
            break;
        }
        spent += cost;
        let _ = writeln!(out, "--- {} (score {:.2}) ---\n{}", chunk.path, chunk.score, chunk.text);
    }
    out
}
