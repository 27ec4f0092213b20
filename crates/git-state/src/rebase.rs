//! Rebase sequencer: the `rebase-merge/` directory and its todo list.

use std::path::{Path, PathBuf};

use git_hash::ObjectId;

use crate::StateError;

/// One line of `git-rebase-todo`: `<action> <oid> <subject>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebaseTodoLine {
    pub action: String,
    pub oid: ObjectId,
    pub subject: String,
}

impl RebaseTodoLine {
    pub fn new(action: impl Into<String>, oid: ObjectId, subject: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            oid,
            subject: subject.into(),
        }
    }

    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let mut parts = line.splitn(3, ' ');
        let action = parts.next()?.to_string();
        let oid = ObjectId::from_hex(parts.next()?).ok()?;
        let subject = parts.next().unwrap_or_default().to_string();
        Some(Self {
            action,
            oid,
            subject,
        })
    }

    fn render(&self) -> String {
        format!("{} {} {}", self.action, self.oid, self.subject)
    }
}

/// Handle onto the `rebase-merge/` sequencer directory.
pub struct RebaseSequencer {
    dir: PathBuf,
}

impl RebaseSequencer {
    /// Path to the sequencer directory under a gitdir.
    fn dir_for(git_dir: &Path) -> PathBuf {
        git_dir.join("rebase-merge")
    }

    /// Open the sequencer directory without requiring it to exist yet.
    pub fn at(git_dir: &Path) -> Self {
        Self {
            dir: Self::dir_for(git_dir),
        }
    }

    /// Start a new rebase: creates the sequencer directory and writes
    /// `head-name`, `onto`, and the initial todo list.
    pub fn start(
        git_dir: &Path,
        head_name: &str,
        onto: &ObjectId,
        todo: &[RebaseTodoLine],
    ) -> Result<Self, StateError> {
        let seq = Self::at(git_dir);
        std::fs::create_dir_all(&seq.dir)?;
        std::fs::write(seq.dir.join("head-name"), format!("{}\n", head_name))?;
        std::fs::write(seq.dir.join("onto"), format!("{}\n", onto))?;
        seq.write_todo(todo)?;
        Ok(seq)
    }

    /// Whether a rebase is currently in progress.
    pub fn in_progress(&self) -> bool {
        self.dir.is_dir()
    }

    /// The original branch name/ref that rebase will restore HEAD to.
    pub fn head_name(&self) -> Result<Option<String>, StateError> {
        self.read_line("head-name")
    }

    /// The commit rebase is replaying onto.
    pub fn onto(&self) -> Result<Option<ObjectId>, StateError> {
        match self.read_line("onto")? {
            Some(s) => ObjectId::from_hex(s.trim())
                .map(Some)
                .map_err(|_| StateError::InvalidOid { file: "onto" }),
            None => Ok(None),
        }
    }

    /// Read the remaining todo list.
    pub fn todo(&self) -> Result<Vec<RebaseTodoLine>, StateError> {
        let content = match std::fs::read_to_string(self.dir.join("git-rebase-todo")) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(content.lines().filter_map(RebaseTodoLine::parse).collect())
    }

    /// Overwrite the todo list (used after popping the front entry).
    pub fn write_todo(&self, todo: &[RebaseTodoLine]) -> Result<(), StateError> {
        let mut content = String::new();
        for line in todo {
            content.push_str(&line.render());
            content.push('\n');
        }
        std::fs::write(self.dir.join("git-rebase-todo"), content)?;
        Ok(())
    }

    /// Pop and return the next todo entry, rewriting the remaining list.
    pub fn pop_next(&self) -> Result<Option<RebaseTodoLine>, StateError> {
        let mut todo = self.todo()?;
        if todo.is_empty() {
            return Ok(None);
        }
        let next = todo.remove(0);
        self.write_todo(&todo)?;
        Ok(Some(next))
    }

    /// End the rebase: remove the whole sequencer directory.
    pub fn finish(&self) -> Result<(), StateError> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn read_line(&self, name: &str) -> Result<Option<String>, StateError> {
        match std::fs::read_to_string(self.dir.join(name)) {
            Ok(c) => Ok(Some(c.trim_end().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
