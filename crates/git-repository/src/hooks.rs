//! Git hook execution.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::Repository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookType {
    PreCommit,
    PrepareCommitMsg,
    CommitMsg,
    PostCommit,
    PreRebase,
    PostRewrite,
    PostCheckout,
    PostMerge,
    PrePush,
    PreAutoGc,
    ReferenceTransaction,
    PreReceive,
    Update,
    PostReceive,
}

impl HookType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PreCommit => "pre-commit",
            Self::PrepareCommitMsg => "prepare-commit-msg",
            Self::CommitMsg => "commit-msg",
            Self::PostCommit => "post-commit",
            Self::PreRebase => "pre-rebase",
            Self::PostRewrite => "post-rewrite",
            Self::PostCheckout => "post-checkout",
            Self::PostMerge => "post-merge",
            Self::PrePush => "pre-push",
            Self::PreAutoGc => "pre-auto-gc",
            Self::ReferenceTransaction => "reference-transaction",
            Self::PreReceive => "pre-receive",
            Self::Update => "update",
            Self::PostReceive => "post-receive",
        }
    }
}

/// Environment the hook executor sets per the pluggable hook contract:
/// `GIT_DIR`/`GIT_WORK_TREE`/`GIT_INDEX_FILE` locate the repository;
/// the rest describe the operation triggering the hook. Any field left
/// `None` is simply not set in the child's environment.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    pub git_dir: Option<PathBuf>,
    pub work_tree: Option<PathBuf>,
    pub index_file: Option<PathBuf>,
    pub branch: Option<String>,
    pub head: Option<String>,
    pub previous_head: Option<String>,
    pub commit: Option<String>,
    pub remote: Option<String>,
    pub remote_url: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
}

impl HookContext {
    fn apply(&self, cmd: &mut Command) {
        let mut set = |key: &str, value: &Option<String>| {
            if let Some(v) = value {
                cmd.env(key, v);
            }
        };
        if let Some(p) = &self.git_dir {
            cmd.env("GIT_DIR", p);
        }
        if let Some(p) = &self.work_tree {
            cmd.env("GIT_WORK_TREE", p);
        }
        if let Some(p) = &self.index_file {
            cmd.env("GIT_INDEX_FILE", p);
        }
        set("GIT_BRANCH", &self.branch);
        set("GIT_HEAD", &self.head);
        set("GIT_PREVIOUS_HEAD", &self.previous_head);
        set("GIT_COMMIT", &self.commit);
        set("GIT_REMOTE", &self.remote);
        set("GIT_REMOTE_URL", &self.remote_url);
        set("GIT_AUTHOR_NAME", &self.author_name);
        set("GIT_AUTHOR_EMAIL", &self.author_email);
    }
}

pub struct HookResult {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl HookResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

pub struct HookRunner {
    hooks_path: PathBuf,
}

impl HookRunner {
    /// Create a HookRunner from a repository.
    /// Resolves hooks path from core.hooksPath config or .git/hooks/.
    pub fn new(repo: &Repository) -> Self {
        let hooks_path = if let Ok(Some(path)) = repo.config().get_string("core.hooksPath") {
            PathBuf::from(path)
        } else {
            repo.git_dir().join("hooks")
        };
        Self { hooks_path }
    }

    /// Check if a hook script exists and is executable.
    pub fn hook_exists(&self, hook: HookType) -> bool {
        let path = self.hooks_path.join(hook.name());
        path.is_file()
    }

    /// Execute a hook. Returns error if hook exists but fails to execute.
    pub fn run(
        &self,
        hook: HookType,
        args: &[&str],
        stdin: Option<&[u8]>,
    ) -> Result<HookResult, std::io::Error> {
        self.run_with_env(hook, args, stdin, &HookContext::default())
    }

    /// Execute a hook with the env-var contract from §6 applied to the
    /// child process in addition to `args`/`stdin`.
    pub fn run_with_env(
        &self,
        hook: HookType,
        args: &[&str],
        stdin: Option<&[u8]>,
        ctx: &HookContext,
    ) -> Result<HookResult, std::io::Error> {
        let path = self.hooks_path.join(hook.name());
        if !path.is_file() {
            return Ok(HookResult {
                exit_code: 0,
                stdout: Vec::new(),
                stderr: Vec::new(),
            });
        }

        let mut cmd = Command::new(&path);
        cmd.args(args);
        ctx.apply(&mut cmd);

        if stdin.is_some() {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn()?;

        if let Some(input) = stdin {
            if let Some(ref mut child_stdin) = child.stdin {
                use std::io::Write;
                let _ = child_stdin.write_all(input);
            }
            drop(child.stdin.take());
        }

        let output = child.wait_with_output()?;

        Ok(HookResult {
            exit_code: output.status.code().unwrap_or(128),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    /// Execute hook if it exists, return success if it doesn't exist.
    pub fn run_or_ok(
        &self,
        hook: HookType,
        args: &[&str],
        stdin: Option<&[u8]>,
    ) -> Result<HookResult, std::io::Error> {
        self.run(hook, args, stdin)
    }
}

/// Adapts [`HookRunner`] to [`git_protocol::receive_pack::ReceivePackHooks`]
/// so `receive_pack` can drive pre-receive/update/post-receive without this
/// crate's `git-protocol` dependency ever needing to know about
/// `Repository` or the filesystem layout of hook scripts.
pub struct ReceivePackHookAdapter<'a> {
    runner: &'a HookRunner,
    ctx: HookContext,
}

impl<'a> ReceivePackHookAdapter<'a> {
    pub fn new(runner: &'a HookRunner, ctx: HookContext) -> Self {
        Self { runner, ctx }
    }
}

impl<'a> git_protocol::receive_pack::ReceivePackHooks for ReceivePackHookAdapter<'a> {
    fn pre_receive(&self, stdin: &[u8]) -> std::io::Result<i32> {
        Ok(self
            .runner
            .run_with_env(HookType::PreReceive, &[], Some(stdin), &self.ctx)?
            .exit_code)
    }

    fn update(&self, refname: &str, old: &git_hash::ObjectId, new: &git_hash::ObjectId) -> std::io::Result<i32> {
        let old = old.to_string();
        let new = new.to_string();
        Ok(self
            .runner
            .run_with_env(HookType::Update, &[refname, &old, &new], None, &self.ctx)?
            .exit_code)
    }

    fn post_receive(&self, stdin: &[u8]) -> std::io::Result<i32> {
        Ok(self
            .runner
            .run_with_env(HookType::PostReceive, &[], Some(stdin), &self.ctx)?
            .exit_code)
    }
}
