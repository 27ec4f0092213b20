use std::path::PathBuf;

/// Errors from repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("not a git repository (or any of the parent directories): {0}")]
    NotFound(PathBuf),

    #[error("invalid git directory: {path}: {reason}")]
    InvalidGitDir { path: PathBuf, reason: String },

    #[error("{what} already exists: {name}")]
    AlreadyExists { what: &'static str, name: String },

    #[error("bare repository has no working tree")]
    BareNoWorkTree,

    #[error("unable to read HEAD: {0}")]
    InvalidHead(String),

    #[error("{what} is not set; who are you? (set user.name and user.email)")]
    MissingName { what: &'static str },

    #[error("nothing to commit")]
    NothingToCommit,

    #[error("you do not have the initial commit yet")]
    NothingToStash,

    #[error("stash is empty")]
    StashEmpty,

    #[error(transparent)]
    Config(#[from] git_config::ConfigError),

    #[error(transparent)]
    Odb(#[from] git_odb::OdbError),

    #[error(transparent)]
    Pack(#[from] git_pack::PackError),

    #[error(transparent)]
    Ref(#[from] git_ref::RefError),

    #[error(transparent)]
    Index(#[from] git_index::IndexError),

    #[error(transparent)]
    Object(#[from] git_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] git_hash::HashError),

    #[error(transparent)]
    State(#[from] git_state::StateError),

    #[error(transparent)]
    Revparse(#[from] git_revparse::RevParseError),

    #[error(transparent)]
    Worktree(#[from] git_worktree_sync::WorktreeError),

    #[error(transparent)]
    Protocol(#[from] git_protocol::ProtocolError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
