//! libgit2-backed repository.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{
    Commit, Delta, DiffFindOptions, ErrorCode, FetchOptions, IndexAddOption, Oid, PushOptions,
    RebaseOptions, RemoteCallbacks, Repository, RepositoryInitOptions, Signature, Sort,
    StatusOptions,
};

use super::{
    is_note_path, Author, CommitRef, DiffEntry, FileTimes, ForkedContent, GitRepository,
    PullKind, PullReport, PushOutcome, DEFAULT_BRANCH, DEFAULT_REMOTE,
};
use crate::sync::{SyncError, SyncResult};

/// A notes repository on disk.
pub struct Git2Repository {
    repo: Repository,
    workdir: PathBuf,
    remote: String,
    branch: String,
    author: Author,
}

impl std::fmt::Debug for Git2Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git2Repository")
            .field("workdir", &self.workdir)
            .field("remote", &self.remote)
            .field("branch", &self.branch)
            .finish_non_exhaustive()
    }
}

impl Git2Repository {
    /// Open an existing repository.
    ///
    /// # Errors
    ///
    /// Returns `NoRepository` if `path` is not a non-bare git repository.
    pub fn open(path: &Path, author: Author) -> SyncResult<Self> {
        let repo = Repository::open(path).map_err(|_| SyncError::NoRepository {
            path: path.to_path_buf(),
        })?;
        Self::from_repository(repo, path, author)
    }

    /// Create a new repository whose unborn `HEAD` points at the default branch.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be initialized.
    pub fn init(path: &Path, author: Author) -> SyncResult<Self> {
        std::fs::create_dir_all(path)?;
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(DEFAULT_BRANCH);
        let repo = Repository::init_opts(path, &opts)?;
        Self::from_repository(repo, path, author)
    }

    fn from_repository(repo: Repository, path: &Path, author: Author) -> SyncResult<Self> {
        let workdir = repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| SyncError::NoRepository {
                path: path.to_path_buf(),
            })?;
        Ok(Self {
            repo,
            workdir,
            remote: DEFAULT_REMOTE.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            author,
        })
    }

    /// Use a remote other than `origin`.
    #[must_use]
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Sync a branch other than `main`.
    ///
    /// An unborn `HEAD` is moved to the new branch so the first commit lands there.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        if matches!(self.head_object(), Ok(None))
            && let Err(e) = self.repo.set_head(&self.local_ref())
        {
            tracing::warn!(branch = %self.branch, error = %e, "could not move unborn HEAD");
        }
        self
    }

    #[must_use]
    pub fn branch(&self) -> &str {
        &self.branch
    }

    #[must_use]
    pub fn remote_name(&self) -> &str {
        &self.remote
    }

    /// URL of the configured remote, if any.
    #[must_use]
    pub fn remote_url(&self) -> Option<String> {
        self.repo
            .find_remote(&self.remote)
            .ok()
            .and_then(|remote| remote.url().map(str::to_string))
    }

    fn local_ref(&self) -> String {
        format!("refs/heads/{}", self.branch)
    }

    fn tracking_ref(&self) -> String {
        format!("refs/remotes/{}/{}", self.remote, self.branch)
    }

    fn head_object(&self) -> SyncResult<Option<Commit<'_>>> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?)),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn find_commit(&self, commit: &CommitRef) -> SyncResult<Commit<'_>> {
        let oid = Oid::from_str(commit.as_str())?;
        Ok(self.repo.find_commit(oid)?)
    }

    /// Fetch the remote's configured refspecs.
    ///
    /// Returns `false` when no remote is configured.
    fn fetch(&self) -> SyncResult<bool> {
        let Ok(mut remote) = self.repo.find_remote(&self.remote) else {
            return Ok(false);
        };

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(remote_callbacks(&self.repo));
        remote
            .fetch::<&str>(&[], Some(&mut fo), None)
            .map_err(|e| SyncError::Pull {
                message: e.message().to_string(),
            })?;
        Ok(true)
    }

    fn fast_forward(&self, target: Oid) -> SyncResult<()> {
        let local_ref = self.local_ref();
        match self.repo.find_reference(&local_ref) {
            Ok(mut reference) => {
                reference.set_target(target, "gitnotes: fast-forward")?;
            }
            Err(_) => {
                self.repo
                    .reference(&local_ref, target, true, "gitnotes: initial pull")?;
            }
        }
        self.repo.set_head(&local_ref)?;
        self.repo
            .checkout_head(Some(CheckoutBuilder::new().force()))?;
        Ok(())
    }

    /// Replay local commits on top of `upstream`.
    ///
    /// Conflicting paths take the upstream version; the local version of each
    /// is returned so it can be kept as a separate note.
    fn rebase_onto(&self, upstream: Oid) -> SyncResult<Vec<ForkedContent>> {
        let branch = self.repo.find_reference(&self.local_ref())?;
        let local = self.repo.reference_to_annotated_commit(&branch)?;
        let onto = self.repo.find_annotated_commit(upstream)?;
        let sig = Signature::now(&self.author.name, &self.author.email)?;

        let mut opts = RebaseOptions::new();
        let mut rebase = self
            .repo
            .rebase(Some(&local), Some(&onto), None, Some(&mut opts))?;

        let mut forks = Vec::new();
        while let Some(op) = rebase.next() {
            let op = match op {
                Ok(op) => op,
                Err(e) => {
                    rebase.abort().ok();
                    return Err(e.into());
                }
            };

            let mut index = self.repo.index()?;
            if index.has_conflicts() {
                match self.resolve_conflicts(&mut index) {
                    Ok(resolved) => forks.extend(resolved),
                    Err(e) => {
                        rebase.abort().ok();
                        return Err(e);
                    }
                }
            }

            match rebase.commit(None, &sig, None) {
                Ok(_) => {}
                Err(e) if e.code() == ErrorCode::Applied => {
                    tracing::debug!(commit = %op.id(), "local commit already upstream, skipping");
                }
                Err(e) => {
                    rebase.abort().ok();
                    return Err(e.into());
                }
            }
        }
        rebase.finish(Some(&sig))?;
        Ok(forks)
    }

    fn resolve_conflicts(&self, index: &mut git2::Index) -> SyncResult<Vec<ForkedContent>> {
        let conflicts = index
            .conflicts()?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut forks = Vec::new();
        for conflict in conflicts {
            // During a rebase "ours" is the upstream side, "theirs" the replayed local commit.
            let (keep, displaced) = match (conflict.our, conflict.their) {
                (Some(ours), theirs) => (ours, theirs),
                (None, Some(theirs)) => (theirs, None),
                (None, None) => continue,
            };

            let path = String::from_utf8_lossy(&keep.path).into_owned();
            if let Some(local) = displaced {
                let blob = self.repo.find_blob(local.id)?;
                tracing::info!(path = %path, "conflicting local edit, keeping remote version");
                forks.push(ForkedContent {
                    path: path.clone(),
                    content: String::from_utf8_lossy(blob.content()).into_owned(),
                });
            }

            let kept = self.repo.find_blob(keep.id)?;
            let target = self.workdir.join(&path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, kept.content())?;
            index.add_path(Path::new(&path))?;
        }

        index.write()?;
        Ok(forks)
    }

    fn try_push(&self, force: bool) -> SyncResult<PushOutcome> {
        let Ok(mut remote) = self.repo.find_remote(&self.remote) else {
            return Ok(PushOutcome::NoRemote);
        };
        if self.head_object()?.is_none() {
            return Ok(PushOutcome::NothingToPush);
        }

        let prefix = if force { "+" } else { "" };
        let refspec = format!("{prefix}{0}:{0}", self.local_ref());

        let push_error: RefCell<Option<String>> = RefCell::new(None);
        {
            let mut callbacks = remote_callbacks(&self.repo);
            callbacks.push_update_reference(|_ref_name, status| {
                if let Some(msg) = status {
                    *push_error.borrow_mut() = Some(msg.to_string());
                }
                Ok(())
            });

            let mut push_options = PushOptions::new();
            push_options.remote_callbacks(callbacks);

            if let Err(e) = remote.push(&[refspec.as_str()], Some(&mut push_options)) {
                return Ok(PushOutcome::Failed {
                    reason: e.message().to_string(),
                });
            }
        }

        if let Some(reason) = push_error.into_inner() {
            return Ok(PushOutcome::Failed { reason });
        }
        Ok(PushOutcome::Pushed)
    }
}

impl GitRepository for Git2Repository {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn pull(&mut self, rebase: bool) -> SyncResult<PullReport> {
        if !self.fetch()? {
            return Ok(PullReport::new(PullKind::NoRemote));
        }

        let Ok(remote_oid) = self.repo.refname_to_id(&self.tracking_ref()) else {
            return Ok(PullReport::new(PullKind::RemoteEmpty));
        };

        let Ok(local_oid) = self.repo.refname_to_id(&self.local_ref()) else {
            self.fast_forward(remote_oid)?;
            return Ok(PullReport::new(PullKind::Initialized));
        };

        if local_oid == remote_oid || self.repo.graph_descendant_of(local_oid, remote_oid)? {
            return Ok(PullReport::new(PullKind::UpToDate));
        }

        if self.repo.graph_descendant_of(remote_oid, local_oid)? {
            self.fast_forward(remote_oid)?;
            return Ok(PullReport::new(PullKind::FastForward));
        }

        if !rebase {
            return Err(SyncError::Diverged {
                branch: self.branch.clone(),
            });
        }

        let forks = self.rebase_onto(remote_oid)?;
        Ok(PullReport {
            kind: PullKind::Rebased,
            forks,
        })
    }

    fn push(&mut self, force: bool) -> PushOutcome {
        match self.try_push(force) {
            Ok(outcome) => outcome,
            Err(e) => PushOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }

    fn add_all(&mut self) -> SyncResult<()> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        Ok(())
    }

    fn has_changes(&self) -> SyncResult<bool> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        Ok(!statuses.is_empty())
    }

    fn commit(
        &mut self,
        message: &str,
        timestamp: i64,
        allow_empty: bool,
    ) -> SyncResult<Option<CommitRef>> {
        let mut index = self.repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let parent = self.head_object()?;

        let unchanged = match &parent {
            Some(parent) => parent.tree_id() == tree_id,
            None => tree.is_empty(),
        };
        if unchanged && !allow_empty {
            return Ok(None);
        }

        let when = git2::Time::new(timestamp, 0);
        let sig = Signature::new(&self.author.name, &self.author.email, &when)?;
        let parents: Vec<&Commit<'_>> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;

        tracing::debug!(commit = %oid, timestamp, "committed");
        Ok(Some(CommitRef::from(oid)))
    }

    fn head_commit(&self) -> SyncResult<Option<CommitRef>> {
        Ok(self.head_object()?.map(|commit| CommitRef::from(commit.id())))
    }

    fn contains_commit(&self, commit: &CommitRef) -> bool {
        self.find_commit(commit).is_ok()
    }

    fn commit_time(&self, commit: &CommitRef) -> SyncResult<i64> {
        Ok(self.find_commit(commit)?.author().when().seconds())
    }

    fn diff_between(
        &self,
        from: Option<&CommitRef>,
        to: &CommitRef,
    ) -> SyncResult<Vec<DiffEntry>> {
        let to_tree = self.find_commit(to)?.tree()?;
        let from_tree = match from {
            Some(commit) => Some(self.find_commit(commit)?.tree()?),
            None => None,
        };

        let mut diff = self
            .repo
            .diff_tree_to_tree(from_tree.as_ref(), Some(&to_tree), None)?;
        let mut find = DiffFindOptions::new();
        find.renames(true);
        diff.find_similar(Some(&mut find))?;

        let mut entries = Vec::new();
        for delta in diff.deltas() {
            let old = delta.old_file().path().map(path_key);
            let new = delta.new_file().path().map(path_key);
            let entry = match (delta.status(), old, new) {
                (Delta::Added | Delta::Copied, _, Some(path)) => DiffEntry::Add(path),
                (Delta::Modified | Delta::Typechange, _, Some(path)) => DiffEntry::Modify(path),
                (Delta::Deleted, Some(path), _) => DiffEntry::Delete(path),
                (Delta::Renamed, Some(from), Some(to)) => {
                    match (is_note_path(&from), is_note_path(&to)) {
                        (true, true) => DiffEntry::Rename { from, to },
                        (false, true) => DiffEntry::Add(to),
                        (true, false) => DiffEntry::Delete(from),
                        (false, false) => continue,
                    }
                }
                _ => continue,
            };
            let keep = match &entry {
                DiffEntry::Add(p) | DiffEntry::Modify(p) | DiffEntry::Delete(p) => is_note_path(p),
                DiffEntry::Rename { .. } => true,
            };
            if keep {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    fn file_times(&self, to: &CommitRef) -> SyncResult<HashMap<String, FileTimes>> {
        let mut walk = self.repo.revwalk()?;
        walk.push(Oid::from_str(to.as_str())?)?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;

        let mut times: HashMap<String, FileTimes> = HashMap::new();
        for oid in walk {
            let commit = self.repo.find_commit(oid?)?;
            let tree = commit.tree()?;
            let parent_tree = match commit.parent(0) {
                Ok(parent) => Some(parent.tree()?),
                Err(_) => None,
            };
            let when = commit.author().when().seconds();

            let diff = self
                .repo
                .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;
            for delta in diff.deltas() {
                if !matches!(delta.status(), Delta::Added | Delta::Modified) {
                    continue;
                }
                let Some(path) = delta.new_file().path().map(path_key) else {
                    continue;
                };
                if !is_note_path(&path) {
                    continue;
                }
                times
                    .entry(path)
                    .and_modify(|t| t.last_touched = when)
                    .or_insert(FileTimes {
                        first_added: when,
                        last_touched: when,
                    });
            }
        }
        Ok(times)
    }

    fn add_remote(&mut self, name: &str, url: &str) -> SyncResult<()> {
        if self.repo.find_remote(name).is_ok() {
            self.repo.remote_set_url(name, url)?;
        } else {
            self.repo.remote(name, url)?;
        }
        self.remote = name.to_string();
        Ok(())
    }
}

/// Credentials: SSH agent first, then the configured credential helper.
fn remote_callbacks<'a>(repo: &Repository) -> RemoteCallbacks<'a> {
    let cfg = repo.config().ok();
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |url, username_from_url, allowed| {
        if allowed.is_ssh_key()
            && let Some(user) = username_from_url
        {
            return git2::Cred::ssh_key_from_agent(user);
        }
        if allowed.is_user_pass_plaintext()
            && let Some(ref cfg) = cfg
            && let Ok(cred) = git2::Cred::credential_helper(cfg, url, username_from_url)
        {
            return Ok(cred);
        }
        git2::Cred::default()
    });
    callbacks
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(repo: &Git2Repository, rel: &str, content: &str) {
        let path = repo.workdir().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn commit_file(repo: &mut Git2Repository, rel: &str, content: &str, ts: i64) -> CommitRef {
        write(repo, rel, content);
        repo.add_all().unwrap();
        repo.commit("test", ts, false).unwrap().unwrap()
    }

    fn clone_of(remote: &Path, dir: &Path) -> Git2Repository {
        let mut repo = Git2Repository::init(dir, Author::default()).unwrap();
        repo.add_remote("origin", remote.to_str().unwrap()).unwrap();
        repo
    }

    #[test]
    fn test_commit_skips_unchanged_tree() {
        let temp = TempDir::new().unwrap();
        let mut repo = Git2Repository::init(temp.path(), Author::default()).unwrap();

        assert!(repo.head_commit().unwrap().is_none());
        assert!(repo.commit("empty", 100, false).unwrap().is_none());

        let first = commit_file(&mut repo, "a.md", "# a", 100);
        assert_eq!(repo.commit_time(&first).unwrap(), 100);
        assert!(repo.commit("again", 200, false).unwrap().is_none());

        let forced = repo.commit("forced", 200, true).unwrap();
        assert!(forced.is_some());
    }

    #[test]
    fn test_diff_classifies_changes() {
        let temp = TempDir::new().unwrap();
        let mut repo = Git2Repository::init(temp.path(), Author::default()).unwrap();

        let first = commit_file(&mut repo, "a.md", "# a\nbody", 100);
        write(&repo, "b.md", "# b");
        write(&repo, "a.md", "# a\nchanged body");
        write(&repo, "notes.txt", "ignored");
        repo.add_all().unwrap();
        let second = repo.commit("second", 200, false).unwrap().unwrap();

        let from_empty = repo.diff_between(None, &first).unwrap();
        assert_eq!(from_empty, vec![DiffEntry::Add("a.md".into())]);

        let mut entries = repo.diff_between(Some(&first), &second).unwrap();
        entries.sort_by_key(|e| format!("{e:?}"));
        assert_eq!(
            entries,
            vec![
                DiffEntry::Add("b.md".into()),
                DiffEntry::Modify("a.md".into()),
            ]
        );
    }

    #[test]
    fn test_file_times_tracks_first_and_last_commit() {
        let temp = TempDir::new().unwrap();
        let mut repo = Git2Repository::init(temp.path(), Author::default()).unwrap();

        commit_file(&mut repo, "a.md", "# a", 100);
        commit_file(&mut repo, "b.md", "# b", 200);
        let head = commit_file(&mut repo, "a.md", "# a\nmore", 300);

        let times = repo.file_times(&head).unwrap();
        assert_eq!(
            times["a.md"],
            FileTimes {
                first_added: 100,
                last_touched: 300
            }
        );
        assert_eq!(times["b.md"].first_added, 200);
    }

    #[test]
    fn test_pull_without_remote() {
        let temp = TempDir::new().unwrap();
        let mut repo = Git2Repository::init(temp.path(), Author::default()).unwrap();
        assert_eq!(repo.pull(true).unwrap().kind, PullKind::NoRemote);
        assert_eq!(repo.push(false), PushOutcome::NoRemote);
    }

    #[test]
    fn test_push_then_pull_into_fresh_clone() {
        let temp = TempDir::new().unwrap();
        let remote = temp.path().join("remote.git");
        Repository::init_bare(&remote).unwrap();

        let mut first = clone_of(&remote, &temp.path().join("one"));
        assert_eq!(first.pull(true).unwrap().kind, PullKind::RemoteEmpty);
        let head = commit_file(&mut first, "a.md", "# a", 100);
        assert_eq!(first.push(false), PushOutcome::Pushed);

        let mut second = clone_of(&remote, &temp.path().join("two"));
        assert_eq!(second.pull(true).unwrap().kind, PullKind::Initialized);
        assert_eq!(second.head_commit().unwrap(), Some(head));
        assert_eq!(
            std::fs::read_to_string(second.workdir().join("a.md")).unwrap(),
            "# a"
        );
    }

    #[test]
    fn test_diverged_pull_rebases_and_forks_conflicts() {
        let temp = TempDir::new().unwrap();
        let remote = temp.path().join("remote.git");
        Repository::init_bare(&remote).unwrap();

        let mut first = clone_of(&remote, &temp.path().join("one"));
        commit_file(&mut first, "shared.md", "# shared", 100);
        first.push(false);

        let mut second = clone_of(&remote, &temp.path().join("two"));
        second.pull(true).unwrap();

        commit_file(&mut first, "shared.md", "# shared\nremote edit", 200);
        assert_eq!(first.push(false), PushOutcome::Pushed);

        commit_file(&mut second, "shared.md", "# shared\nlocal edit", 300);
        commit_file(&mut second, "own.md", "# own", 400);
        let rejected = second.push(false);
        assert!(matches!(rejected, PushOutcome::Failed { .. }));

        let report = second.pull(true).unwrap();
        assert_eq!(report.kind, PullKind::Rebased);
        assert_eq!(
            report.forks,
            vec![ForkedContent {
                path: "shared.md".into(),
                content: "# shared\nlocal edit".into(),
            }]
        );
        assert_eq!(
            std::fs::read_to_string(second.workdir().join("shared.md")).unwrap(),
            "# shared\nremote edit"
        );
        assert!(second.workdir().join("own.md").exists());
        assert!(!second.has_changes().unwrap());
        assert_eq!(second.push(false), PushOutcome::Pushed);
    }

    #[test]
    fn test_diverged_pull_without_rebase_fails() {
        let temp = TempDir::new().unwrap();
        let remote = temp.path().join("remote.git");
        Repository::init_bare(&remote).unwrap();

        let mut first = clone_of(&remote, &temp.path().join("one"));
        commit_file(&mut first, "a.md", "# a", 100);
        first.push(false);
        let mut second = clone_of(&remote, &temp.path().join("two"));
        second.pull(true).unwrap();

        commit_file(&mut first, "b.md", "# b", 200);
        first.push(false);
        commit_file(&mut second, "c.md", "# c", 300);

        assert!(matches!(
            second.pull(false),
            Err(SyncError::Diverged { .. })
        ));
    }
}
