use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::account::AccountId;

/// Program every registered account starts with, and the fallback
///  wherever a request leaves the program out.
pub const DEFAULT_PROGRAM: &str = "cloud";

static PROGRAM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]+$").expect("valid program regex"));

// control characters and the characters no supported client filesystem accepts
static PATH_CHARS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[^\x00-\x1F\\:*?"'<>|]*$"#).expect("valid path character regex")
});

static NAME_CHARS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[^\x00-\x1F\\/:*?"'<>|]*$"#).expect("valid name character regex")
});

static RESERVED_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:CON|PRN|AUX|NUL|COM[1-9]|LPT[1-9])$").expect("valid reserved name regex")
});

/// Byte limits applied by the sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Longest absolute path the service will create, sandbox root included
    pub max_path_length: usize,
    /// Longest single entry name
    pub max_indir_length: usize,
    /// Longest program name
    pub max_program_length: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_path_length: 4096,
            max_indir_length: 255,
            max_program_length: 32,
        }
    }
}

/// Confines client-supplied paths to `<root>/<account>/<program>/`.
///
/// Every check is a pure predicate (save for the existence check in
///  [`PathSandbox::validate_directory`]); callers decide which reason
///  code a `false` turns into.
#[derive(Debug, Clone)]
pub struct PathSandbox {
    root: PathBuf,
    limits: SandboxLimits,
}

impl PathSandbox {
    pub fn new(root: impl Into<PathBuf>, limits: SandboxLimits) -> Self {
        Self {
            root: root.into(),
            limits,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    pub fn account_root(&self, account: &AccountId) -> PathBuf {
        self.root.join(account.as_str())
    }

    pub fn program_root(&self, account: &AccountId, program: &str) -> PathBuf {
        self.account_root(account).join(program)
    }

    /// Join a client fragment onto a program root.
    ///
    /// The join is lexical: root and `.` components are dropped and
    ///  `..` pops one level. The result still has to pass
    ///  [`PathSandbox::validate_path`] before it is touched.
    pub fn resolve(&self, account: &AccountId, program: &str, fragment: &str) -> PathBuf {
        join_lexical(&self.program_root(account, program), fragment)
    }

    pub fn validate_program_name(&self, name: &str) -> bool {
        name.len() <= self.limits.max_program_length && PROGRAM_REGEX.is_match(name)
    }

    /// A single directory entry name: no separators, no dot entries,
    ///  nothing from the disallowed set, not a reserved device name.
    pub fn validate_indir_name(&self, name: &str) -> bool {
        !name.is_empty()
            && name != "."
            && name != ".."
            && name.len() <= self.limits.max_indir_length
            && NAME_CHARS_REGEX.is_match(name)
            && !RESERVED_NAME_REGEX.is_match(name)
    }

    pub fn validate_path(&self, account: &AccountId, program: &str, path: &Path) -> bool {
        let budget = self
            .limits
            .max_path_length
            .saturating_sub(self.root_len());
        self.is_confined(account, program, path, budget)
    }

    /// Like [`PathSandbox::validate_path`], but the directory must exist and
    ///  leave room for one more entry name below it.
    pub fn validate_directory(&self, account: &AccountId, program: &str, dir: &Path) -> bool {
        let budget = self
            .limits
            .max_path_length
            .saturating_sub(self.limits.max_indir_length)
            .saturating_sub(self.root_len());
        self.is_confined(account, program, dir, budget) && dir.is_dir()
    }

    fn root_len(&self) -> usize {
        self.root.as_os_str().len()
    }

    fn is_confined(&self, account: &AccountId, program: &str, path: &Path, budget: usize) -> bool {
        if !self.validate_indir_name(account.as_str()) || !self.validate_program_name(program) {
            return false;
        }
        let Some(path) = path.to_str() else {
            return false;
        };
        let Some(root) = self.program_root(account, program).to_str().map(normalize) else {
            return false;
        };

        let normalized = normalize(path);
        let Some(below) = normalized.strip_prefix(&root) else {
            return false;
        };
        if below.split('/').any(|segment| segment == "." || segment == "..") {
            return false;
        }
        if !PATH_CHARS_REGEX.is_match(below) {
            return false;
        }
        let last = below.trim_end_matches('/').rsplit('/').next().unwrap_or("");
        if RESERVED_NAME_REGEX.is_match(last) {
            return false;
        }

        normalized.len() <= budget
    }
}

/// Join `fragment` onto `base` without touching the filesystem. Root and
///  `.` components are dropped and `..` pops one level, possibly above
///  `base`.
pub fn join_lexical(base: &Path, fragment: &str) -> PathBuf {
    let mut resolved = base.to_path_buf();
    for component in Path::new(fragment).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::ParentDir => {
                resolved.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    resolved
}

/// Collapse repeated separators and end the path with exactly one `/`.
pub fn normalize(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len() + 1);
    for c in path.chars() {
        if c == '/' && normalized.ends_with('/') {
            continue;
        }
        normalized.push(c);
    }
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

pub fn paths_match(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Whether `path` is `prefix` itself or lies below it, compared on
///  normalized forms.
pub fn is_under(path: &str, prefix: &str) -> bool {
    normalize(path).starts_with(&normalize(prefix))
}
