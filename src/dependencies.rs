// SPDX-License-Identifier: GPL-3.0-only

//! Presence checks for the external programs the pipeline is built from

use crate::errors::{AppError, AppResult};
use std::ffi::OsStr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Resolve `program` against a PATH-style list of directories
///
/// Names containing a slash are checked as given.
pub fn find_program_in(program: &str, search_path: &OsStr) -> Option<PathBuf> {
    if program.contains('/') {
        let path = PathBuf::from(program);
        return is_executable(&path).then_some(path);
    }
    std::env::split_paths(search_path)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

/// Resolve `program` against `$PATH`
pub fn find_program(program: &str) -> Option<PathBuf> {
    let search_path = std::env::var_os("PATH").unwrap_or_default();
    find_program_in(program, &search_path)
}

/// Fail with `DependencyMissing` on the first program not found
pub fn check_dependencies<'a>(programs: impl IntoIterator<Item = &'a str>) -> AppResult<()> {
    for program in programs {
        match find_program(program) {
            Some(path) => debug!(program, path = %path.display(), "Found dependency"),
            None => return Err(AppError::DependencyMissing(program.to_string())),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    #[test]
    fn finds_sh_on_a_standard_path() {
        let path = OsString::from("/nonexistent:/usr/bin:/bin");
        let found = find_program_in("sh", &path).expect("sh should be installed");
        assert!(found.ends_with("sh"));
    }

    #[test]
    fn empty_path_finds_nothing() {
        assert!(find_program_in("sh", OsStr::new("")).is_none());
    }

    #[test]
    fn absolute_names_skip_the_search() {
        assert!(find_program_in("/bin/sh", OsStr::new("")).is_some());
        assert!(find_program_in("/nonexistent/ffmpeg", OsStr::new("/bin")).is_none());
    }

    #[test]
    fn directories_are_not_programs() {
        assert!(find_program_in("bin", OsStr::new("/")).is_none());
    }

    #[test]
    fn first_missing_program_is_reported() {
        let err = check_dependencies(["sh", "definitely-not-installed-tool"]).unwrap_err();
        assert!(matches!(err, AppError::DependencyMissing(name) if name == "definitely-not-installed-tool"));
    }
}
