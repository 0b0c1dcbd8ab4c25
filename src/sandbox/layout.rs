use crate::error::Result;
use crate::types::{
    BUILD_USER, BUILD_USER_GECOS, BUILD_USER_HOME, BUILD_USER_ID,
    BUILD_USER_SHELL,
};
use crate::util::mkdir_owned;
use log::debug;
use nix::unistd::{Gid, Uid};
use std::io::Write;
use std::path::Path;

/// Directories the package manager expects inside the root.
const EOPKG_DIRS: [&str; 4] = [
    "var/cache/eopkg/packages",
    "var/cache/eopkg/archives",
    "var/lib/eopkg",
    "run/dbus",
];

pub fn ensure_eopkg_layout(root: &Path) -> Result<()> {
    for dir in EOPKG_DIRS {
        std::fs::create_dir_all(root.join(dir))?;
    }
    Ok(())
}

/// Append `line` to `file` unless an entry for `name` already exists.
fn ensure_entry(file: &Path, name: &str, line: &str) -> Result<()> {
    let existing = match std::fs::read_to_string(file) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    let prefix = format!("{}:", name);
    if existing.lines().any(|l| l.starts_with(&prefix)) {
        return Ok(());
    }

    let mut out = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(file)?;
    if !existing.is_empty() && !existing.ends_with('\n') {
        writeln!(out)?;
    }
    writeln!(out, "{}", line)?;
    debug!("Added {} to {}", name, file.display());
    Ok(())
}

/// Add the unprivileged build user to the root and give it a home.
pub fn ensure_build_user(root: &Path) -> Result<()> {
    let etc = root.join("etc");
    std::fs::create_dir_all(&etc)?;

    ensure_entry(
        &etc.join("passwd"),
        BUILD_USER,
        &format!(
            "{user}:x:{id}:{id}:{gecos}:{home}:{shell}",
            user = BUILD_USER,
            id = BUILD_USER_ID,
            gecos = BUILD_USER_GECOS,
            home = BUILD_USER_HOME,
            shell = BUILD_USER_SHELL
        ),
    )?;
    ensure_entry(
        &etc.join("group"),
        BUILD_USER,
        &format!("{}:x:{}:", BUILD_USER, BUILD_USER_ID),
    )?;

    let home = root.join(BUILD_USER_HOME.trim_start_matches('/'));
    if nix::unistd::geteuid().is_root() {
        mkdir_owned(
            &home,
            Uid::from_raw(BUILD_USER_ID),
            Gid::from_raw(BUILD_USER_ID),
        )
    } else {
        std::fs::create_dir_all(&home)?;
        Ok(())
    }
}
