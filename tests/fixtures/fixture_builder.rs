use anyhow::Result;
use rand::Rng;
use rstest::*;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub fn rid() -> String {
    let mut rng = rand::rng();
    (0..10)
        .map(|_| rng.sample(rand::distr::Alphanumeric) as char)
        .collect()
}

pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

pub const NANO_RECIPE: &str = "\
name       : nano
version    : 2.7.5
release    : 68
source     :
    - https://www.nano-editor.org/dist/v2.7/nano-2.7.5.tar.xz : \
      e3c8b5cd4ff2ee0b9e0b6ca2ce1a3e1ab6b0ae8dd4b4c2a9d7d9f0c4cbdc35a1
";

/// Runs the solbuild binary with every state directory redirected into a
/// private temporary tree.
pub struct BuilderManager {
    pub root: TempDir,
    /// The directory commands run in
    pub work_dir: PathBuf,
    pub last_stdout: String,
    pub last_stderr: String,
    pub profile: String,
}

impl BuilderManager {
    pub fn new() -> Result<Self> {
        let root = tempfile::Builder::new()
            .prefix(&format!("solbuild-test-{}", rid()))
            .tempdir()?;
        let work_dir = root.path().join("work");
        std::fs::create_dir_all(&work_dir)?;
        Ok(Self {
            root,
            work_dir,
            last_stdout: String::new(),
            last_stderr: String::new(),
            profile: "main-x86_64".to_string(),
        })
    }

    pub fn state_dir(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    #[allow(dead_code)]
    pub fn write_recipe(&self, content: &str) -> Result<PathBuf> {
        let path = self.work_dir.join("package.yml");
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Pretend `init` already ran for the default profile.
    #[allow(dead_code)]
    pub fn install_image(&self) -> Result<()> {
        let images = self.state_dir("images");
        std::fs::create_dir_all(&images)?;
        std::fs::write(images.join(format!("{}.img", self.profile)), "")?;
        Ok(())
    }

    pub fn run(&mut self, args: &[&str]) -> Result<std::process::Output> {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_solbuild"));
        cmd.current_dir(&self.work_dir)
            .env_remove("COMPLETE")
            .env("SOLBUILD_PROFILE_DIRS", self.state_dir("profiles"));
        for (var, dir) in [
            ("SOLBUILD_IMAGES_DIR", "images"),
            ("SOLBUILD_ROOTS_DIR", "roots"),
            ("SOLBUILD_OVERLAY_DIR", "overlay"),
            ("SOLBUILD_SOURCES_DIR", "sources"),
            ("SOLBUILD_PACKAGES_DIR", "packages"),
        ] {
            cmd.env(var, self.state_dir(dir));
        }
        cmd.args(["--no-config", "--no-color"]).args(args);

        println!(
            "Running command: {} {}",
            cmd.get_program().to_string_lossy(),
            args.join(" ")
        );
        let output = cmd.output()?;
        self.last_stdout = String::from_utf8_lossy(&output.stdout).to_string();
        self.last_stderr = String::from_utf8_lossy(&output.stderr).to_string();
        Ok(output)
    }

    pub fn pass(&mut self, args: &[&str]) -> bool {
        match self.run(args) {
            Ok(output) if output.status.success() => true,
            _ => {
                println!("last_stderr: {}", self.last_stderr);
                println!("last_stdout: {}", self.last_stdout);
                false
            }
        }
    }

    /// True when the command ran and exited with status 1.
    pub fn xfail(&mut self, args: &[&str]) -> bool {
        match self.run(args) {
            Ok(output) => output.status.code() == Some(1),
            Err(e) => {
                println!("Failed to run: {}", e);
                false
            }
        }
    }
}

impl Drop for BuilderManager {
    fn drop(&mut self) {
        // Nothing must be left mounted under our tree
        let root = self.root.path().to_string_lossy().to_string();
        if let Ok(mounts) = std::fs::read_to_string("/proc/mounts") {
            for line in mounts.lines() {
                if line.contains(&root) {
                    log::error!("Leaked mount: {}", line);
                }
            }
        }
    }
}

#[fixture]
pub fn builder() -> BuilderManager {
    BuilderManager::new().unwrap()
}

#[allow(dead_code)]
pub fn exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}
