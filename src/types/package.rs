use super::identity::{BUILD_USER_HOME, Identity};
use std::path::{Path, PathBuf};

/// Hash used to verify a source archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
}

/// The two recipe formats we know how to build. Each stage asks the kind what
/// it needs rather than matching on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeKind {
    /// `pspec.xml`, built with the package manager's own tooling as root.
    Legacy,
    /// `package.yml`, built as the unprivileged build user.
    Modern,
}

impl HashAlgorithm {
    /// Length of a hex encoded digest.
    pub fn hex_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Sha256 => 64,
        }
    }
}

impl RecipeKind {
    pub fn identity(self) -> Identity {
        match self {
            RecipeKind::Legacy => Identity::ROOT,
            RecipeKind::Modern => Identity::BUILD,
        }
    }

    pub fn hash_algorithm(self) -> HashAlgorithm {
        match self {
            RecipeKind::Legacy => HashAlgorithm::Sha1,
            RecipeKind::Modern => HashAlgorithm::Sha256,
        }
    }

    /// Whether user and network sandboxing can be applied. The legacy tooling
    /// needs root and the network to do anything useful.
    pub fn full_sandbox(self) -> bool {
        matches!(self, RecipeKind::Modern)
    }

    /// Work directory as seen from inside the root.
    pub fn work_dir(self) -> PathBuf {
        match self {
            RecipeKind::Legacy => PathBuf::from("/WORK"),
            RecipeKind::Modern => Path::new(BUILD_USER_HOME).join("work"),
        }
    }

    /// Directory the build tooling expects source archives in, as seen from
    /// inside the root.
    pub fn source_dir(self) -> PathBuf {
        match self {
            RecipeKind::Legacy => PathBuf::from("/var/cache/eopkg/archives"),
            RecipeKind::Modern => {
                Path::new(BUILD_USER_HOME).join("YPKG").join("sources")
            }
        }
    }

    /// Support files copied next to the recipe, when present.
    pub fn support_assets(self) -> &'static [&'static str] {
        match self {
            RecipeKind::Legacy => {
                &["files", "comar", "component.xml", "actions.py"]
            }
            RecipeKind::Modern => &["files", "comar", "component.xml"],
        }
    }
}

impl std::fmt::Display for RecipeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecipeKind::Legacy => write!(f, "legacy"),
            RecipeKind::Modern => write!(f, "ypkg"),
        }
    }
}

/// A source archive declared by a recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub uri: String,
    pub hash: String,
    /// File name the archive is exposed under inside the root.
    pub file: String,
}

impl Source {
    /// Both the hash and the file name end up as path components in the
    /// source cache and inside the root, so both are checked here.
    pub fn new(
        uri: &str,
        hash: &str,
        algorithm: HashAlgorithm,
    ) -> Result<Source, String> {
        let hash = hash.trim().to_lowercase();
        if hash.len() != algorithm.hex_len()
            || !hash.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(format!(
                "source {} has an invalid hash '{}', expected {} hex digits",
                uri,
                hash,
                algorithm.hex_len()
            ));
        }

        let file = uri
            .split(['?', '#'])
            .next()
            .unwrap_or(uri)
            .rsplit('/')
            .next()
            .unwrap_or(uri)
            .trim();
        if matches!(file, "" | "." | "..") {
            return Err(format!("source {} has no usable file name", uri));
        }

        Ok(Source {
            uri: uri.to_string(),
            hash,
            file: file.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub version: String,
    pub release: u32,
    pub kind: RecipeKind,
    pub path: PathBuf,
    pub sources: Vec<Source>,
    /// The recipe explicitly asked to keep network access while building.
    pub can_network: bool,
}

impl Package {
    /// The recipe file name as it appears in the work directory.
    pub fn recipe_file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| match self.kind {
                RecipeKind::Legacy => "pspec.xml".to_string(),
                RecipeKind::Modern => "package.yml".to_string(),
            })
    }

    /// Path of the recipe inside the root.
    pub fn recipe_in_root(&self) -> PathBuf {
        self.kind.work_dir().join(self.recipe_file_name())
    }

    /// Host side path of a directory that lives inside the root.
    pub fn host_path(mount_point: &Path, internal: &Path) -> PathBuf {
        mount_point.join(internal.strip_prefix("/").unwrap_or(internal))
    }

    pub fn work_dir(&self, mount_point: &Path) -> PathBuf {
        Package::host_path(mount_point, &self.kind.work_dir())
    }

    pub fn source_dir(&self, mount_point: &Path) -> PathBuf {
        Package::host_path(mount_point, &self.kind.source_dir())
    }
}

impl std::fmt::Display for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.name, self.version, self.release)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn package(kind: RecipeKind) -> Package {
        Package {
            name: "nano".to_string(),
            version: "2.7.5".to_string(),
            release: 68,
            kind,
            path: PathBuf::from("/src/nano/package.yml"),
            sources: vec![],
            can_network: false,
        }
    }

    #[test]
    fn test_identity_is_fixed_per_kind() {
        assert!(RecipeKind::Legacy.identity().is_root());
        assert_eq!(RecipeKind::Modern.identity().user, "build");
    }

    #[test]
    fn test_hash_algorithm_per_kind() {
        assert_eq!(RecipeKind::Legacy.hash_algorithm(), HashAlgorithm::Sha1);
        assert_eq!(
            RecipeKind::Modern.hash_algorithm(),
            HashAlgorithm::Sha256
        );
    }

    #[test]
    fn test_directories_inside_root() {
        let root = Path::new("/var/cache/solbuild/main/nano/union");
        let pkg = package(RecipeKind::Modern);
        assert_eq!(pkg.work_dir(root), root.join("home/build/work"));
        assert_eq!(pkg.source_dir(root), root.join("home/build/YPKG/sources"));
        assert_eq!(
            pkg.recipe_in_root(),
            PathBuf::from("/home/build/work/package.yml")
        );

        let legacy = package(RecipeKind::Legacy);
        assert_eq!(legacy.work_dir(root), root.join("WORK"));
        assert_eq!(
            legacy.source_dir(root),
            root.join("var/cache/eopkg/archives")
        );
    }

    const SHA1: &str = "E6D119755ACDF9104D7BA236B1242696940ED6DD ";

    #[test]
    fn test_source_file_name() {
        let src = Source::new(
            "https://www.nano-editor.org/dist/v2.7/nano-2.7.5.tar.xz",
            SHA1,
            HashAlgorithm::Sha1,
        )
        .unwrap();
        assert_eq!(src.file, "nano-2.7.5.tar.xz");
        assert_eq!(src.hash, "e6d119755acdf9104d7ba236b1242696940ed6dd");

        let src = Source::new(
            "https://example.com/get/foo.tar.gz?raw=1",
            SHA1,
            HashAlgorithm::Sha1,
        )
        .unwrap();
        assert_eq!(src.file, "foo.tar.gz");
    }

    #[rstest]
    #[case("https://x.org/a.tar.xz", "../../escaped")]
    #[case("https://x.org/a.tar.xz", "abcdef")]
    #[case("https://x.org/a.gz", "zzd119755acdf9104d7ba236b1242696940ed6dd")]
    #[case("https://x.org/dist/", SHA1)]
    #[case("https://x.org/dist/..", SHA1)]
    #[case("https://x.org/dist/.?x=1", SHA1)]
    fn test_source_rejects_unsafe_paths(
        #[case] uri: &str,
        #[case] hash: &str,
    ) {
        assert!(Source::new(uri, hash, HashAlgorithm::Sha1).is_err());
    }

    #[test]
    fn test_source_hash_length_follows_algorithm() {
        let uri = "https://x.org/a.tar.xz";
        assert!(Source::new(uri, SHA1, HashAlgorithm::Sha256).is_err());
        let sha256 = "0".repeat(64);
        assert!(Source::new(uri, &sha256, HashAlgorithm::Sha256).is_ok());
    }

    #[test]
    fn test_display() {
        assert_eq!(package(RecipeKind::Modern).to_string(), "nano-2.7.5-68");
    }
}
