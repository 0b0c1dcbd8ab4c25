/// Unprivileged user that modern recipes build as.
pub const BUILD_USER: &str = "build";
pub const BUILD_USER_HOME: &str = "/home/build";
pub const BUILD_USER_SHELL: &str = "/bin/bash";
pub const BUILD_USER_ID: u32 = 1000;
pub const BUILD_USER_GECOS: &str = "solbuild user";

const SANE_PATH: &str = "/usr/bin:/usr/sbin:/bin:/sbin";
const SANE_LOCALE: &str = "en_US.UTF-8";

/* Host variables we let through so package downloads inside the root still
 * work behind a proxy. Checked in both cases. */
const PERMITTED_HOST_VARS: [&str; 4] =
    ["http_proxy", "https_proxy", "no_proxy", "ftp_proxy"];

/// The user a sandboxed command is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user: &'static str,
    pub home: &'static str,
}

impl Identity {
    pub const ROOT: Identity = Identity {
        user: "root",
        home: "/root",
    };

    pub const BUILD: Identity = Identity {
        user: BUILD_USER,
        home: BUILD_USER_HOME,
    };

    pub fn is_root(&self) -> bool {
        self.user == "root"
    }

    /// Minimal environment for commands run inside the root. Nothing from the
    /// host leaks through except proxy settings.
    pub fn environment(&self) -> Vec<(String, String)> {
        let mut env = vec![
            ("PATH".to_string(), SANE_PATH.to_string()),
            ("LANG".to_string(), SANE_LOCALE.to_string()),
            ("LC_ALL".to_string(), SANE_LOCALE.to_string()),
            ("HOME".to_string(), self.home.to_string()),
            ("USER".to_string(), self.user.to_string()),
            ("USERNAME".to_string(), self.user.to_string()),
            ("SHELL".to_string(), BUILD_USER_SHELL.to_string()),
        ];

        for var in PERMITTED_HOST_VARS {
            for key in [var.to_string(), var.to_uppercase()] {
                if let Ok(value) = std::env::var(&key) {
                    env.push((key, value));
                }
            }
        }

        env
    }
}
