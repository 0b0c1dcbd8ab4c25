use super::{NETWORKING_REQUESTED, Stage, run_stages};
use crate::outln;
use crate::sandbox::{
    BASE_COMPONENT, FetchReport, PackageManager, Session, SourceCache,
    bind_sources, ensure_eopkg_layout,
};
use crate::types::{BUILD_USER, BUILD_USER_HOME, Identity, Package};
use crate::util::copy_assets;
use anyhow::{Context, Result};
use fast_glob::glob_match;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a build carries from one stage to the next.
pub struct BuildState {
    pub session: Arc<Session>,
    pub package: Package,
    pub cache: SourceCache,
    /// Where finished packages are copied.
    pub output_dir: PathBuf,
    pub fetch_report: FetchReport,
    pub collected: Vec<PathBuf>,
}

impl BuildState {
    pub fn new(
        session: Arc<Session>,
        package: Package,
        output_dir: PathBuf,
    ) -> BuildState {
        let cache = SourceCache::new(&session.config.sources_dir);
        BuildState {
            session,
            package,
            cache,
            output_dir,
            fetch_report: FetchReport::default(),
            collected: Vec::new(),
        }
    }

    fn package_manager(&self) -> PackageManager<'_> {
        PackageManager::new(&self.session)
    }

    fn work_dir_in_root(&self) -> String {
        self.package.kind.work_dir().display().to_string()
    }

    fn exec_as_builder(&self, command: &str) -> Result<()> {
        self.session
            .exec(command, self.package.kind.identity(), false)
            .map_err(Into::into)
    }
}

fn activate_root(state: &mut BuildState) -> Result<()> {
    let with_build_user = !state.package.kind.identity().is_root();
    state.session.activate(with_build_user)?;
    Ok(())
}

fn copy_build_assets(state: &mut BuildState) -> Result<()> {
    let work_dir = state.package.work_dir(&state.session.mount_point());
    copy_assets(&state.package, &work_dir)
}

fn fetch_sources(state: &mut BuildState) -> Result<()> {
    let fetcher = state.session.host.sources.clone();
    state.fetch_report =
        state.cache.fetch_sources(&state.package, fetcher.as_ref());
    Ok(())
}

fn init_package_manager(state: &mut BuildState) -> Result<()> {
    let manager = state.package_manager();
    manager.init()?;
    manager.start_bus()?;
    Ok(())
}

fn upgrade_base(state: &mut BuildState) -> Result<()> {
    let manager = state.package_manager();
    manager.upgrade()?;
    manager.install_component(BASE_COMPONENT)?;
    Ok(())
}

fn create_dirs(state: &mut BuildState) -> Result<()> {
    let root = state.session.mount_point();
    let dirs = [state.package.work_dir(&root), state.package.source_dir(&root)];
    for dir in dirs {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Creating {}", dir.display()))?;
    }
    Ok(())
}

fn install_build_deps(state: &mut BuildState) -> Result<()> {
    info!("Installing build dependencies");
    let command = format!(
        "ypkg-install-deps -f {}",
        state.package.recipe_in_root().display()
    );
    state.session.exec(&command, Identity::ROOT, false)?;
    Ok(())
}

fn stop_service_bus(state: &mut BuildState) -> Result<()> {
    state.package_manager().stop_bus()?;
    Ok(())
}

fn stop_service_bus_legacy(state: &mut BuildState) -> Result<()> {
    warn!("Full sandboxing is not possible with legacy format");
    stop_service_bus(state)
}

fn fix_home_ownership(state: &mut BuildState) -> Result<()> {
    let command =
        format!("chown -R {0}:{0} {1}", BUILD_USER, BUILD_USER_HOME);
    state.session.exec(&command, Identity::ROOT, false)?;
    Ok(())
}

fn isolate_network(state: &mut BuildState) -> Result<()> {
    if state.package.can_network {
        warn!("{}", NETWORKING_REQUESTED);
        return Ok(());
    }
    state.session.isolate_network()?;
    Ok(())
}

fn stage_sources(state: &mut BuildState) -> Result<()> {
    bind_sources(&state.session, &state.package, &state.cache)?;
    Ok(())
}

fn assert_layout(state: &mut BuildState) -> Result<()> {
    ensure_eopkg_layout(&state.session.mount_point())?;
    Ok(())
}

fn build_modern(state: &mut BuildState) -> Result<()> {
    info!("Now starting build of {}", state.package);
    let command = format!(
        "/bin/su - {} -- fakeroot ypkg-build -D {} {}",
        BUILD_USER,
        state.work_dir_in_root(),
        state.package.recipe_in_root().display()
    );
    state.exec_as_builder(&command)
}

fn build_legacy(state: &mut BuildState) -> Result<()> {
    info!("Now starting build of {}", state.package);
    let work_dir = state.work_dir_in_root();
    let command = format!(
        "eopkg build --ignore-safety -O {0} {0}/{1}",
        work_dir,
        state.package.recipe_file_name()
    );
    state.exec_as_builder(&command)
}

fn collect_results(state: &mut BuildState) -> Result<()> {
    let work_dir = state.package.work_dir(&state.session.mount_point());
    let entries = std::fs::read_dir(&work_dir)
        .with_context(|| format!("Reading {}", work_dir.display()))?;

    for entry in entries {
        let path = entry?.path();
        let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
            continue;
        };
        if !path.is_file() || !glob_match("*.eopkg", &*name) {
            continue;
        }
        let dest = state.output_dir.join(&*name);
        std::fs::copy(&path, &dest)
            .with_context(|| format!("Copying {}", name))?;
        outln!("{}", dest.display());
        state.collected.push(dest);
    }

    if state.collected.is_empty() {
        warn!("No packages were produced by {}", state.package);
    }
    Ok(())
}

/// The stages for building `package`, in order.
pub fn build_stages(package: &Package) -> Vec<Stage<BuildState>> {
    let mut stages = vec![
        Stage::new("activate-root", activate_root),
        Stage::new("copy-assets", copy_build_assets),
        Stage::new("fetch-sources", fetch_sources),
        Stage::new("init-package-manager", init_package_manager),
        Stage::new("upgrade-base", upgrade_base),
        Stage::new("create-dirs", create_dirs),
    ];

    if package.kind.full_sandbox() {
        stages.extend([
            Stage::new("install-build-deps", install_build_deps),
            Stage::new("stop-service-bus", stop_service_bus),
            Stage::new("fix-home-ownership", fix_home_ownership),
            Stage::new("isolate-network", isolate_network),
            Stage::new("bind-sources", stage_sources),
            Stage::new("assert-layout", assert_layout),
            Stage::new("build-package", build_modern),
        ]);
    } else {
        stages.extend([
            Stage::new("stop-service-bus", stop_service_bus_legacy),
            Stage::new("bind-sources", stage_sources),
            Stage::new("build-package", build_legacy),
        ]);
    }

    stages.push(Stage::new("collect-results", collect_results));
    stages
}

/// Run the whole build. Teardown is left to the session's owner.
pub fn build_package(state: &mut BuildState) -> Result<()> {
    let stages = build_stages(&state.package);
    let label = state.package.to_string();
    run_stages(state, &stages, &label)?;

    if !state.fetch_report.failed.is_empty() {
        warn!(
            "Built without {} sources that could not be fetched",
            state.fetch_report.failed.len()
        );
    }
    info!("Build of {} finished", state.package);
    Ok(())
}
