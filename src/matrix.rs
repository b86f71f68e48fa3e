//! The build matrix: every project crossed with every toolchain.
//!
//! This is where both config files meet. Each (project, compiler) pair is
//! resolved into a [`WorkerSpec`]; the projects are then run one after the
//! other, each with all its toolchains in parallel.

use crate::build::{BuildContext, BuildSystemKind, PipelineBuilder};
use crate::config::{CompilersConfig, ProjectConfig, ProjectsConfig};
use crate::env::{EnvSnapshot, normalize_paths};
use crate::error::{MatrixError, Result};
use crate::interrupt;
use crate::orchestrator::step::timeout_from_secs;
use crate::orchestrator::{ProjectReport, Supervisor, WorkerSpec, WorkerStatus};
use crate::ui::{self, Severity, Table};
use colored::*;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct MatrixOptions {
    /// Project root; the current directory by default.
    pub root: PathBuf,
    /// Run the build system's clean target first.
    pub clean: bool,
}

/// Merges the configs into one worker spec per compiler for `name`.
pub fn resolve_project(
    compilers: &CompilersConfig,
    name: &str,
    project: &ProjectConfig,
    options: &MatrixOptions,
) -> Result<Vec<WorkerSpec>> {
    let unknown = || MatrixError::UnknownBuildSystem {
        project: name.to_string(),
        name: project.build_system.clone(),
    };
    let build_system = compilers
        .build_systems
        .get(&project.build_system)
        .ok_or_else(unknown)?;
    let kind = BuildSystemKind::from_name(&project.build_system).ok_or_else(unknown)?;

    if project.test_command.is_empty() {
        return Err(MatrixError::EmptyTestCommand {
            project: name.to_string(),
        });
    }

    let mut planned = Vec::with_capacity(compilers.compilers.len());
    for (compiler_name, compiler) in &compilers.compilers {
        let args = compiler
            .build_systems
            .get(&project.build_system)
            .cloned()
            .ok_or_else(|| MatrixError::MissingBuildArgs {
                compiler: compiler_name.clone(),
                build_system: project.build_system.clone(),
            })?;

        let mut search_path = build_system.path.clone();
        search_path.extend(compiler.path.iter().cloned());
        let env = EnvSnapshot::capture(&normalize_paths(&search_path)?, &compiler.environ)?;

        let ctx = BuildContext {
            root: options.root.clone(),
            build_directory: project.build_directory.clone(),
            compiler: compiler_name.clone(),
            executable: build_system.executable.clone(),
            clean: options.clean,
            test_command: project.test_command.clone(),
            test_timeout: timeout_from_secs(project.test_timeout),
            args,
        };
        planned.push((compiler_name, compiler, env, kind.plan(&ctx)?));
    }

    // Nothing is created on disk until every compiler resolved.
    let mut specs = Vec::with_capacity(planned.len());
    for (compiler_name, compiler, env, plan) in planned {
        plan.prepare()?;
        specs.push(WorkerSpec {
            id: compiler_name.clone(),
            pipeline: plan.pipeline,
            working_dir: plan.working_dir,
            env,
            log_path: plan.log_path,
            setenv: compiler.setenv.clone(),
        });
    }
    Ok(specs)
}

#[derive(Debug, Clone, Default)]
pub struct MatrixReport {
    pub projects: Vec<ProjectReport>,
}

impl MatrixReport {
    pub fn success(&self) -> bool {
        self.projects.iter().all(ProjectReport::success)
    }

    pub fn interrupted(&self) -> bool {
        self.projects.iter().any(|p| p.interrupted)
    }

    pub fn summary(&self) -> Table {
        let mut table = Table::new(&["Project", "Toolchain", "Status", "Time"]);
        for project in &self.projects {
            if let Some(error) = &project.error {
                table.add_row(vec![
                    project.project.clone(),
                    "-".to_string(),
                    "ERROR".red().to_string(),
                    error.clone(),
                ]);
            }
            for result in &project.results {
                let label = result.status.label();
                let status = match result.status {
                    WorkerStatus::Passed => label.green(),
                    WorkerStatus::Failed => label.red(),
                    WorkerStatus::Cancelled => label.yellow(),
                };
                table.add_row(vec![
                    project.project.clone(),
                    result.id.clone(),
                    status.to_string(),
                    format!("{:.2?}", result.elapsed),
                ]);
            }
        }
        table
    }
}

/// Runs every project in turn. A project that cannot be resolved is
/// reported once and counts as failed; the remaining projects still run.
pub fn run(
    out: &mut dyn Write,
    supervisor: &Supervisor,
    compilers: &CompilersConfig,
    projects: &ProjectsConfig,
    options: &MatrixOptions,
) -> io::Result<MatrixReport> {
    let mut report = MatrixReport::default();

    for (name, project) in projects {
        if interrupt::interrupted() {
            break;
        }

        let specs = match resolve_project(compilers, name, project, options) {
            Ok(specs) => specs,
            Err(e) => {
                ui::print_line(out, &format!("[{name}] {e}"), Severity::Error)?;
                report
                    .projects
                    .push(ProjectReport::config_error(name, e.to_string()));
                continue;
            }
        };

        info!(project = %name, toolchains = specs.len(), "running project");
        report
            .projects
            .push(supervisor.run_project(out, name, specs)?);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compilers(tool_dir: &str) -> CompilersConfig {
        serde_json::from_value(json!({
            "build_systems": { "cmake": { "path": [], "executable": "cmake" } },
            "compilers": {
                "clang": {
                    "path": [tool_dir],
                    "environ": { "CC": "clang" },
                    "build_systems": {
                        "cmake": { "generator": "Ninja", "make_command": ["ninja"] }
                    }
                },
                "gcc": {
                    "environ": { "CC": "gcc" },
                    "setenv": ["/opt/gcc/env.sh"],
                    "build_systems": {
                        "cmake": { "generator": "Unix Makefiles", "make_command": ["make"] }
                    }
                }
            }
        }))
        .unwrap()
    }

    fn project(build_system: &str) -> ProjectConfig {
        serde_json::from_value(json!({
            "build_system": build_system,
            "build_directory": "build",
            "test_command": ["tests"]
        }))
        .unwrap()
    }

    fn options(root: &std::path::Path) -> MatrixOptions {
        MatrixOptions {
            root: root.to_path_buf(),
            clean: false,
        }
    }

    #[test]
    fn test_one_spec_per_compiler() {
        let root = tempfile::tempdir().unwrap();
        let tools = tempfile::tempdir().unwrap();
        let config = compilers(&tools.path().to_string_lossy());

        let specs =
            resolve_project(&config, "demo", &project("cmake"), &options(root.path())).unwrap();

        let ids: Vec<&str> = specs.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["clang", "gcc"]);

        let clang = &specs[0];
        assert_eq!(clang.env.get("CC"), Some("clang"));
        let path = clang.env.get("PATH").unwrap();
        assert_eq!(
            std::env::split_paths(path).next(),
            Some(tools.path().to_path_buf())
        );
        assert!(clang.setenv.is_none());
        assert_eq!(clang.pipeline[1].command, vec!["ninja"]);

        let gcc = &specs[1];
        assert_eq!(gcc.env.get("CC"), Some("gcc"));
        assert_eq!(gcc.setenv.as_ref().map(Vec::len), Some(1));
        assert!(gcc.log_path.ends_with("build/logs/gcc.log"));
    }

    #[test]
    fn test_unknown_build_system() {
        let root = tempfile::tempdir().unwrap();
        let config = compilers("/");
        let err =
            resolve_project(&config, "demo", &project("bazel"), &options(root.path())).unwrap_err();
        assert!(matches!(err, MatrixError::UnknownBuildSystem { .. }));
    }

    #[test]
    fn test_missing_tool_dir_is_a_config_error() {
        let root = tempfile::tempdir().unwrap();
        let config = compilers("/no/such/toolchain/bin");
        let err =
            resolve_project(&config, "demo", &project("cmake"), &options(root.path())).unwrap_err();
        assert!(matches!(err, MatrixError::MissingDirectory(_)));
    }

    #[test]
    fn test_empty_test_command() {
        let root = tempfile::tempdir().unwrap();
        let mut project = project("cmake");
        project.test_command.clear();
        let err = resolve_project(&compilers("/"), "demo", &project, &options(root.path()))
            .unwrap_err();
        assert!(matches!(err, MatrixError::EmptyTestCommand { .. }));
    }

    #[test]
    fn test_unresolvable_project_does_not_stop_the_others() {
        colored::control::set_override(false);
        let root = tempfile::tempdir().unwrap();
        let config: CompilersConfig = serde_json::from_value(json!({
            "build_systems": { "cmake": { "executable": "cmake" } },
            "compilers": {}
        }))
        .unwrap();
        let mut projects = ProjectsConfig::new();
        projects.insert("broken".to_string(), project("bazel"));
        projects.insert("empty".to_string(), project("cmake"));

        let mut out = Vec::new();
        let supervisor = Supervisor::new(Default::default());
        let report = run(&mut out, &supervisor, &config, &projects, &options(root.path())).unwrap();

        assert_eq!(report.projects.len(), 2);
        assert!(report.projects[0].error.is_some());
        assert!(report.projects[1].success());
        assert!(!report.success());
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("unknown build system 'bazel'"));
    }

    #[test]
    fn test_bad_args_for_one_compiler_create_nothing() {
        let root = tempfile::tempdir().unwrap();
        let config: CompilersConfig = serde_json::from_value(json!({
            "build_systems": { "cmake": { "executable": "cmake" } },
            "compilers": {
                "clang": {
                    "build_systems": {
                        "cmake": { "generator": "Ninja", "make_command": ["ninja"] }
                    }
                },
                "gcc": {
                    "build_systems": { "cmake": { "generator": "Unix Makefiles" } }
                }
            }
        }))
        .unwrap();

        let err = resolve_project(&config, "demo", &project("cmake"), &options(root.path()))
            .unwrap_err();

        assert!(matches!(err, MatrixError::InvalidBuildArgs { .. }));
        assert!(!root.path().join("build").exists());
    }

    #[test]
    fn test_missing_args_for_one_compiler_create_nothing() {
        let root = tempfile::tempdir().unwrap();
        let config: CompilersConfig = serde_json::from_value(json!({
            "build_systems": { "cmake": { "executable": "cmake" } },
            "compilers": {
                "clang": {
                    "build_systems": {
                        "cmake": { "generator": "Ninja", "make_command": ["ninja"] }
                    }
                },
                "gcc": { "build_systems": {} }
            }
        }))
        .unwrap();

        let err = resolve_project(&config, "demo", &project("cmake"), &options(root.path()))
            .unwrap_err();

        assert!(matches!(err, MatrixError::MissingBuildArgs { .. }));
        assert!(!root.path().join("build").exists());
    }
}
