//! Environment wrapper scripts.
//!
//! Some toolchains (MSVC being the usual suspect) can only be set up by
//! sourcing a vendor script. For those, each step is written into a small
//! script that sources the setup scripts first and then runs the command.

use super::step::quote;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct EnvShim {
    scripts: Vec<String>,
    path: PathBuf,
}

impl EnvShim {
    /// The shim lives in `dir`, which is the toolchain's own build directory.
    pub fn new(scripts: Vec<String>, dir: &Path) -> Self {
        let name = if cfg!(target_os = "windows") {
            "setenv.bat"
        } else {
            "setenv.sh"
        };
        Self {
            scripts,
            path: dir.join(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrites the shim for `command` and returns the shell command that
    /// runs it in place of the original.
    pub fn wrap(&self, command: &str) -> io::Result<String> {
        fs::write(&self.path, self.render(command))?;
        let path = quote(&self.path.to_string_lossy());
        if cfg!(target_os = "windows") {
            Ok(path)
        } else {
            Ok(format!("sh {path}"))
        }
    }

    fn render(&self, command: &str) -> String {
        let mut script = String::new();
        if cfg!(target_os = "windows") {
            script.push_str("@ECHO OFF\n");
            for setup in &self.scripts {
                script.push_str(&format!("CALL {} || EXIT 1\n", quote(setup)));
            }
            script.push_str(&format!("{command}\n"));
            script.push_str("EXIT /B %ERRORLEVEL%\n");
        } else {
            for setup in &self.scripts {
                script.push_str(&format!(". {} || exit 1\n", quote(setup)));
            }
            script.push_str(&format!("{command}\n"));
        }
        script
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::env::EnvSnapshot;
    use crate::interrupt::CancelToken;
    use crate::orchestrator::runner::StepRunner;
    use crate::orchestrator::watchdog::StepOutcome;
    use std::collections::BTreeMap;

    #[test]
    fn test_render_sources_scripts_in_order() {
        let shim = EnvShim::new(
            vec!["/opt/a.sh".to_string(), "/opt/my env.sh".to_string()],
            Path::new("/build/gcc"),
        );
        assert_eq!(shim.path(), Path::new("/build/gcc/setenv.sh"));
        assert_eq!(
            shim.render("make all"),
            ". /opt/a.sh || exit 1\n. \"/opt/my env.sh\" || exit 1\nmake all\n"
        );
    }

    #[test]
    fn test_wrapped_command_sees_sourced_env() {
        let dir = tempfile::tempdir().unwrap();
        let setup = dir.path().join("vars.sh");
        fs::write(&setup, "export CXM_FROM_SETUP=yes\n").unwrap();

        let shim = EnvShim::new(vec![setup.to_string_lossy().into_owned()], dir.path());
        let wrapped = shim.wrap("echo $CXM_FROM_SETUP; exit 5").unwrap();

        let env = EnvSnapshot::capture(&[], &BTreeMap::new()).unwrap();
        let runner = StepRunner::new(dir.path().to_path_buf(), env, dir.path().join("out.log"));
        runner.reset_log().unwrap();
        let outcome = runner.run(&wrapped, None, &CancelToken::new()).unwrap();

        assert_eq!(outcome, StepOutcome::Exited(5));
        assert_eq!(runner.read_log().unwrap(), "yes\n");
    }

    #[test]
    fn test_failing_setup_aborts_command() {
        let dir = tempfile::tempdir().unwrap();
        let shim = EnvShim::new(vec!["/no/such/setup.sh".to_string()], dir.path());
        let wrapped = shim.wrap("echo should-not-run").unwrap();

        let env = EnvSnapshot::capture(&[], &BTreeMap::new()).unwrap();
        let runner = StepRunner::new(dir.path().to_path_buf(), env, dir.path().join("out.log"));
        runner.reset_log().unwrap();
        let outcome = runner.run(&wrapped, None, &CancelToken::new()).unwrap();

        assert!(!outcome.is_success());
        assert!(!runner.read_log().unwrap().contains("should-not-run"));
    }
}
