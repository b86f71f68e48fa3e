use super::{BuildContext, PipelineBuilder, PipelinePlan, decode_args};
use crate::error::Result;
use crate::orchestrator::Step;
use serde::Deserialize;

/// Per-compiler CMake settings from the compilers config.
#[derive(Deserialize, Debug, Clone)]
pub struct CMakeArgs {
    /// CMake generator, e.g. "Ninja" or "NMake Makefiles".
    pub generator: String,
    /// Command that drives the generated build, e.g. `["make", "-j8"]`.
    pub make_command: Vec<String>,
}

/// Layout under `root`:
///
/// - `<build_directory>/<compiler>/` - CMake binary dir, steps run here
/// - `<build_directory>/logs/<compiler>.log`
/// - `lib/<compiler>/`, `bin/<compiler>/` - build outputs
pub struct CMakeBuilder;

impl PipelineBuilder for CMakeBuilder {
    fn plan(&self, ctx: &BuildContext) -> Result<PipelinePlan> {
        let args: CMakeArgs = decode_args(ctx)?;

        let build = ctx.root.join(&ctx.build_directory).join(&ctx.compiler);
        let logs = ctx.root.join(&ctx.build_directory).join("logs");
        let lib = ctx.root.join("lib").join(&ctx.compiler);
        let bin = ctx.root.join("bin").join(&ctx.compiler);
        let mut pipeline = Vec::new();

        if ctx.clean {
            let mut clean = args.make_command.clone();
            clean.push("clean".to_string());
            pipeline.push(Step::new(clean, "Cleaning").non_fatal());
        }

        let lib_dir = lib.to_string_lossy();
        let configure = vec![
            ctx.executable.clone(),
            "-G".to_string(),
            args.generator.clone(),
            format!("-DLIBRARY_OUTPUT_DIRECTORY={lib_dir}"),
            format!("-DARCHIVE_OUTPUT_DIRECTORY={lib_dir}"),
            format!("-DRUNTIME_OUTPUT_DIRECTORY={}", bin.display()),
            ctx.root.to_string_lossy().into_owned(),
        ];
        pipeline.push(Step::new(configure, "Running CMake"));

        pipeline.push(Step::new(args.make_command.clone(), "Building"));

        // The test binary is one of the build outputs.
        let mut test = ctx.test_command.clone();
        if let Some(program) = test.first_mut() {
            *program = bin.join(&*program).to_string_lossy().into_owned();
        }
        pipeline.push(Step::new(test, "Testing").with_timeout(ctx.test_timeout));

        Ok(PipelinePlan {
            pipeline,
            working_dir: build,
            log_path: logs.join(format!("{}.log", ctx.compiler)),
        })
    }
}
