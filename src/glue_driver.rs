//! Runs the glue operations in their fixed order.

use derive_more::Display;
use emfinalize_glue::{GlueGenerator, GlueResult};
use emfinalize_ir::Module;
use tracing::debug;

use crate::errors::{FinalizeError, FinalizeResult};

/// One glue operation, named after the capability it invokes.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum GlueStage {
    #[display("generate-runtime-functions")]
    RuntimeFunctions,
    #[display("generate-memory-growth-function")]
    MemoryGrowthFunction,
    #[display("generate-dyncall-thunks")]
    DynCallThunks,
    #[display("fix-em-asm-consts")]
    EmAsmConsts,
}

impl GlueStage {
    /// Execution order. Later stages may depend on what earlier ones add.
    pub const ORDER: [GlueStage; 4] = [
        GlueStage::RuntimeFunctions,
        GlueStage::MemoryGrowthFunction,
        GlueStage::DynCallThunks,
        GlueStage::EmAsmConsts,
    ];

    fn run(self, generator: &mut dyn GlueGenerator, module: &mut Module) -> GlueResult<()> {
        match self {
            GlueStage::RuntimeFunctions => generator.generate_runtime_functions(module),
            GlueStage::MemoryGrowthFunction => generator.generate_memory_growth_function(module),
            GlueStage::DynCallThunks => generator.generate_dyncall_thunks(module),
            GlueStage::EmAsmConsts => generator.fix_em_asm_consts(module),
        }
    }
}

/// Apply every glue stage to `module`, stopping at the first failure.
pub fn drive_glue(generator: &mut dyn GlueGenerator, module: &mut Module) -> FinalizeResult<()> {
    for stage in GlueStage::ORDER {
        debug!("glue: {stage}");
        let before = module.functions().len();
        stage
            .run(generator, module)
            .map_err(|err| FinalizeError::glue(stage, err))?;
        debug!(
            "glue: {stage} added {} functions",
            module.functions().len() - before
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use emfinalize_glue::GlueError;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<GlueStage>,
        fail_at: Option<GlueStage>,
    }

    impl Recorder {
        fn record(&mut self, stage: GlueStage) -> GlueResult<()> {
            self.calls.push(stage);
            if self.fail_at == Some(stage) {
                return Err(GlueError::invalid_module("injected"));
            }
            Ok(())
        }
    }

    impl GlueGenerator for Recorder {
        fn generate_runtime_functions(&mut self, _: &mut Module) -> GlueResult<()> {
            self.record(GlueStage::RuntimeFunctions)
        }

        fn generate_memory_growth_function(&mut self, _: &mut Module) -> GlueResult<()> {
            self.record(GlueStage::MemoryGrowthFunction)
        }

        fn generate_dyncall_thunks(&mut self, _: &mut Module) -> GlueResult<()> {
            self.record(GlueStage::DynCallThunks)
        }

        fn fix_em_asm_consts(&mut self, _: &mut Module) -> GlueResult<()> {
            self.record(GlueStage::EmAsmConsts)
        }
    }

    #[test]
    fn test_stages_run_in_order() {
        let mut recorder = Recorder::default();
        drive_glue(&mut recorder, &mut Module::new()).unwrap();
        assert_eq!(recorder.calls, GlueStage::ORDER);
    }

    #[test]
    fn test_failure_stops_the_pipeline() {
        let mut recorder = Recorder {
            fail_at: Some(GlueStage::MemoryGrowthFunction),
            ..Recorder::default()
        };
        let err = drive_glue(&mut recorder, &mut Module::new()).unwrap_err();
        assert_eq!(
            recorder.calls,
            [GlueStage::RuntimeFunctions, GlueStage::MemoryGrowthFunction]
        );
        assert_eq!(
            err.to_string(),
            "generate-memory-growth-function failed: Invalid module: injected"
        );
    }
}
