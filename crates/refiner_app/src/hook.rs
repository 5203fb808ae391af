use refiner_engine::{AnalysisHook, HookError};
use tokio::process::Command;

/// Runs an external analysis program before each refinement.
pub struct CommandHook {
    program: String,
    args: Vec<String>,
}

impl CommandHook {
    /// `None` for an empty command line.
    pub fn from_command_line(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait::async_trait]
impl AnalysisHook for CommandHook {
    fn name(&self) -> &str {
        &self.program
    }

    async fn analyze(&self) -> Result<(), HookError> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .status()
            .await
            .map_err(|err| HookError(format!("failed to start: {err}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(HookError(format!("exited with {status}")))
        }
    }
}
