//! Start-up steps run once, in order, before the super-loop.

use thiserror::Error;

use crate::env::Env;

/// What a failing step does to the rest of start-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnFailure {
    /// Log the failure and keep going.
    Continue,
    /// Abort start-up.
    Halt,
}

pub struct InitStep {
    pub name: &'static str,
    pub run: fn(&mut Env<'_>) -> Result<(), &'static str>,
    pub on_failure: OnFailure,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    #[error("init step {step} failed: {reason}")]
    StepFailed {
        step: &'static str,
        reason: &'static str,
    },
}

/// Runs `steps` in order and returns how many succeeded.
///
/// Stops at the first failing step marked [`OnFailure::Halt`].
pub fn run_init_steps(steps: &[InitStep], env: &mut Env<'_>) -> Result<usize, InitError> {
    let mut succeeded = 0;
    for step in steps {
        match (step.run)(env) {
            Ok(()) => {
                log::debug!("init: {} ok", step.name);
                succeeded += 1;
            }
            Err(reason) => {
                log::error!("init: {} failed: {}", step.name, reason);
                if step.on_failure == OnFailure::Halt {
                    return Err(InitError::StepFailed {
                        step: step.name,
                        reason,
                    });
                }
            }
        }
    }
    Ok(succeeded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::Terminal;
    use crate::testing::Board;

    fn ok(env: &mut Env<'_>) -> Result<(), &'static str> {
        env.console.write_bytes(b"+");
        Ok(())
    }

    fn broken(_: &mut Env<'_>) -> Result<(), &'static str> {
        Err("no clock")
    }

    #[test]
    fn continue_steps_do_not_stop_start_up() {
        let mut board = Board::new();
        let steps = [
            InitStep { name: "a", run: ok, on_failure: OnFailure::Halt },
            InitStep { name: "b", run: broken, on_failure: OnFailure::Continue },
            InitStep { name: "c", run: ok, on_failure: OnFailure::Halt },
        ];
        assert_eq!(run_init_steps(&steps, &mut board.env(0)), Ok(2));
        assert_eq!(board.sink.contents(), "++");
    }

    #[test]
    fn halt_steps_abort_start_up() {
        let mut board = Board::new();
        let steps = [
            InitStep { name: "clocks", run: broken, on_failure: OnFailure::Halt },
            InitStep { name: "never", run: ok, on_failure: OnFailure::Halt },
        ];
        assert_eq!(
            run_init_steps(&steps, &mut board.env(0)),
            Err(InitError::StepFailed { step: "clocks", reason: "no clock" })
        );
        assert!(board.sink.contents().is_empty());
    }
}
