//! Operator-supplied pre- and post-update commands.
use anyhow::Result;
use std::path::Path;

use crate::config::CommandSpec;
use crate::error::CommandError;
use crate::exec::Executor;
use crate::logging::Log;

/// Split a command's argument string with POSIX shell quoting rules.
///
/// # Errors
///
/// Returns [`CommandError::InvalidArguments`] for unbalanced quotes.
pub fn split_arguments(command: &CommandSpec) -> Result<Vec<String>, CommandError> {
    match command.arguments.as_deref().map(str::trim) {
        None | Some("") => Ok(Vec::new()),
        Some(raw) => shlex::split(raw).ok_or_else(|| CommandError::InvalidArguments {
            program: command.program.clone(),
            arguments: raw.to_string(),
        }),
    }
}

/// Run one command to completion.
///
/// The command runs inside `cwd` when given.
///
/// # Errors
///
/// Returns [`CommandError`] when the arguments cannot be parsed, the program
/// cannot be launched, or it exits unsuccessfully.
pub fn run_command(
    executor: &dyn Executor,
    command: &CommandSpec,
    cwd: Option<&Path>,
) -> Result<(), CommandError> {
    let args = split_arguments(command)?;
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let result = match cwd {
        Some(dir) => executor.run_unchecked_in(dir, &command.program, &args),
        None => executor.run_unchecked(&command.program, &args),
    }
    .map_err(|e| CommandError::Launch {
        program: command.program.clone(),
        reason: format!("{e:#}"),
    })?;

    if result.success {
        return Ok(());
    }

    let status = result
        .code
        .map_or_else(|| "terminated by signal".to_string(), |c| format!("exit code {c}"));
    let stderr = result.stderr.trim();
    Err(CommandError::Failed {
        program: command.program.clone(),
        reason: if stderr.is_empty() {
            status
        } else {
            format!("{status}: {stderr}")
        },
    })
}

/// Run a phase of commands strictly in order.
///
/// A failing command marked `safe` is logged as a warning and the phase
/// continues; any other failure aborts the remaining commands.
///
/// # Errors
///
/// Returns the first failure of a command that is not marked `safe`.
pub fn run_phase(
    executor: &dyn Executor,
    phase: &str,
    commands: &[CommandSpec],
    cwd: Option<&Path>,
    log: &dyn Log,
) -> Result<()> {
    for command in commands {
        log.debug(&format!(
            "{phase}: {} {}",
            command.program,
            command.arguments.as_deref().unwrap_or_default()
        ));
        match run_command(executor, command, cwd) {
            Ok(()) => {}
            Err(e) if command.safe => log.warn(&format!("{phase}: {e} (ignored)")),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
