//! Evaluating whole programs: a source string or a file, one top-level form at a time

use std::path::Path;

use tracing::debug;

use crate::Error;
use crate::ast::Value;
use crate::evaluator::{Depth, Environment, EvalConfig, eval_with_depth_tracking};
use crate::scheme::{ParseConfig, parse_program_with_config};

/// Read and evaluate each top-level form of `source` in order.
///
/// `on_result` sees the value of every form that evaluated successfully. The first parse or
/// evaluation error stops the run; bindings made by earlier forms stay in `env`. Returns the
/// value of the last form, or `Unassigned` for a program with no forms.
pub fn run_forms(
    source: &str,
    env: &Environment,
    config: &EvalConfig,
    on_result: impl FnMut(&Value),
) -> Result<Value, Error> {
    run_forms_at(source, env, Depth::start(config), on_result)
}

/// Every form starts from `depth`, so a program run from inside an evaluation nests in it
fn run_forms_at(
    source: &str,
    env: &Environment,
    depth: Depth,
    mut on_result: impl FnMut(&Value),
) -> Result<Value, Error> {
    let mut last = Value::Unassigned;
    for form in parse_program_with_config(source, ParseConfig::default()) {
        last = eval_with_depth_tracking(&form?, env, depth)?;
        on_result(&last);
    }
    Ok(last)
}

/// Evaluate every form of `source` in `env` and return the last value
pub fn run_source(source: &str, env: &Environment) -> Result<Value, Error> {
    run_source_with_config(source, env, &EvalConfig::default())
}

pub fn run_source_with_config(
    source: &str,
    env: &Environment,
    config: &EvalConfig,
) -> Result<Value, Error> {
    run_forms(source, env, config, |_| {})
}

/// Evaluate the forms of the file at `path` in `env`.
///
/// A file that cannot be read fails with [`Error::IoFailure`] before anything is evaluated.
/// Otherwise this behaves like [`run_source`], aborting at the first failing form.
pub fn load_file(path: impl AsRef<Path>, env: &Environment) -> Result<Value, Error> {
    load_file_with_config(path, env, &EvalConfig::default())
}

pub fn load_file_with_config(
    path: impl AsRef<Path>,
    env: &Environment,
    config: &EvalConfig,
) -> Result<Value, Error> {
    load_file_at(path.as_ref(), env, Depth::start(config))
}

/// Load a file on behalf of running code, continuing the caller's depth count
pub(crate) fn load_file_at(path: &Path, env: &Environment, depth: Depth) -> Result<Value, Error> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| Error::io_failure(path.display().to_string(), &e))?;

    debug!(path = %path.display(), bytes = source.len(), "loading file");
    let mut forms = 0_usize;
    let result = run_forms_at(&source, env, depth, |_| forms += 1);
    debug!(path = %path.display(), forms, ok = result.is_ok(), "finished loading");
    result
}
