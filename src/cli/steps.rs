//! Splitting the command line into pipeline steps

use crate::core::error::{Error, Result};
use crate::core::step::{ModuleStep, PipelineStep};
use regex::Regex;

/// `alias:module` starts a step running `module` under the name `alias`
const ALIAS_PATTERN: &str = r"(?i)^([a-z\-]*):([a-z\-]*)$";

/// Split `argv` into module steps
///
/// A known module name starts a new step, as does `alias:module`; anything else is an option
/// of the step started last.
pub fn deduce_pipeline<S: AsRef<str>>(argv: &[S], modules: &[&str]) -> Result<Vec<PipelineStep>> {
    let alias = Regex::new(ALIAS_PATTERN)
        .map_err(|e| Error::hard_with("Invalid alias pattern", e))?;

    let mut steps: Vec<ModuleStep> = Vec::new();

    for arg in argv.iter().map(AsRef::as_ref) {
        if modules.contains(&arg) {
            steps.push(ModuleStep::new(arg, Vec::new()));
            continue;
        }

        if let Some(captures) = alias.captures(arg) {
            let module = captures.get(1).map_or("", |m| m.as_str());
            let actual = captures.get(2).map(|m| m.as_str().to_string());
            steps.push(ModuleStep::aliased(module, actual, Vec::new()));
            continue;
        }

        match steps.last_mut() {
            Some(step) => step.argv.push(arg.to_string()),
            None => {
                return Err(Error::hard(format!(
                    "Cannot parse module argument: '{}'",
                    arg
                )))
            }
        }
    }

    Ok(steps.into_iter().map(PipelineStep::Module).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_steps(steps: Vec<PipelineStep>) -> Vec<ModuleStep> {
        steps
            .into_iter()
            .filter_map(|step| match step {
                PipelineStep::Module(step) => Some(step),
                PipelineStep::Callback(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_split_by_module_names() {
        let steps = deduce_pipeline(
            &["koji", "--task-id=1", "-v", "build:koji", "--id", "2", "brew"],
            &["koji", "brew"],
        )
        .unwrap();

        assert_eq!(
            module_steps(steps),
            vec![
                ModuleStep::new("koji", vec!["--task-id=1".to_string(), "-v".to_string()]),
                ModuleStep::aliased(
                    "build",
                    Some("koji".to_string()),
                    vec!["--id".to_string(), "2".to_string()]
                ),
                ModuleStep::new("brew", vec![]),
            ]
        );
    }

    #[test]
    fn test_argument_before_any_module() {
        let err = deduce_pipeline(&["--task-id=1", "koji"], &["koji"]).unwrap_err();
        assert_eq!(err.to_string(), "Cannot parse module argument: '--task-id=1'");
    }

    #[test]
    fn test_empty_command_line() {
        assert!(deduce_pipeline::<&str>(&[], &["koji"]).unwrap().is_empty());
    }
}
