//! Generic executor templates
//!
//! Every release task of a workflow routes to one container template that runs
//! `chartflow-executor` with the task's release payload. The template is
//! parameterized at invocation, never at definition.

use super::naming::Identifier;
use super::{ClientOptions, HELM_RELEASE_ARG, TIMEOUT_ARG};
use crate::models::{Container, ExecutorAction, Inputs, Parameter, Template};

/// Template name of the install executor
pub const HELM_RELEASE_EXECUTOR: &str = "helmrelease-executor";

/// Template name of the teardown executor
pub const HELM_RELEASE_REVERSE_EXECUTOR: &str = "helmrelease-reverse-executor";

/// Binary the executor container runs
pub const EXECUTOR_BINARY: &str = "chartflow-executor";

/// Build an executor template named `name` that applies `action` to its payload
pub fn executor_template(name: &str, action: ExecutorAction, options: &ClientOptions) -> Template {
    Template {
        name: Identifier::normalize(name),
        dag: None,
        container: Some(Container {
            image: options.executor_image.clone(),
            command: vec![EXECUTOR_BINARY.to_string()],
            args: vec![
                format!("--spec={{{{inputs.parameters.{}}}}}", HELM_RELEASE_ARG),
                format!("--timeout={{{{inputs.parameters.{}}}}}", TIMEOUT_ARG),
                format!("--action={}", action),
            ],
        }),
        inputs: Some(Inputs {
            parameters: vec![
                Parameter::declared(HELM_RELEASE_ARG, None),
                Parameter::declared(TIMEOUT_ARG, Some(&options.executor_timeout)),
            ],
        }),
        parallelism: None,
    }
}

/// Executor used by forward (install) tasks
pub fn install_executor(options: &ClientOptions) -> Template {
    executor_template(HELM_RELEASE_EXECUTOR, ExecutorAction::Install, options)
}

/// Executor used by reverse (teardown) tasks
pub fn delete_executor(options: &ClientOptions) -> Template {
    executor_template(HELM_RELEASE_REVERSE_EXECUTOR, ExecutorAction::Delete, options)
}
