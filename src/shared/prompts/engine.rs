//! Jinja prompt rendering.
//!
//! Templates ship inside the binary and can be overridden at runtime by
//! files under `templates/prompts/` in the working directory.

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

static TEMPLATE_ENV: OnceLock<Environment<'static>> = OnceLock::new();

/// Override directory relative to the working directory
const TEMPLATE_DIR: &str = "templates/prompts";

/// Built-in templates, keyed by their path under `templates/prompts/`
const EMBEDDED_TEMPLATES: &[(&str, &str)] = &[
    (
        "insights/deal_insights.jinja",
        include_str!("../../../templates/prompts/insights/deal_insights.jinja"),
    ),
    (
        "insights/forecast.jinja",
        include_str!("../../../templates/prompts/insights/forecast.jinja"),
    ),
    (
        "insights/forecast_system.jinja",
        include_str!("../../../templates/prompts/insights/forecast_system.jinja"),
    ),
];

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template '{0}' not found")]
    NotFound(String),

    #[error("Failed to render template: {0}")]
    RenderError(String),
}

fn init_environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);

    for &(name, source) in EMBEDDED_TEMPLATES {
        if let Err(e) = env.add_template(name, source) {
            tracing::error!("Embedded template {} is invalid: {}", name, e);
        }
    }

    let override_dir = Path::new(TEMPLATE_DIR);
    if override_dir.is_dir() {
        load_overrides(&mut env, override_dir, override_dir);
    }

    env
}

/// Replaces embedded templates with `.jinja` files found on disk
fn load_overrides(env: &mut Environment<'static>, base_path: &Path, current_path: &Path) {
    let Ok(entries) = std::fs::read_dir(current_path) else {
        return;
    };

    for path in entries.flatten().map(|entry| entry.path()) {
        if path.is_dir() {
            load_overrides(env, base_path, &path);
            continue;
        }
        if !path.extension().is_some_and(|ext| ext == "jinja") {
            continue;
        }
        let Ok(relative) = path.strip_prefix(base_path) else {
            continue;
        };
        // Template names use forward slashes on every platform
        let name = relative.to_string_lossy().replace('\\', "/");

        match std::fs::read_to_string(&path) {
            Ok(content) => {
                // The environment lives for the whole process
                let name: &'static str = Box::leak(name.into_boxed_str());
                let content: &'static str = Box::leak(content.into_boxed_str());
                match env.add_template(name, content) {
                    Ok(()) => tracing::debug!("Loaded template override: {}", name),
                    Err(e) => tracing::warn!("Failed to load template {}: {}", name, e),
                }
            }
            Err(e) => tracing::warn!("Failed to read template {}: {}", path.display(), e),
        }
    }
}

fn get_environment() -> &'static Environment<'static> {
    TEMPLATE_ENV.get_or_init(init_environment)
}

/// Renders `template_name` (path under `templates/prompts/`) with any
/// serializable context. Variables missing from the context are errors.
pub fn render_template<S: Serialize>(template_name: &str, ctx: S) -> Result<String, TemplateError> {
    let template = get_environment()
        .get_template(template_name)
        .map_err(|_| TemplateError::NotFound(template_name.to_string()))?;

    template
        .render(ctx)
        .map_err(|e| TemplateError::RenderError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn test_missing_template() {
        let result = render_template("nonexistent.jinja", context! {});
        assert!(matches!(result, Err(TemplateError::NotFound(_))));
    }

    #[test]
    fn test_embedded_templates_parse() {
        for (name, _) in EMBEDDED_TEMPLATES {
            assert!(get_environment().get_template(name).is_ok(), "{}", name);
        }
    }

    #[test]
    fn test_missing_variable_is_an_error() {
        let result = render_template("insights/forecast.jinja", context! {});
        assert!(matches!(result, Err(TemplateError::RenderError(_))));
    }
}
