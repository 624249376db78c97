//! Variable interpolation for pipeline definitions.
//!
//! The pipeline file of a repository is rendered with the execution context
//! of the order before it is parsed. Supported variables:
//! - `${workdir}` - Working directory of the checkout
//! - `${repo}` - Repository name
//! - `${branch}` - Branch name
//! - `${branch_dashed}` - Branch name with `/` replaced by `-`
//! - `${commit}` - Full commit id
//! - `${short_commit}` - First 7 characters of the commit id
//! - `${order_id}` - Order id
//! - `${env.VAR_NAME}` - Environment variable of the orchestrator process
//! - `${timestamp}` - Unix timestamp
//! - `${date}` - ISO date (YYYY-MM-DD)
//!
//! Unknown variables are left untouched. Substituted values are escaped for
//! use inside KDL string literals, so a `"` or `\` in a branch name cannot
//! end the string early.

use crate::ConfigResult;
use distonic_core::ExecutionContext;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

// Regex for matching ${...} variables
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?)\}").unwrap()
});

/// Resolve a variable name against `ctx`.
pub fn resolve(ctx: &ExecutionContext, var_name: &str) -> Option<String> {
    let parts: Vec<&str> = var_name.split('.').collect();

    match parts.as_slice() {
        ["workdir"] => Some(ctx.workdir.to_string_lossy().to_string()),
        ["repo"] => Some(ctx.repo.clone()),
        ["branch"] => Some(ctx.branch.clone()),
        ["branch_dashed"] => Some(ctx.branch_dashed.clone()),
        ["commit"] => Some(ctx.commit.clone()),
        ["short_commit"] => Some(ctx.short_commit.clone()),
        ["order_id"] => Some(ctx.order_id.to_string()),

        ["env", name] => std::env::var(name).ok(),

        ["timestamp"] => Some(chrono::Utc::now().timestamp().to_string()),
        ["date"] => Some(chrono::Utc::now().format("%Y-%m-%d").to_string()),

        _ => None,
    }
}

/// Interpolate all variables in a string, escaping each value as KDL string
/// content.
pub fn render(input: &str, ctx: &ExecutionContext) -> String {
    VAR_REGEX
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            match resolve(ctx, var_name) {
                Some(value) => escape(&value),
                None => format!("${{{}}}", var_name),
            }
        })
        .to_string()
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Render the file at `path` in place.
pub fn render_file(path: &Path, ctx: &ExecutionContext) -> ConfigResult<()> {
    let template = std::fs::read_to_string(path)?;
    let rendered = render(&template, ctx);
    std::fs::write(path, rendered)?;
    debug!(path = %path.display(), "Rendered template");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use distonic_core::pipeline::JobEntry;
    use serde_json::json;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(
            "app",
            "/data/worker/app/feature-x/abc1234567890",
            "feature/x",
            "abc1234567890",
        )
    }

    #[test]
    fn test_basic_interpolation() {
        let result = render("Commit ${commit} on ${branch}", &ctx());
        assert_eq!(result, "Commit abc1234567890 on feature/x");
    }

    #[test]
    fn test_dashed_branch_and_short_commit() {
        let result = render("app:${branch_dashed}-${short_commit}", &ctx());
        assert_eq!(result, "app:feature-x-abc1234");
    }

    #[test]
    fn test_workdir_and_repo() {
        let result = render("cd ${workdir} # ${repo}", &ctx());
        assert_eq!(result, "cd /data/worker/app/feature-x/abc1234567890 # app");
    }

    #[test]
    fn test_env_variables() {
        let path = std::env::var("PATH").unwrap_or_default();
        let result = render("${env.PATH}", &ctx());
        assert_eq!(result, path);
    }

    #[test]
    fn test_unknown_variable_preserved() {
        let result = render("Unknown: ${unknown.var} ${nope}", &ctx());
        assert_eq!(result, "Unknown: ${unknown.var} ${nope}");
    }

    #[test]
    fn test_date_variable() {
        let result = render("${date}", &ctx());
        assert_eq!(result.len(), 10);
        assert!(result.contains('-'));
    }

    #[test]
    fn test_kdl_braces_untouched() {
        let input = "stage \"build\" {\n    job {\n        echo \"${commit}\"\n    }\n}\n";
        let result = render(input, &ctx());
        assert_eq!(
            result,
            "stage \"build\" {\n    job {\n        echo \"abc1234567890\"\n    }\n}\n"
        );
    }

    #[test]
    fn test_quotes_in_values_stay_inside_the_string() {
        let ctx = ExecutionContext::new("app", "/data/app", "fix\"quote", "abc1234567890");
        let input = "stage \"build\" {\n    job {\n        shell run=\"echo ${branch}\"\n    }\n}\n";

        let rendered = render(input, &ctx);
        assert!(rendered.contains(r#"run="echo fix\"quote""#));

        let doc = crate::parse_pipeline(&rendered).unwrap();
        match &doc.stages[0].jobs[0].entries[0] {
            JobEntry::Module { params, .. } => {
                assert_eq!(params.get("run"), Some(&json!("echo fix\"quote")));
            }
            other => panic!("unexpected entry: {other:?}"),
        }
    }

    #[test]
    fn test_backslashes_are_escaped() {
        let ctx = ExecutionContext::new("app", r"C:\work\app", "main", "abc1234567890");
        assert_eq!(render("${workdir}", &ctx), r"C:\\work\\app");
    }

    #[test]
    fn test_render_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("distonic.kdl");
        std::fs::write(&path, "tag \"${branch_dashed}\"").unwrap();

        render_file(&path, &ctx()).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "tag \"feature-x\"");
    }
}
