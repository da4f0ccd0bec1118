//! `${VAR}` expansion for secrets kept out of command lines.

use crate::traits::NotifyError;

/// Replace every `${NAME}` in `input` with the value of env var `NAME`.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, NotifyError> {
    let mut resolved = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        resolved.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| NotifyError::Config(format!("unclosed env var reference in: {input}")))?;
        let name = &after[..end];
        let value = std::env::var(name)
            .map_err(|_| NotifyError::Config(format!("env var not found: {name}")))?;
        resolved.push_str(&value);
        rest = &after[end + 1..];
    }
    resolved.push_str(rest);

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_every_reference() {
        std::env::set_var("RW_ENV_PROTO", "https");
        std::env::set_var("RW_ENV_HOST", "hooks.test");
        let result = resolve_env_vars("${RW_ENV_PROTO}://${RW_ENV_HOST}/svn").unwrap();
        assert_eq!(result, "https://hooks.test/svn");
    }

    #[test]
    fn missing_var_names_the_variable() {
        match resolve_env_vars("https://${REPOWATCH_NOT_SET_12345}/hook") {
            Err(NotifyError::Config(msg)) => assert!(msg.contains("REPOWATCH_NOT_SET_12345")),
            other => panic!("expected Config error, got: {other:?}"),
        }
    }

    #[test]
    fn unclosed_reference_is_rejected() {
        match resolve_env_vars("${UNCLOSED") {
            Err(NotifyError::Config(msg)) => assert!(msg.contains("unclosed")),
            other => panic!("expected Config error, got: {other:?}"),
        }
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(resolve_env_vars("123456:ABC-DEF").unwrap(), "123456:ABC-DEF");
    }
}
