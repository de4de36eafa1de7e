use std::str::FromStr;

pub fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "yes" | "on")
}

/// Set `target` from a boolean-ish variable; any non-truthy value means false.
pub fn override_bool_with<F>(target: &mut bool, var: &str, env_get: &F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = first_set_with(&[var], env_get) {
        *target = is_truthy(&value.to_ascii_lowercase());
    }
}

/// First variable in `vars` that is set and non-empty.
pub fn first_set_with<F>(vars: &[&str], env_get: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    vars.iter()
        .filter_map(|var| env_get(var))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// Parse `var` into `T`, leaving `target` untouched when the variable is
/// absent. Unparseable values are reported and ignored.
pub fn override_parsed_with<T, F>(target: &mut T, var: &str, env_get: &F)
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    override_parsed_any_with(target, &[var], env_get);
}

pub fn override_parsed_any_with<T, F>(target: &mut T, vars: &[&str], env_get: &F)
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    for var in vars {
        let Some(raw) = env_get(var) else {
            continue;
        };
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        match raw.parse::<T>() {
            Ok(value) => {
                *target = value;
                return;
            }
            Err(_) => {
                tracing::warn!(var = %var, value = %raw, "ignoring unparseable environment value");
            }
        }
    }
}

pub fn override_string_with<F>(target: &mut String, var: &str, env_get: &F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = first_set_with(&[var], env_get) {
        *target = value;
    }
}

pub fn process_env(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn getter(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn truthy_parser_matches_expected_values() {
        assert!(is_truthy("1"));
        assert!(is_truthy("true"));
        assert!(is_truthy("yes"));
        assert!(is_truthy("on"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("false"));
        assert!(!is_truthy("off"));
    }

    #[test]
    fn bool_override_only_when_set() {
        let mut pull = true;
        override_bool_with(&mut pull, "ENGINECARE_PULL_IMAGE", &getter(&[]));
        assert!(pull);
        override_bool_with(
            &mut pull,
            "ENGINECARE_PULL_IMAGE",
            &getter(&[("ENGINECARE_PULL_IMAGE", "off")]),
        );
        assert!(!pull);
        override_bool_with(
            &mut pull,
            "ENGINECARE_PULL_IMAGE",
            &getter(&[("ENGINECARE_PULL_IMAGE", "TRUE")]),
        );
        assert!(pull);
    }

    #[test]
    fn first_set_skips_blank_values() {
        let env = getter(&[("PORT", "  "), ("ENGINECARE_PORT", "9000")]);
        assert_eq!(
            first_set_with(&["PORT", "ENGINECARE_PORT"], &env).as_deref(),
            Some("9000")
        );
    }

    #[test]
    fn unparseable_override_keeps_previous_value() {
        let env = getter(&[("ENGINECARE_HEALTH_ATTEMPTS", "lots")]);
        let mut attempts = 30u32;
        override_parsed_with(&mut attempts, "ENGINECARE_HEALTH_ATTEMPTS", &env);
        assert_eq!(attempts, 30);
    }

    #[test]
    fn parsed_override_applies_first_valid_var() {
        let env = getter(&[("PORT", "nope"), ("ENGINECARE_PORT", "8100")]);
        let mut port = 8000u16;
        override_parsed_any_with(&mut port, &["PORT", "ENGINECARE_PORT"], &env);
        assert_eq!(port, 8100);
    }
}
