//! Variable interpolation for command-line words.

use crate::error::ExpandError;
use regex::Regex;
use std::sync::OnceLock;

fn var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^${}]+)\}").expect("variable pattern is valid"))
}

/// Replace every `${NAME}` reference in `s` with the value returned by `lookup`.
///
/// Only the braced form is recognized; a bare `$NAME` is left alone. Substituted
/// text is never rescanned. A reference to a name that `lookup` does not know is
/// an error rather than an empty expansion.
///
/// # Examples
///
/// ```
/// let lookup = |name: &str| (name == "A").then(|| "1".to_string());
/// assert_eq!(cmdtest::expand_variables("x${A}y", lookup).unwrap(), "x1y");
/// assert!(cmdtest::expand_variables("${B}", lookup).is_err());
/// ```
pub fn expand_variables<F>(s: &str, lookup: F) -> Result<String, ExpandError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(caps) = var_regex().captures(rest) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let value = lookup(name.as_str()).ok_or_else(|| ExpandError::Undefined {
            name: name.as_str().to_string(),
        })?;
        result.push_str(&rest[..whole.start()]);
        result.push_str(&value);
        rest = &rest[whole.end()..];
    }
    result.push_str(rest);
    Ok(result)
}

/// Look a variable up in the process environment.
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "A" => Some("1".to_string()),
            "B_C" => Some("234".to_string()),
            "DOLLAR" => Some("${A}".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_expand_variables() {
        for (input, want) in [
            ("", ""),
            ("no vars here", "no vars here"),
            ("${A}", "1"),
            ("${A}${B_C}", "1234"),
            (" x${A}y  ${B_C}z ", " x1y  234z "),
            (" ${A${B_C}", " ${A234"),
            ("$A", "$A"),
        ] {
            assert_eq!(expand_variables(input, lookup).unwrap(), want, "{input:?}");
        }
    }

    #[test]
    fn test_expand_does_not_rescan_values() {
        assert_eq!(expand_variables("${DOLLAR}", lookup).unwrap(), "${A}");
    }

    #[test]
    fn test_expand_undefined_variable() {
        let err = expand_variables("x${C}y", lookup).unwrap_err();
        assert!(err.to_string().contains("\"C\""), "{err}");
    }

    #[test]
    fn test_expand_leaves_no_references_when_all_defined() {
        let out = expand_variables("${A}/${B_C}/${A}", lookup).unwrap();
        assert!(!var_regex().is_match(&out));
        assert_eq!(out, "1/234/1");
    }

    #[test]
    fn test_env_lookup() {
        assert!(env_lookup("CMDTEST_SURELY_UNDEFINED_VARIABLE").is_none());
        assert!(env_lookup("PATH").is_some());
    }
}
