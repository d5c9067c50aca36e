//! Compiled pattern cache
//!
//! Screening and evaluation both go through here, so a pattern is compiled
//! at most once per process.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::RwLock;

static PATTERN_CACHE: Lazy<RwLock<HashMap<String, Regex>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Compile a pattern, reusing a cached instance when one exists.
/// A syntax error is returned as-is; nothing is cached for it.
pub fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    if let Some(existing) = PATTERN_CACHE
        .read()
        .ok()
        .and_then(|guard| guard.get(pattern).cloned())
    {
        return Ok(existing);
    }

    let compiled = Regex::new(pattern)?;
    if let Ok(mut guard) = PATTERN_CACHE.write() {
        guard
            .entry(pattern.to_string())
            .or_insert_with(|| compiled.clone());
    }

    Ok(compiled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_caches() {
        let first = compile(r"validate\w+").unwrap();
        let second = compile(r"validate\w+").unwrap();
        assert_eq!(first.as_str(), second.as_str());
    }

    #[test]
    fn test_syntax_error_not_cached() {
        assert!(compile(r"(unclosed").is_err());
        assert!(compile(r"(unclosed").is_err());
    }
}
