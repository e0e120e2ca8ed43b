//! Branch names derived from free-text descriptions.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{FlowError, Result};

/// Longest slug kept after the prefix.
const MAX_SLUG_LEN: usize = 48;

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("separator pattern compiles"));

/// Lowercase `text` and join its alphanumeric runs with `-`.
pub fn slugify(text: &str) -> String {
    let lower = text.to_lowercase();
    let joined = SEPARATORS.replace_all(&lower, "-");
    let mut slug = joined.trim_matches('-').to_string();
    if slug.len() > MAX_SLUG_LEN {
        // ASCII only after replacement, so byte slicing is safe.
        slug.truncate(MAX_SLUG_LEN);
        slug = match slug.rfind('-') {
            Some(cut) if cut > MAX_SLUG_LEN / 2 => slug[..cut].to_string(),
            _ => slug,
        };
    }
    slug.trim_matches('-').to_string()
}

/// `prefix` followed by the slug of `description`.
pub fn branch_name(prefix: &str, description: &str) -> Result<String> {
    let slug = slugify(description);
    if slug.is_empty() {
        return Err(FlowError::InvalidParameter {
            field: "description".to_string(),
            reason: "needs at least one letter or digit".to_string(),
        });
    }
    Ok(format!("{prefix}{slug}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs() {
        assert_eq!(slugify("Add login"), "add-login");
        assert_eq!(slugify("  Fix: crash on   startup!! "), "fix-crash-on-startup");
        assert_eq!(slugify("Ünïcode stays out"), "n-code-stays-out");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn long_descriptions_cut_at_a_word() {
        let slug = slugify(
            "make the session store survive concurrent writers without losing any updates",
        );
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
        assert!(slug.starts_with("make-the-session-store"));
    }

    #[test]
    fn branch_names_take_the_prefix() {
        assert_eq!(branch_name("feature/", "Add login").unwrap(), "feature/add-login");
        assert_eq!(branch_name("hotfix/", "prod down").unwrap(), "hotfix/prod-down");
        assert!(matches!(
            branch_name("feature/", "!!!"),
            Err(FlowError::InvalidParameter { .. })
        ));
    }
}
