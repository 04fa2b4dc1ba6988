use std::{collections::HashMap, sync::OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// ShortLink is the record stored for each slug.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ShortLink {
    pub url: String,   // the destination, an absolute URL
    pub enabled: bool, // disabled links never redirect
    pub usages: u64,   // incremented once per resolved redirect
}

impl ShortLink {
    pub fn new(url: &str, enabled: bool) -> Self {
        Self {
            url: url.to_string(),
            enabled,
            usages: 0,
        }
    }
}

impl std::fmt::Display for ShortLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "-> {}", self.url)?;
        if !self.enabled {
            write!(f, " (disabled)")?;
        }
        write!(f, " [usages: {}]", self.usages)?;
        Ok(())
    }
}

/// One exported record line, the slug joined back onto its document.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LinkExport {
    pub slug: String,
    pub url: String,
    pub enabled: bool,
    pub usages: u64,
}

/// Raw field values from the "new short-link" form, echoed back on
/// validation failure so the form re-renders with prior input.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct FormValues {
    pub slug: String,
    pub url: String,
}

/// Per-field validation messages. A `None` field passed.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct FormErrors {
    pub slug: Option<String>,
    pub url: Option<String>,
}

/// Outcome of validating a create submission. Callers branch on the
/// variant instead of catching anything.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Validated {
    Valid(FormValues),
    Invalid { errors: FormErrors, values: FormValues },
}

static SLUG_PATTERN: OnceLock<Regex> = OnceLock::new();

fn slug_pattern() -> &'static Regex {
    SLUG_PATTERN.get_or_init(|| Regex::new("^[a-z0-9-]+$").unwrap())
}

fn field(form: &HashMap<String, String>, key: &str) -> String {
    form.get(key).cloned().unwrap_or_default()
}

/// Validates the submitted `slug` and `url` fields. Errors accumulate
/// independently per field; the raw values come back either way.
pub fn validate_form(form: &HashMap<String, String>) -> Validated {
    let mut errors = FormErrors::default();

    let slug = field(form, "slug");
    if slug.is_empty() {
        errors.slug = Some("This field is required".to_string());
    } else if !slug_pattern().is_match(&slug) {
        errors.slug = Some("Can only contain lowercase alphanumeric characters and dashes".to_string());
    }

    let url = field(form, "url");
    if url.is_empty() {
        errors.url = Some("This field is required".to_string());
    } else if url::Url::parse(&url).is_err() {
        errors.url = Some("Invalid URL".to_string());
    }

    let values = FormValues { slug, url };
    if errors == FormErrors::default() {
        Validated::Valid(values)
    } else {
        Validated::Invalid { errors, values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(slug: Option<&str>, url: Option<&str>) -> HashMap<String, String> {
        let mut form = HashMap::new();
        if let Some(slug) = slug {
            form.insert("slug".to_string(), slug.to_string());
        }
        if let Some(url) = url {
            form.insert("url".to_string(), url.to_string());
        }
        form
    }

    #[test]
    fn test_valid_submission() {
        let result = validate_form(&form(Some("my-link-1"), Some("https://example.com/path")));
        assert_eq!(
            result,
            Validated::Valid(FormValues {
                slug: "my-link-1".to_string(),
                url: "https://example.com/path".to_string(),
            })
        );
    }

    #[test]
    fn test_slug_character_class() {
        let result = validate_form(&form(Some("My_Link!"), Some("https://example.com")));
        match result {
            Validated::Invalid { errors, values } => {
                assert_eq!(
                    errors.slug.as_deref(),
                    Some("Can only contain lowercase alphanumeric characters and dashes")
                );
                assert!(errors.url.is_none());
                assert_eq!(values.slug, "My_Link!");
            }
            Validated::Valid(_) => panic!("uppercase slug accepted"),
        }
    }

    #[test]
    fn test_invalid_url() {
        let result = validate_form(&form(Some("promo"), Some("not-a-url")));
        match result {
            Validated::Invalid { errors, .. } => {
                assert!(errors.slug.is_none());
                assert_eq!(errors.url.as_deref(), Some("Invalid URL"));
            }
            Validated::Valid(_) => panic!("relative url accepted"),
        }
    }

    #[test]
    fn test_missing_fields_accumulate() {
        let result = validate_form(&form(None, None));
        match result {
            Validated::Invalid { errors, values } => {
                assert_eq!(errors.slug.as_deref(), Some("This field is required"));
                assert_eq!(errors.url.as_deref(), Some("This field is required"));
                assert_eq!(values, FormValues::default());
            }
            Validated::Valid(_) => panic!("empty form accepted"),
        }
    }

    #[test]
    fn test_empty_string_is_missing() {
        let result = validate_form(&form(Some(""), Some("https://example.com")));
        match result {
            Validated::Invalid { errors, .. } => {
                assert_eq!(errors.slug.as_deref(), Some("This field is required"));
            }
            Validated::Valid(_) => panic!("empty slug accepted"),
        }
    }

    #[test]
    fn test_values_echoed_on_failure() {
        let result = validate_form(&form(Some("Bad Slug"), Some("still not a url")));
        match result {
            Validated::Invalid { values, .. } => {
                assert_eq!(values.slug, "Bad Slug");
                assert_eq!(values.url, "still not a url");
            }
            Validated::Valid(_) => panic!("garbage accepted"),
        }
    }

    #[test]
    fn test_display() {
        let link = ShortLink {
            url: "https://example.com".to_string(),
            enabled: false,
            usages: 3,
        };
        assert_eq!(format!("{}", link), "-> https://example.com (disabled) [usages: 3]");
    }
}
