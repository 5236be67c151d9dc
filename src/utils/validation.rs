use crate::core::query::ENTITY_TOKEN;
use crate::utils::error::{LookupError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field_name: &str, value: impl ToString, reason: impl Into<String>) -> LookupError {
    LookupError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(invalid(field_name, url_str, "URL cannot be empty"));
    }

    let url = Url::parse(url_str)
        .map_err(|e| invalid(field_name, url_str, format!("Invalid URL format: {}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(invalid(
            field_name,
            url_str,
            format!("Unsupported URL scheme: {}", scheme),
        )),
    }
}

/// A spreadsheet URL must carry its id as `/spreadsheets/d/<id>`.
pub fn validate_sheet_url(field_name: &str, url_str: &str) -> Result<()> {
    validate_url(field_name, url_str)?;

    let url = Url::parse(url_str)
        .map_err(|e| invalid(field_name, url_str, format!("Invalid URL format: {}", e)))?;
    let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
    let has_id = segments
        .windows(3)
        .any(|w| w[0] == "spreadsheets" && w[1] == "d" && !w[2].is_empty());

    if has_id {
        Ok(())
    } else {
        Err(invalid(
            field_name,
            url_str,
            "Expected a Google Sheets URL containing /spreadsheets/d/<id>",
        ))
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(invalid(field_name, path, "Path cannot be empty"));
    }

    if path.contains('\0') {
        return Err(invalid(field_name, path, "Path contains null bytes"));
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(invalid(
            field_name,
            value,
            format!("Value must be at least {}", min_value),
        ));
    }
    Ok(())
}

pub fn validate_query_template(field_name: &str, template: &str) -> Result<()> {
    if !template.contains(ENTITY_TOKEN) {
        return Err(invalid(
            field_name,
            template,
            format!("Template must contain the {} placeholder", ENTITY_TOKEN),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("search.endpoint", "https://example.com").is_ok());
        assert!(validate_url("search.endpoint", "http://example.com").is_ok());
        assert!(validate_url("search.endpoint", "").is_err());
        assert!(validate_url("search.endpoint", "invalid-url").is_err());
        assert!(validate_url("search.endpoint", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_sheet_url() {
        assert!(validate_sheet_url(
            "sheet_url",
            "https://docs.google.com/spreadsheets/d/1AbC_d-2/edit#gid=0"
        )
        .is_ok());
        assert!(validate_sheet_url("sheet_url", "https://docs.google.com/spreadsheets/").is_err());
        assert!(validate_sheet_url("sheet_url", "https://example.com/not-a-sheet").is_err());
        assert!(validate_sheet_url("sheet_url", "spreadsheets/d/abc").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("concurrent_requests", 5, 1).is_ok());
        assert!(validate_positive_number("concurrent_requests", 0, 1).is_err());
    }

    #[test]
    fn test_validate_query_template() {
        assert!(validate_query_template("template", "Email of {entity}").is_ok());
        let err = validate_query_template("template", "Email of").unwrap_err();
        assert!(matches!(err, LookupError::InvalidConfigValueError { ref field, .. } if field == "template"));
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("output_path", "./output").is_ok());
        assert!(validate_path("output_path", "").is_err());
        assert!(validate_path("output_path", "out\0put").is_err());
    }
}
