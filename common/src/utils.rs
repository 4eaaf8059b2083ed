pub fn validate_url(url: &str) -> Result<(), String> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err("URL must start with http:// or https://".to_string())
    }
}

/// Last path segment of a URL, without query string or fragment.
pub fn image_name_from_url(url: &str) -> String {
    let path = url
        .split(|c| c == '?' || c == '#')
        .next()
        .unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
        .to_string()
}

/// Lowercase with surrounding whitespace removed. Crop labels are keyed this way.
pub fn canonical_label(label: &str) -> String {
    label.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_name_from_url() {
        assert_eq!(
            image_name_from_url("https://cdn.example.com/pots/a1/soil_01.jpg?token=abc"),
            "soil_01.jpg"
        );
        assert_eq!(image_name_from_url("https://example.com/img.png#frag"), "img.png");
        assert_eq!(image_name_from_url("plain.jpg"), "plain.jpg");
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com/a.jpg").is_ok());
        assert!(validate_url("http://localhost/a.jpg").is_ok());
        assert!(validate_url("ftp://example.com/a.jpg").is_err());
        assert!(validate_url("/tmp/a.jpg").is_err());
    }
}
