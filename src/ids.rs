use std::cmp::Ordering;

use crate::error::{Error, Result};

const ACCOUNT_PREFIX: &str = "act_";

/// Normalize an ad account identifier to its bare numeric form.
///
/// Accepts `123`, `act_123`, or a Business Manager URL carrying
/// `act=123` in its query string.
pub fn normalize_account_id(input: &str) -> Result<String> {
    let input = input.trim();

    if input.starts_with("http://") || input.starts_with("https://") {
        let url = url::Url::parse(input).map_err(|e| Error::InvalidInput(e.to_string()))?;
        return url
            .query_pairs()
            .find(|(k, _)| k == "act")
            .map(|(_, v)| v.into_owned())
            .filter(|v| is_numeric_id(v))
            .ok_or_else(|| Error::InvalidInput(format!("no ad account id in URL: {input}")));
    }

    let bare = input.strip_prefix(ACCOUNT_PREFIX).unwrap_or(input);
    if is_numeric_id(bare) {
        Ok(bare.to_string())
    } else {
        Err(Error::InvalidInput(format!("invalid ad account id: {input}")))
    }
}

/// Graph path segment for an ad account (`act_<id>`).
pub fn account_node(account_id: &str) -> String {
    if account_id.starts_with(ACCOUNT_PREFIX) {
        account_id.to_string()
    } else {
        format!("{ACCOUNT_PREFIX}{account_id}")
    }
}

pub fn is_numeric_id(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// Stable ascending order for upstream identifiers.
///
/// Purely numeric ids compare numerically (shorter is smaller, then
/// lexicographic), anything else compares lexicographically. Numeric ids
/// sort before non-numeric ones.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    match (is_numeric_id(a), is_numeric_id(b)) {
        (true, true) => {
            let a = a.trim_start_matches('0');
            let b = b.trim_start_matches('0');
            a.len().cmp(&b.len()).then_with(|| a.cmp(b))
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_account_id() {
        assert_eq!(normalize_account_id("123").unwrap(), "123");
        assert_eq!(normalize_account_id("act_123").unwrap(), "123");
        assert_eq!(
            normalize_account_id("https://business.facebook.com/adsmanager/manage/campaigns?act=987&nav=1")
                .unwrap(),
            "987"
        );
        assert!(normalize_account_id("act_").is_err());
        assert!(normalize_account_id("abc").is_err());
        assert!(normalize_account_id("https://example.com/?foo=1").is_err());
    }

    #[test]
    fn test_account_node() {
        assert_eq!(account_node("123"), "act_123");
        assert_eq!(account_node("act_123"), "act_123");
    }

    #[test]
    fn test_compare_ids_numeric() {
        assert_eq!(compare_ids("9", "10"), Ordering::Less);
        assert_eq!(compare_ids("120", "12"), Ordering::Greater);
        assert_eq!(compare_ids("007", "7"), Ordering::Equal);
    }

    #[test]
    fn test_compare_ids_mixed() {
        assert_eq!(compare_ids("999", "abc"), Ordering::Less);
        assert_eq!(compare_ids("abc", "abd"), Ordering::Less);
    }
}
