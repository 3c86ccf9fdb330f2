/// Masks an API key for logging per the gateway's key-sanitization rule:
/// `len <= 5` => `***` + last 2 chars; `len <= 10` => first 3 + `***` + last 3;
/// otherwise first 3 + `***` + last 7.
pub fn sanitize_api_key(key: &str) -> String {
    let len = key.chars().count();
    if len == 0 {
        return "***".to_string();
    }
    if len <= 5 {
        let tail = last_n_chars(key, 2);
        return format!("***{tail}");
    }
    if len <= 10 {
        let head = first_n_chars(key, 3);
        let tail = last_n_chars(key, 3);
        return format!("{head}***{tail}");
    }
    let head = first_n_chars(key, 3);
    let tail = last_n_chars(key, 7);
    format!("{head}***{tail}")
}

fn first_n_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn last_n_chars(s: &str, n: usize) -> String {
    let total = s.chars().count();
    let skip = total.saturating_sub(n);
    s.chars().skip(skip).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_key_keeps_only_last_two() {
        assert_eq!(sanitize_api_key("ab"), "***ab");
        assert_eq!(sanitize_api_key("abcde"), "***de");
    }

    #[test]
    fn medium_key_keeps_first_three_last_three() {
        assert_eq!(sanitize_api_key("abcdef"), "abc***def");
        assert_eq!(sanitize_api_key("abcdefghij"), "abc***hij");
    }

    #[test]
    fn long_key_keeps_first_three_last_seven() {
        let key = "sk-ant-REDACTED";
        let sanitized = sanitize_api_key(key);
        assert!(sanitized.starts_with("sk-***"));
        assert!(sanitized.ends_with("tuvwxyz"));
        assert!(!sanitized.contains(key));
    }

    #[test]
    fn never_contains_the_full_key_when_long_enough() {
        for key in [
            "0123456",
            "0123456789ab",
            "this-is-a-fairly-long-fake-api-key-value",
        ] {
            assert!(key.chars().count() > 5);
            let sanitized = sanitize_api_key(key);
            assert!(!sanitized.contains(key));
        }
    }
}
