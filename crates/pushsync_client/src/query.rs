//! Query string parsing.

/// Decodes a query string into name/value pairs, in order of appearance.
///
/// `+` decodes to a space. A segment without `=` yields an empty value and
/// empty segments are skipped. Invalid percent escapes are decoded lossily.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once('=') {
            Some((name, value)) => (decode(name), decode(value)),
            None => (decode(segment), String::new()),
        })
        .collect()
}

fn decode(component: &str) -> String {
    let spaced = component.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pairs_in_order() {
        assert_eq!(
            parse_query("b=2&a=1&b=1"),
            vec![
                ("b".to_string(), "2".to_string()),
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn decodes_components() {
        assert_eq!(
            parse_query("q=hello+world&x%5B0%5D=%C3%A9"),
            vec![
                ("q".to_string(), "hello world".to_string()),
                ("x[0]".to_string(), "é".to_string()),
            ]
        );
    }

    #[test]
    fn handles_bare_names_and_empty_segments() {
        assert_eq!(
            parse_query("&flag&&k="),
            vec![
                ("flag".to_string(), String::new()),
                ("k".to_string(), String::new()),
            ]
        );
        assert!(parse_query("").is_empty());
    }
}
