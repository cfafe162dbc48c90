//! Whitelist-aware query canonicalization.
//!
//! Only the first two `key=value` pairs of a query string are ever looked
//! at; anything after the second `&` never reaches the cache key.

/// Reduce `raw_query` to its whitelisted pairs.
///
/// Returns `None` when the query should not influence the cache key at all:
/// no whitelist is configured, or none of the inspected keys are listed.
pub fn filter_query(raw_query: &str, whitelist: &[String]) -> Option<String> {
    if whitelist.is_empty() {
        return None;
    }

    let mut pairs = raw_query.split('&');
    let first = pairs.next().map(QueryPair::parse)?;
    let second = pairs.next().map(QueryPair::parse);

    let kept: Vec<String> = std::iter::once(first)
        .chain(second)
        .filter(|pair| pair.is_listed(whitelist))
        .map(|pair| pair.to_string())
        .collect();

    if kept.is_empty() {
        None
    } else {
        Some(kept.join("&"))
    }
}

struct QueryPair<'a> {
    key: &'a str,
    value: &'a str,
}

impl<'a> QueryPair<'a> {
    fn parse(raw: &'a str) -> Self {
        match raw.split_once('=') {
            Some((key, value)) => Self { key, value },
            None => Self {
                key: raw,
                value: "",
            },
        }
    }

    fn is_listed(&self, whitelist: &[String]) -> bool {
        whitelist.iter().any(|name| name == self.key)
    }
}

impl std::fmt::Display for QueryPair<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn no_whitelist_means_no_filtering() {
        assert_eq!(filter_query("color=red", &[]), None);
        assert_eq!(filter_query("color=red&size=10", &[]), None);
    }

    #[test]
    fn single_listed_pair_is_kept_verbatim() {
        assert_eq!(
            filter_query("color=red", &list(&["color"])),
            Some("color=red".to_string())
        );
    }

    #[test]
    fn single_unlisted_pair_is_dropped() {
        assert_eq!(filter_query("utm_source=mail", &list(&["color"])), None);
    }

    #[test]
    fn two_pairs_keep_listed_in_order() {
        let query = "color=red&size=10";
        assert_eq!(
            filter_query(query, &list(&["color"])),
            Some("color=red".to_string())
        );
        assert_eq!(
            filter_query(query, &list(&["size"])),
            Some("size=10".to_string())
        );
        assert_eq!(
            filter_query(query, &list(&["size", "color"])),
            Some("color=red&size=10".to_string())
        );
        assert_eq!(filter_query(query, &list(&["page"])), None);
    }

    #[test]
    fn parameters_after_the_second_are_ignored() {
        // `page` is listed but sits third, so it never contributes.
        let query = "utm=1&color=red&page=2";
        assert_eq!(
            filter_query(query, &list(&["color", "page"])),
            Some("color=red".to_string())
        );
        assert_eq!(filter_query("a=1&b=2&page=2", &list(&["page"])), None);
    }

    #[test]
    fn pair_without_value_gets_empty_value() {
        assert_eq!(
            filter_query("sale", &list(&["sale"])),
            Some("sale=".to_string())
        );
    }

    #[test]
    fn empty_query_is_not_filtered() {
        assert_eq!(filter_query("", &list(&["color"])), None);
    }
}
