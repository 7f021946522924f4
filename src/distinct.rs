use std::collections::BTreeMap;

/// Builds a key-to-value map keeping only keys whose value is consistent
/// across every occurrence. A key observed with two different values is
/// dropped entirely.
pub(crate) fn map_distinct<I>(pairs: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut seen: BTreeMap<String, Option<String>> = BTreeMap::new();
    for (key, value) in pairs {
        match seen.get_mut(&key) {
            Some(slot) => {
                if slot.as_deref() != Some(value.as_str()) {
                    *slot = None; // Conflicted, removed in the second pass.
                }
            }
            None => {
                seen.insert(key, Some(value));
            }
        }
    }
    seen.into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(input: &[(&str, &str)]) -> Vec<(String, String)> {
        input
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn keeps_unambiguous_names() {
        let distinct = map_distinct(pairs(&[
            ("a.txt", "/x/a.txt"),
            ("b.txt", "/x/b.txt"),
        ]));
        assert_eq!(distinct.get("a.txt").map(String::as_str), Some("/x/a.txt"));
        assert_eq!(distinct.get("b.txt").map(String::as_str), Some("/x/b.txt"));
    }

    #[test]
    fn drops_names_with_conflicting_values() {
        let distinct = map_distinct(pairs(&[
            ("a.txt", "/x/a.txt"),
            ("a.txt", "/y/a.txt"),
            ("b.txt", "/x/b.txt"),
        ]));
        assert!(!distinct.contains_key("a.txt"));
        assert_eq!(distinct.len(), 1);
    }

    #[test]
    fn repeated_identical_values_stay() {
        let distinct = map_distinct(pairs(&[
            ("a.txt", "/x/a.txt"),
            ("a.txt", "/x/a.txt"),
        ]));
        assert_eq!(distinct.get("a.txt").map(String::as_str), Some("/x/a.txt"));
    }

    #[test]
    fn conflicted_key_is_not_revived_by_a_later_match() {
        let distinct = map_distinct(pairs(&[
            ("a.txt", "/x/a.txt"),
            ("a.txt", "/y/a.txt"),
            ("a.txt", "/x/a.txt"),
        ]));
        assert!(distinct.is_empty());
    }

    #[test]
    fn empty_input_yields_empty_map() {
        assert!(map_distinct(Vec::new()).is_empty());
    }
}
