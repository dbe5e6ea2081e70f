//! Nearest stored ZIPs by numeric distance.
//!
//! ZIP codes are compared as integers, so "nearby" only means close in the
//! numbering scheme. Adjacent numbers are usually but not always neighbours.

pub const DEFAULT_NEARBY_COUNT: usize = 3;

fn as_number(zip: &str) -> Option<u64> {
    if zip.is_empty() || !zip.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    zip.parse().ok()
}

/// Up to `k` entries of `known` closest to `target`, nearest first.
///
/// Equal distances keep their order in `known`. The target itself is never
/// returned. A non-numeric target yields nothing; non-numeric entries of
/// `known` are skipped.
pub fn find_nearby_zips<S: AsRef<str>>(target: &str, known: &[S], k: usize) -> Vec<String> {
    let Some(target_num) = as_number(target) else {
        return vec![];
    };

    let mut candidates: Vec<(u64, &str)> = known
        .iter()
        .map(AsRef::as_ref)
        .filter(|zip| *zip != target)
        .filter_map(|zip| as_number(zip).map(|n| (n.abs_diff(target_num), zip)))
        .collect();
    // Stable sort keeps list order for ties
    candidates.sort_by_key(|(distance, _)| *distance);

    candidates
        .into_iter()
        .take(k)
        .map(|(_, zip)| zip.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_first() {
        let known = ["02130", "02135", "02215", "02134"];
        assert_eq!(find_nearby_zips("02134", &known, 2), vec!["02135", "02130"]);
    }

    #[test]
    fn test_ties_keep_list_order() {
        let known = ["10003", "09999", "10001", "09997"];
        assert_eq!(
            find_nearby_zips("10000", &known, 3),
            vec!["09999", "10001", "10003"]
        );
    }

    #[test]
    fn test_non_numeric_target() {
        let known = ["10001", "10002"];
        assert!(find_nearby_zips("ABCDE", &known, 3).is_empty());
        assert!(find_nearby_zips("", &known, 3).is_empty());
        assert!(find_nearby_zips("+1000", &known, 3).is_empty());
    }

    #[test]
    fn test_non_numeric_entries_skipped() {
        let known = vec!["1000A".to_string(), "10005".to_string(), "".to_string()];
        assert_eq!(find_nearby_zips("10001", &known, 3), vec!["10005"]);
    }

    #[test]
    fn test_k_bounds() {
        let known = ["10001", "10002", "10003"];
        assert!(find_nearby_zips("10000", &known, 0).is_empty());
        assert_eq!(find_nearby_zips("10000", &known, 10).len(), 3);
    }
}
