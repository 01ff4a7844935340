use crate::form::ParsedItem;

/// Append `new_items` to `existing`, skipping any whose id and hint are
/// already present. Returns the merged list and how many items were added.
pub fn merge_credential_items(existing: &[ParsedItem], new_items: &[ParsedItem]) -> (Vec<ParsedItem>, usize) {
    let mut merged = existing.to_vec();
    let mut added = 0;
    for candidate in new_items {
        let duplicated = merged
            .iter()
            .any(|item| item.id == candidate.id && item.hint == candidate.hint);
        if !duplicated {
            merged.push(candidate.clone());
            added += 1;
        }
    }
    (merged, added)
}
