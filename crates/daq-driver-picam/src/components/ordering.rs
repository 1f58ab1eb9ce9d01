//! Priority ordering and exclusion of descriptor lists.

use daq_core::parameter::ParamDescriptor;

/// Stable sort: titles found in `priority` first, in `priority` order, then the
/// rest in their original relative order.
pub fn sort_by_priority(mut values: Vec<ParamDescriptor>, priority: &[String]) -> Vec<ParamDescriptor> {
    values.sort_by_key(|d| match priority.iter().position(|p| *p == d.title) {
        Some(index) => (0, index),
        None => (1, 0),
    });
    values
}

/// Drop every descriptor whose title is in `remove`; order of the rest is kept.
pub fn remove_settings(values: Vec<ParamDescriptor>, remove: &[String]) -> Vec<ParamDescriptor> {
    values
        .into_iter()
        .filter(|d| !remove.contains(&d.title))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(titles: &[&str]) -> Vec<ParamDescriptor> {
        titles
            .iter()
            .map(|t| ParamDescriptor::boolean(*t, false))
            .collect()
    }

    fn titles(values: &[ParamDescriptor]) -> Vec<&str> {
        values.iter().map(|d| d.title.as_str()).collect()
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn listed_titles_come_first_in_priority_order() {
        let sorted = sort_by_priority(list(&["A", "B", "C"]), &strings(&["B", "A"]));
        assert_eq!(titles(&sorted), vec!["B", "A", "C"]);
    }

    #[test]
    fn unlisted_titles_keep_relative_order() {
        let sorted = sort_by_priority(
            list(&["Z", "Exposure Time", "Y", "X", "ROIs"]),
            &strings(&["Exposure Time", "ADC Speed", "ROIs"]),
        );
        assert_eq!(
            titles(&sorted),
            vec!["Exposure Time", "ROIs", "Z", "Y", "X"]
        );
    }

    #[test]
    fn long_priority_lists_still_lead() {
        let sorted = sort_by_priority(list(&["A", "B"]), &strings(&["X", "Y", "B"]));
        assert_eq!(titles(&sorted), vec!["B", "A"]);
    }

    #[test]
    fn remove_drops_exactly_the_named_entries() {
        let kept = remove_settings(list(&["A", "B", "C"]), &strings(&["B"]));
        assert_eq!(titles(&kept), vec!["A", "C"]);
        let untouched = remove_settings(list(&["A", "C"]), &strings(&["Q"]));
        assert_eq!(titles(&untouched), vec!["A", "C"]);
    }
}
