//! GitHub search conditions for a sync pass

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::config::SearchConfig;

/// Build the search string for one pass
///
/// Negating `closed:<threshold` keeps everything that is open plus anything
/// closed within the window. Incremental passes add an `updated:>=` bound.
pub fn conditions(
    search: &SearchConfig,
    today: NaiveDate,
    updated_since: Option<DateTime<Utc>>,
) -> String {
    let threshold = today - Duration::days(search.closed_window_days);
    let mut query = format!(
        "{} -closed:<{}",
        search.conditions.trim(),
        threshold.format("%Y-%m-%d")
    );

    if let Some(since) = updated_since {
        query.push_str(&format!(" updated:>={}", since.format("%Y-%m-%dT%H:%M:%SZ")));
    }

    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn search() -> SearchConfig {
        SearchConfig {
            conditions: "org:SciTools -repo:SciTools/cartopy ".to_string(),
            closed_window_days: 28,
        }
    }

    #[test]
    fn test_full_pass_conditions() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 29).unwrap();
        assert_eq!(
            conditions(&search(), today, None),
            "org:SciTools -repo:SciTools/cartopy -closed:<2024-03-01"
        );
    }

    #[test]
    fn test_incremental_pass_conditions() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 29).unwrap();
        let since = Utc.with_ymd_and_hms(2024, 3, 29, 14, 5, 9).unwrap();
        assert_eq!(
            conditions(&search(), today, Some(since)),
            "org:SciTools -repo:SciTools/cartopy -closed:<2024-03-01 \
             updated:>=2024-03-29T14:05:09Z"
        );
    }
}
