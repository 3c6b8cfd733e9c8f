use std::collections::{BTreeSet, HashMap};

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use log::debug;

use crate::playlist::Playlist;

/// Which days a schedule rule applies to. Weekdays count from Monday = 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaySelector {
    Days(BTreeSet<u8>),
    Date(NaiveDate),
}

/// One time-window-to-playlist mapping. Rules are evaluated in declaration
/// order; the first match wins, with no specificity ranking between date and
/// weekday selectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRule {
    pub selector: DaySelector,
    pub hours: BTreeSet<u8>,
    pub playlist: String,
}

impl ScheduleRule {
    pub fn matches(&self, now: NaiveDateTime) -> bool {
        if !self.hours.contains(&(now.hour() as u8)) {
            return false;
        }
        match &self.selector {
            DaySelector::Date(date) => *date == now.date(),
            DaySelector::Days(days) => {
                days.contains(&(now.weekday().num_days_from_monday() as u8))
            }
        }
    }
}

/// Resolve the playlist that should be active at `now`.
///
/// Every rule's playlist reference is validated at configuration load, so a
/// matching rule always resolves; the default (when configured) covers the
/// hours no rule claims.
pub fn resolve<'a>(
    now: NaiveDateTime,
    rules: &[ScheduleRule],
    playlists: &'a HashMap<String, Playlist>,
    default_name: Option<&str>,
) -> Option<&'a Playlist> {
    for rule in rules {
        if rule.matches(now) {
            debug!("schedule rule for playlist '{}' matches {now}", rule.playlist);
            return playlists.get(&rule.playlist);
        }
    }
    default_name.and_then(|name| playlists.get(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn days(values: &[u8]) -> DaySelector {
        DaySelector::Days(values.iter().copied().collect())
    }

    fn hours(values: &[u8]) -> BTreeSet<u8> {
        values.iter().copied().collect()
    }

    fn rule(selector: DaySelector, hrs: &[u8], playlist: &str) -> ScheduleRule {
        ScheduleRule {
            selector,
            hours: hours(hrs),
            playlist: playlist.to_string(),
        }
    }

    fn playlists(names: &[&str]) -> HashMap<String, Playlist> {
        names
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    Playlist::from_tracks(*name, vec![format!("{name}.mp3").into()]),
                )
            })
            .collect()
    }

    fn at(date: (i32, u32, u32), hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn weekday_rules_pick_the_window_for_the_hour() {
        let rules = vec![
            rule(days(&[0, 1, 2, 3, 4]), &[7, 8, 9, 10, 11], "morning"),
            rule(days(&[0, 1, 2, 3, 4]), &[12, 13, 14, 15, 16, 17], "afternoon"),
        ];
        let lists = playlists(&["morning", "afternoon", "default"]);

        // 2025-07-09 is a Wednesday.
        let resolved = resolve(at((2025, 7, 9), 9), &rules, &lists, Some("default"));
        assert_eq!(resolved.unwrap().name, "morning");

        let resolved = resolve(at((2025, 7, 9), 15), &rules, &lists, Some("default"));
        assert_eq!(resolved.unwrap().name, "afternoon");
    }

    #[test]
    fn unmatched_hour_falls_back_to_the_default() {
        let rules = vec![rule(days(&[0, 1, 2, 3, 4]), &[7, 8, 9, 10, 11], "morning")];
        let lists = playlists(&["morning", "default"]);

        let resolved = resolve(at((2025, 7, 9), 20), &rules, &lists, Some("default"));
        assert_eq!(resolved.unwrap().name, "default");
    }

    #[test]
    fn no_match_and_no_default_resolves_to_none() {
        let rules = vec![rule(days(&[5, 6]), &[10], "weekend")];
        let lists = playlists(&["weekend"]);

        assert!(resolve(at((2025, 7, 9), 10), &rules, &lists, None).is_none());
    }

    #[test]
    fn first_declared_rule_wins_between_two_matches() {
        let rules = vec![
            rule(days(&[2]), &[10], "first"),
            rule(days(&[2]), &[10], "second"),
        ];
        let lists = playlists(&["first", "second"]);

        let resolved = resolve(at((2025, 7, 9), 10), &rules, &lists, None);
        assert_eq!(resolved.unwrap().name, "first");
    }

    #[test]
    fn declaration_order_beats_date_specificity() {
        // A weekday rule declared before a date rule covering the same instant
        // wins — there is no implicit date-over-weekday priority.
        let date = NaiveDate::from_ymd_opt(2025, 7, 9).unwrap();
        let rules = vec![
            rule(days(&[2]), &[10], "weekday"),
            rule(DaySelector::Date(date), &[10], "special"),
        ];
        let lists = playlists(&["weekday", "special"]);

        let resolved = resolve(at((2025, 7, 9), 10), &rules, &lists, None);
        assert_eq!(resolved.unwrap().name, "weekday");

        // Reversed declaration, reversed outcome.
        let rules: Vec<_> = rules.into_iter().rev().collect();
        let resolved = resolve(at((2025, 7, 9), 10), &rules, &lists, None);
        assert_eq!(resolved.unwrap().name, "special");
    }

    #[test]
    fn date_rule_only_applies_on_its_date() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 12).unwrap();
        let rules = vec![rule(DaySelector::Date(date), &[10], "special")];
        let lists = playlists(&["special", "default"]);

        let resolved = resolve(at((2025, 7, 12), 10), &rules, &lists, Some("default"));
        assert_eq!(resolved.unwrap().name, "special");

        let resolved = resolve(at((2025, 7, 13), 10), &rules, &lists, Some("default"));
        assert_eq!(resolved.unwrap().name, "default");
    }

    #[test]
    fn weekdays_count_from_monday() {
        // 2025-07-12 is a Saturday, day number 5.
        let rules = vec![rule(days(&[5]), &[10], "weekend")];
        let lists = playlists(&["weekend"]);

        assert!(resolve(at((2025, 7, 12), 10), &rules, &lists, None).is_some());
        assert!(resolve(at((2025, 7, 11), 10), &rules, &lists, None).is_none());
    }
}
