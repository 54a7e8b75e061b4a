//! Before/after consent cookie diffing.

use std::collections::HashSet;

use privaudit_shared::{CookieRecord, CookieTimelineEntry};

/// Build the consent timeline from the two snapshots.
///
/// Every cookie in `before` is emitted as set-before-consent. Every cookie in
/// `after` whose `(name, domain)` pair is absent from `before` is emitted as
/// triggered-by-consent. Cookies that disappeared between the snapshots are
/// not reported — the timeline is append-only from the observer's viewpoint.
pub fn diff_snapshots(
    before: &[CookieRecord],
    after: &[CookieRecord],
) -> Vec<CookieTimelineEntry> {
    let before_keys: HashSet<(&str, &str)> = before.iter().map(|c| c.identity()).collect();

    let mut timeline: Vec<CookieTimelineEntry> = before
        .iter()
        .map(|cookie| CookieTimelineEntry {
            cookie: cookie.clone(),
            set_before_consent: true,
            triggered_by_consent: false,
        })
        .collect();

    timeline.extend(
        after
            .iter()
            .filter(|c| !before_keys.contains(&c.identity()))
            .map(|cookie| CookieTimelineEntry {
                cookie: cookie.clone(),
                set_before_consent: false,
                triggered_by_consent: true,
            }),
    );

    timeline
}
