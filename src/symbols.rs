//! Translation between event masks and symbolic event names
//!
//! The names are the lower-case kernel names without the `IN_` prefix, e.g.
//! `"create"` for `IN_CREATE`. The table is [`EventKind::ALL`] and never
//! changes at runtime.

use crate::events::EventKind;
use crate::watches::WatchMask;

const SUPPORTED_EVENTS: [&str; EventKind::ALL.len()] = {
    let mut names = [""; EventKind::ALL.len()];
    let mut i = 0;
    while i < names.len() {
        names[i] = EventKind::ALL[i].name();
        i += 1;
    }
    names
};

/// Folds symbolic event names into a watch mask
///
/// Unrecognized names are skipped. Returns `None` if no name was recognized,
/// so "nothing matched" can't be confused with a mask someone built by hand.
///
/// # Examples
///
/// ```
/// use inotify_io::{events_to_mask, WatchMask};
///
/// assert_eq!(
///     events_to_mask(["create", "modify", "bogus"]),
///     Some(WatchMask::CREATE | WatchMask::MODIFY),
/// );
/// assert_eq!(events_to_mask(["bogus"]), None);
/// ```
pub fn events_to_mask<I>(names: I) -> Option<WatchMask>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mask = names
        .into_iter()
        .filter_map(|name| name.as_ref().parse::<EventKind>().ok())
        .fold(WatchMask::empty(), |mask, kind| {
            mask | WatchMask::from_bits_retain(kind.bits())
        });

    if mask.is_empty() {
        None
    } else {
        Some(mask)
    }
}

/// Lists the symbolic names of all event kinds whose bit is set in `bits`
///
/// Names come in table order, each at most once. Bits that belong to no event
/// kind are ignored.
pub fn mask_to_events(bits: u32) -> Vec<&'static str> {
    EventKind::ALL
        .iter()
        .filter(|kind| bits & kind.bits() != 0)
        .map(|kind| kind.name())
        .collect()
}

/// All symbolic event names, in declaration order
pub fn supported_events() -> &'static [&'static str] {
    &SUPPORTED_EVENTS
}

#[cfg(test)]
mod tests {
    use crate::{
        EventMask,
        WatchMask,
    };

    use super::{
        events_to_mask,
        mask_to_events,
        supported_events,
    };

    #[test]
    fn supported_events_should_keep_declaration_order() {
        assert_eq!(
            supported_events(),
            [
                "access",
                "attrib",
                "close_write",
                "close_nowrite",
                "create",
                "delete",
                "delete_self",
                "modify",
                "move_self",
                "moved_from",
                "moved_to",
                "open",
            ]
        );
    }

    #[test]
    fn events_to_mask_should_or_recognized_names() {
        let mask = events_to_mask(vec!["moved_from".to_string(), "moved_to".to_string()]);

        assert_eq!(mask, Some(WatchMask::MOVE));
    }

    #[test]
    fn events_to_mask_should_ignore_unknown_names() {
        assert_eq!(
            events_to_mask(["attrib", "CREATE", "rename"]),
            Some(WatchMask::ATTRIB)
        );
    }

    #[test]
    fn events_to_mask_should_return_none_without_matches() {
        assert_eq!(events_to_mask(Vec::<&str>::new()), None);
        assert_eq!(events_to_mask(["unknown", ""]), None);
    }

    #[test]
    fn mask_to_events_should_use_intersection() {
        assert_eq!(
            mask_to_events((EventMask::CREATE | EventMask::MODIFY).bits()),
            vec!["create", "modify"]
        );
        assert_eq!(mask_to_events(EventMask::ISDIR.bits()), Vec::<&str>::new());
    }

    #[test]
    fn mask_to_events_of_zero_should_be_empty() {
        assert!(mask_to_events(0).is_empty());
    }

    #[test]
    fn mask_to_events_of_all_bits_should_list_every_name_once() {
        let names = mask_to_events(u32::MAX);

        assert_eq!(names, supported_events());
    }

    #[test]
    fn names_of_a_mask_should_fold_back_into_the_same_mask() {
        // The twelve event kinds occupy the low twelve bits.
        for bits in 0u32..(1 << 12) {
            let mask = WatchMask::from_bits_retain(bits);

            let names = mask.event_names();
            let folded = events_to_mask(&names).map_or(0, |mask| mask.bits());

            assert_eq!(folded, bits);
        }
    }

    #[test]
    fn option_bits_should_have_no_names() {
        let mask = WatchMask::CLOSE_WRITE | WatchMask::ONESHOT | WatchMask::ONLYDIR;

        assert_eq!(mask.event_names(), vec!["close_write"]);
    }
}
