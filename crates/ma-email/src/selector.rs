//! Unread-first message selection under total and unread caps

use chrono::{DateTime, Utc};

/// Something the selector can rank
pub trait Candidate {
    /// Receipt time; `None` sorts as oldest
    fn received(&self) -> Option<DateTime<Utc>>;
    fn is_unread(&self) -> bool;
}

/// A selected item and whether its full content should be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selected<T> {
    pub item: T,
    pub fetch_full_content: bool,
}

/// Pick up to `max_unread` most recent unread items (full content), then
/// fill up to `max_total` with the most recent read items (preview only).
pub fn select<T: Candidate>(items: Vec<T>, max_total: usize, max_unread: usize) -> Vec<Selected<T>> {
    let mut sorted = items;
    // stable: equal dates keep server order
    sorted.sort_by(|a, b| b.received().cmp(&a.received()));

    let (unread, read): (Vec<T>, Vec<T>) = sorted.into_iter().partition(|item| item.is_unread());

    let unread_budget = max_unread.min(max_total);
    let mut selected: Vec<Selected<T>> = unread
        .into_iter()
        .take(unread_budget)
        .map(|item| Selected {
            item,
            fetch_full_content: true,
        })
        .collect();

    let read_budget = max_total - selected.len();
    selected.extend(read.into_iter().take(read_budget).map(|item| Selected {
        item,
        fetch_full_content: false,
    }));

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Mail {
        id: u32,
        day: Option<u32>,
        unread: bool,
    }

    impl Candidate for Mail {
        fn received(&self) -> Option<DateTime<Utc>> {
            self.day
                .map(|d| Utc.with_ymd_and_hms(2024, 5, d, 9, 0, 0).unwrap())
        }

        fn is_unread(&self) -> bool {
            self.unread
        }
    }

    fn mailbox(unread: u32, read: u32) -> Vec<Mail> {
        (0..unread + read)
            .map(|i| Mail {
                id: i,
                day: Some(1 + i % 28),
                unread: i < unread,
            })
            .collect()
    }

    fn ids(selected: &[Selected<Mail>]) -> Vec<u32> {
        selected.iter().map(|s| s.item.id).collect()
    }

    #[test]
    fn test_empty_mailbox() {
        assert!(select(Vec::<Mail>::new(), 20, 5).is_empty());
    }

    #[test]
    fn test_counts_for_mailbox_sizes() {
        for (u, r) in [(0, 0), (3, 0), (0, 40), (7, 30), (2, 4), (10, 10), (25, 0)] {
            let selected = select(mailbox(u, r), 20, 5);
            let unread = (u as usize).min(5);
            let read = (r as usize).min(20 - unread);
            assert_eq!(selected.len(), unread + read, "u={} r={}", u, r);

            let (full, preview): (Vec<_>, Vec<_>) =
                selected.iter().partition(|s| s.fetch_full_content);
            assert_eq!(full.len(), unread);
            assert_eq!(preview.len(), read);
            assert!(full.iter().all(|s| s.item.unread));
            assert!(preview.iter().all(|s| !s.item.unread));
        }
    }

    #[test]
    fn test_unread_first_each_group_date_desc() {
        let selected = select(mailbox(7, 30), 20, 5);

        let split = selected.iter().position(|s| !s.fetch_full_content).unwrap();
        assert_eq!(split, 5);
        for group in [&selected[..split], &selected[split..]] {
            assert!(group.windows(2).all(|w| w[0].item.received() >= w[1].item.received()));
        }
        // the five newest unread of days 1..=7
        assert_eq!(ids(&selected[..5]), vec![6, 5, 4, 3, 2]);
    }

    #[test]
    fn test_missing_date_sorts_oldest() {
        let items = vec![
            Mail { id: 1, day: None, unread: true },
            Mail { id: 2, day: Some(3), unread: true },
            Mail { id: 3, day: Some(9), unread: true },
        ];
        assert_eq!(ids(&select(items, 20, 5)), vec![3, 2, 1]);
    }

    #[test]
    fn test_unread_over_cap_is_not_used_as_filler() {
        let selected = select(mailbox(8, 1), 20, 5);
        assert_eq!(selected.len(), 6);
        assert_eq!(selected.iter().filter(|s| s.item.unread).count(), 5);
    }

    #[test]
    fn test_unread_cap_larger_than_total() {
        let selected = select(mailbox(10, 10), 3, 5);
        assert_eq!(selected.len(), 3);
        assert!(selected.iter().all(|s| s.fetch_full_content));
    }
}
