//! In-memory ordering of list results.
//!
//! Views are ordered active-first, then most recent first, where "recent"
//! is `DeletedAt` when set and `CreatedAt` otherwise. Fields are reached
//! through caller-supplied accessors so one comparator serves every entity.
//!
//! Timestamps were written by this store as RFC 3339; an unparsable one is
//! a broken contract and panics.

use chrono::{DateTime, FixedOffset};
use std::cmp::Ordering;

pub type Comparator<'a, T> = Box<dyn Fn(&T, &T) -> Ordering + 'a>;

/// Chain of comparators evaluated in priority order; the first non-equal
/// result decides.
pub struct MultiSorter<'a, T> {
    comparators: Vec<Comparator<'a, T>>,
}

impl<T> Default for MultiSorter<'_, T> {
    fn default() -> Self {
        Self {
            comparators: Vec::new(),
        }
    }
}

impl<'a, T> MultiSorter<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_by(mut self, comparator: impl Fn(&T, &T) -> Ordering + 'a) -> Self {
        self.comparators.push(Box::new(comparator));
        self
    }

    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        self.comparators
            .iter()
            .map(|comparator| comparator(a, b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// Stable sort: ties keep their input order.
    pub fn sort(&self, items: &mut [T]) {
        items.sort_by(|a, b| self.compare(a, b));
    }
}

/// Not-deleted (empty `deleted_at`) before deleted.
pub fn deleted_last<'a, T>(
    deleted_at: impl Fn(&T) -> &str + 'a,
) -> impl Fn(&T, &T) -> Ordering + 'a {
    move |a: &T, b: &T| {
        let a_deleted = !deleted_at(a).is_empty();
        let b_deleted = !deleted_at(b).is_empty();
        a_deleted.cmp(&b_deleted)
    }
}

/// Later `deleted_at`-or-`created_at` first.
pub fn most_recent_first<'a, T>(
    deleted_at: impl Fn(&T) -> &str + 'a,
    created_at: impl Fn(&T) -> &str + 'a,
) -> impl Fn(&T, &T) -> Ordering + 'a {
    move |a: &T, b: &T| {
        let touched_at = |item: &T| {
            let deleted = deleted_at(item);
            parse_timestamp(if deleted.is_empty() {
                created_at(item)
            } else {
                deleted
            })
        };
        touched_at(b).cmp(&touched_at(a))
    }
}

/// Sorts views active-first, then most recently touched first.
pub fn sort_by_recency<T>(
    items: &mut [T],
    deleted_at: impl Fn(&T) -> &str,
    created_at: impl Fn(&T) -> &str,
) {
    MultiSorter::new()
        .then_by(deleted_last(&deleted_at))
        .then_by(most_recent_first(&deleted_at, &created_at))
        .sort(items);
}

fn parse_timestamp(value: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(value)
        .unwrap_or_else(|err| panic!("stored timestamp `{value}` is not RFC 3339: {err}"))
}

#[cfg(test)]
mod tests {
    use super::{deleted_last, MultiSorter};
    use std::cmp::Ordering;

    #[test]
    fn later_comparators_only_break_ties() {
        let mut items = vec![(1, 'b'), (0, 'z'), (1, 'a')];
        MultiSorter::new()
            .then_by(|a: &(i32, char), b: &(i32, char)| a.0.cmp(&b.0))
            .then_by(|a: &(i32, char), b: &(i32, char)| a.1.cmp(&b.1))
            .sort(&mut items);
        assert_eq!(items, vec![(0, 'z'), (1, 'a'), (1, 'b')]);
    }

    #[test]
    fn empty_sorter_keeps_input_order() {
        let mut items = vec![3, 1, 2];
        MultiSorter::<i32>::new().sort(&mut items);
        assert_eq!(items, vec![3, 1, 2]);
    }

    #[test]
    fn deleted_last_orders_by_tombstone_presence() {
        let compare = deleted_last(|value: &String| value.as_str());
        let active = String::new();
        let deleted = "2024-01-01T00:00:00Z".to_string();
        assert_eq!(compare(&active, &deleted), Ordering::Less);
        assert_eq!(compare(&deleted, &active), Ordering::Greater);
        assert_eq!(compare(&deleted, &deleted), Ordering::Equal);
    }
}
