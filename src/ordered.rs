//! Sibling lists with gapless 1-based ordering.
//!
//! An `OrderedCollection` holds the children of one parent sorted by
//! `order_position`, and the positions are always exactly `1..=len`.
//! Operations never mutate in place: each returns a new collection, so a
//! caller that abandons a result leaves the original untouched.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::model::Ordered;
use crate::reorder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedCollection<T> {
    parent_id: Option<String>,
    items: Vec<T>,
}

impl<T: Ordered> OrderedCollection<T> {
    /// An empty list under `parent_id` (`None` for the root book list).
    pub fn new(parent_id: Option<&str>) -> Self {
        Self {
            parent_id: parent_id.map(str::to_string),
            items: Vec::new(),
        }
    }

    /// Build a collection from stored records.
    ///
    /// Records are sorted by position and must all belong to `parent_id` and
    /// form exactly `1..=len`; anything else is a `ConstraintViolation`.
    pub fn from_records(parent_id: Option<&str>, mut records: Vec<T>) -> Result<Self> {
        for record in &records {
            if record.parent_id() != parent_id {
                return Err(Error::ConstraintViolation(format!(
                    "{} {} does not belong to {}",
                    T::LEVEL.noun(),
                    record.id(),
                    parent_id.unwrap_or("the root list")
                )));
            }
        }
        records.sort_by_key(|record| record.order_position());
        check_positions(&records)?;
        Ok(Self {
            parent_id: parent_id.map(str::to_string),
            items: records,
        })
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    pub fn positions(&self) -> Vec<u32> {
        self.items.iter().map(Ordered::order_position).collect()
    }

    /// Append `item` at `max(position) + 1` (1 when empty). Siblings are
    /// untouched.
    pub fn append(&self, mut item: T) -> Result<Self> {
        if item.parent_id() != self.parent_id() {
            return Err(Error::ConstraintViolation(format!(
                "{} {} has a different parent than its list",
                T::LEVEL.noun(),
                item.id()
            )));
        }
        if self.get(item.id()).is_some() {
            return Err(Error::ConstraintViolation(format!(
                "duplicate {} id {}",
                T::LEVEL.noun(),
                item.id()
            )));
        }
        let next = self
            .items
            .iter()
            .map(Ordered::order_position)
            .max()
            .unwrap_or(0)
            + 1;
        item.set_order_position(next);
        let mut items = self.items.clone();
        items.push(item);
        Ok(self.with_items(items))
    }

    /// Remove `id` and shift every later sibling down by one.
    ///
    /// Shifted siblings get `updated_at = now`. Returns the new list and the
    /// removed record.
    pub fn remove(&self, id: &str, now: DateTime<Utc>) -> Result<(Self, T)> {
        let index = self
            .index_of(id)
            .ok_or_else(|| Error::not_found(T::LEVEL, id))?;
        let mut items = self.items.clone();
        let removed = items.remove(index);
        let removed_position = removed.order_position();
        for item in items.iter_mut() {
            if item.order_position() > removed_position {
                item.set_order_position(item.order_position() - 1);
                item.touch(now);
            }
        }
        Ok((self.with_items(items), removed))
    }

    /// Move the element at `source` to `destination` (array semantics) and
    /// rewrite every position to `index + 1`.
    ///
    /// Elements whose position changed get `updated_at = now`.
    pub fn reorder(&self, source: usize, destination: usize, now: DateTime<Utc>) -> Result<Self> {
        let moved = reorder::move_item(&self.items, source, destination)?;
        let items = moved
            .into_iter()
            .zip(self.items.iter())
            .map(|(mut item, before)| {
                if item.id() != before.id() {
                    item.touch(now);
                }
                item
            })
            .collect();
        Ok(self.with_items(items))
    }

    /// Swap in an edited copy of an existing element, keeping its position.
    pub fn replace(&self, mut item: T) -> Result<Self> {
        let index = self
            .index_of(item.id())
            .ok_or_else(|| Error::not_found(T::LEVEL, item.id()))?;
        item.set_order_position(self.items[index].order_position());
        let mut items = self.items.clone();
        items[index] = item;
        Ok(self.with_items(items))
    }

    /// Elements whose position differs from the same id in `before`
    /// (elements new in `self` count as changed).
    pub fn repositioned_since<'a>(&'a self, before: &Self) -> Vec<&'a T> {
        self.items
            .iter()
            .filter(|item| {
                before
                    .get(item.id())
                    .map(|old| old.order_position() != item.order_position())
                    .unwrap_or(true)
            })
            .collect()
    }

    fn with_items(&self, items: Vec<T>) -> Self {
        Self {
            parent_id: self.parent_id.clone(),
            items,
        }
    }
}

impl<'a, T> IntoIterator for &'a OrderedCollection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Verify that sorted `records` carry positions exactly `1..=len`.
pub fn check_positions<T: Ordered>(records: &[T]) -> Result<()> {
    for (index, record) in records.iter().enumerate() {
        let expected = index as u32 + 1;
        if record.order_position() != expected {
            return Err(Error::ConstraintViolation(format!(
                "{} {} has position {} where {} was expected",
                T::LEVEL.noun(),
                record.id(),
                record.order_position(),
                expected
            )));
        }
    }
    Ok(())
}
