//! Drag-and-drop moves within one sibling list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::Ordered;

/// Position row handed to `RecordStore` batch upserts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PositionUpdate {
    pub id: String,
    pub order_position: u32,
    /// Refreshed timestamp for rows whose position changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Relocate the element at `source` to `destination` and rewrite every
/// element's position to its new 1-based index.
///
/// Array semantics: the element is removed first, then inserted at
/// `destination` in the shortened list. `source == destination` returns the
/// input unchanged. Either index outside `0..len` is `InvalidIndex`.
pub fn move_item<T: Ordered>(list: &[T], source: usize, destination: usize) -> Result<Vec<T>> {
    let len = list.len();
    for index in [source, destination] {
        if index >= len {
            return Err(Error::InvalidIndex { index, len });
        }
    }

    let mut moved = list.to_vec();
    if source == destination {
        return Ok(moved);
    }

    let item = moved.remove(source);
    moved.insert(destination, item);
    for (index, item) in moved.iter_mut().enumerate() {
        item.set_order_position(index as u32 + 1);
    }
    Ok(moved)
}

/// Position rows for `items`, carrying each element's `updated_at`.
pub fn position_batch<'a, T, I>(items: I) -> Vec<PositionUpdate>
where
    T: Ordered + 'a,
    I: IntoIterator<Item = &'a T>,
{
    items
        .into_iter()
        .map(|item| PositionUpdate {
            id: item.id().to_string(),
            order_position: item.order_position(),
            updated_at: Some(item.updated_at()),
        })
        .collect()
}
