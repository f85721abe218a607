//! The ordered key list a SecurityGroup keeps: past keys behind the current
//! one, future keys ahead of it, bounded by `maxPastKeys`/`maxFutureKeys`
//! (spec.md §4.C).

use std::collections::VecDeque;

use crate::error::{KeyStorageError, Result};

/// One key slot in the list, addressed by its monotonically increasing id.
#[derive(Debug, Clone)]
pub struct KeyListItem {
    pub key_id: u32,
    pub key: Vec<u8>,
}

/// The id after `id`, wrapping from `U32_MAX` to `1` — `0` is never a valid
/// TokenId (spec.md §4.C/§8 testable property 3).
fn next_key_id(id: u32) -> u32 {
    if id == u32::MAX {
        1
    } else {
        id + 1
    }
}

/// A bounded, ordered run of [`KeyListItem`]s with one item marked current.
///
/// New keys are always appended past the tail; `addKeys` in the wire
/// protocol assigns ids `firstKeyId, firstKeyId + 1, ...` to the keys it
/// carries, so callers are expected to hand us ids already in that shape.
#[derive(Debug, Clone)]
pub struct KeyList {
    items: VecDeque<KeyListItem>,
    current_index: Option<usize>,
    max_past_keys: u32,
    max_future_keys: u32,
}

impl KeyList {
    pub fn new(max_past_keys: u32, max_future_keys: u32) -> Self {
        Self {
            items: VecDeque::new(),
            current_index: None,
            max_past_keys,
            max_future_keys,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Appends keys starting at `first_key_id`, incrementing by one per key
    /// (wrapping `U32_MAX` to `1`), then trims past keys beyond
    /// `max_past_keys` from the head. A key whose id already exists in the
    /// list is discarded rather than inserted (idempotent, spec.md §4.C).
    pub fn add_keys(&mut self, keys: impl IntoIterator<Item = Vec<u8>>, first_key_id: u32) {
        let mut key_id = first_key_id;
        for key in keys.into_iter() {
            if !self.items.iter().any(|item| item.key_id == key_id) {
                self.items.push_back(KeyListItem { key_id, key });
            }
            key_id = next_key_id(key_id);
        }
        self.trim_past();
    }

    fn trim_past(&mut self) {
        let Some(current) = self.current_index else {
            return;
        };
        let excess = current.saturating_sub(self.max_past_keys as usize);
        if excess > 0 {
            for _ in 0..excess {
                self.items.pop_front();
            }
            self.current_index = Some(current - excess);
        }
    }

    pub fn current(&self) -> Option<&KeyListItem> {
        self.current_index.and_then(|i| self.items.get(i))
    }

    pub fn current_key_id(&self) -> Option<u32> {
        self.current().map(|item| item.key_id)
    }

    /// Future keys still ahead of the current item; `None` current means the
    /// whole list is "future" relative to an unset cursor.
    pub fn future_len(&self) -> usize {
        match self.current_index {
            Some(i) => self.items.len().saturating_sub(i + 1),
            None => self.items.len(),
        }
    }

    pub fn past_len(&self) -> usize {
        self.current_index.unwrap_or(0)
    }

    pub fn is_near_future_exhaustion(&self) -> bool {
        self.future_len() == 0
    }

    /// Points the cursor at `key_id`, searching from the current position
    /// outward since the common case is the very next key in sequence.
    pub fn set_current(&mut self, key_id: u32) -> Result<()> {
        let index = self
            .items
            .iter()
            .position(|item| item.key_id == key_id)
            .ok_or(KeyStorageError::NotFound(key_id))?;
        self.current_index = Some(index);
        self.trim_past();
        Ok(())
    }

    /// Advances the cursor one slot forward, as a rollover timer fires.
    /// Returns the new current item, or an error if the list has run dry.
    pub fn roll_forward(&mut self) -> Result<&KeyListItem> {
        let next = match self.current_index {
            Some(i) => i + 1,
            None => 0,
        };
        if next >= self.items.len() {
            return Err(KeyStorageError::NoCurrentItem);
        }
        self.current_index = Some(next);
        self.trim_past();
        Ok(self.items.get(self.current_index.unwrap()).unwrap())
    }

    pub fn get(&self, key_id: u32) -> Option<&KeyListItem> {
        self.items.iter().find(|item| item.key_id == key_id)
    }

    pub fn max_future_keys(&self) -> u32 {
        self.max_future_keys
    }

    /// Discards the whole list and starts over at `current_token_id`,
    /// used when a SetSecurityKeys push carries a `currentTokenId` we have
    /// no record of (spec.md §4.E: "otherwise replace the entire list").
    pub fn replace_all(
        &mut self,
        current_token_id: u32,
        current_key: Vec<u8>,
        future_keys: Vec<Vec<u8>>,
    ) {
        self.items.clear();
        self.items.push_back(KeyListItem {
            key_id: current_token_id,
            key: current_key,
        });
        self.current_index = Some(0);
        let mut key_id = current_token_id;
        for key in future_keys {
            key_id = next_key_id(key_id);
            self.items.push_back(KeyListItem { key_id, key });
        }
    }

    /// Merges a SetSecurityKeys push whose `currentTokenId` matches an
    /// existing item: past keys before that id are kept as-is, the item at
    /// that id is overwritten, and future keys are written/appended from
    /// there forward, preserving list monotonicity.
    pub fn merge_forward(
        &mut self,
        current_token_id: u32,
        current_key: Vec<u8>,
        future_keys: Vec<Vec<u8>>,
    ) -> Result<()> {
        let anchor = self
            .items
            .iter()
            .position(|item| item.key_id == current_token_id)
            .ok_or(KeyStorageError::NotFound(current_token_id))?;
        self.items.truncate(anchor);
        self.items.push_back(KeyListItem {
            key_id: current_token_id,
            key: current_key,
        });
        let mut key_id = current_token_id;
        for key in future_keys {
            key_id = next_key_id(key_id);
            self.items.push_back(KeyListItem { key_id, key });
        }
        self.current_index = Some(anchor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_keys_assigns_sequential_ids_from_first_key_id() {
        let mut list = KeyList::new(2, 2);
        list.add_keys(vec![vec![1], vec![2], vec![3]], 100);
        assert_eq!(list.get(100).unwrap().key, vec![1]);
        assert_eq!(list.get(101).unwrap().key, vec![2]);
        assert_eq!(list.get(102).unwrap().key, vec![3]);
    }

    #[test]
    fn set_current_then_roll_forward_advances_cursor() {
        let mut list = KeyList::new(2, 2);
        list.add_keys(vec![vec![1], vec![2], vec![3]], 1);
        list.set_current(1).unwrap();
        assert_eq!(list.current_key_id(), Some(1));
        list.roll_forward().unwrap();
        assert_eq!(list.current_key_id(), Some(2));
    }

    #[test]
    fn roll_forward_past_tail_errors() {
        let mut list = KeyList::new(2, 2);
        list.add_keys(vec![vec![1]], 1);
        list.set_current(1).unwrap();
        assert!(list.roll_forward().is_err());
    }

    #[test]
    fn trims_past_keys_beyond_max_past() {
        let mut list = KeyList::new(1, 2);
        list.add_keys(vec![vec![1], vec![2], vec![3], vec![4]], 1);
        list.set_current(4).unwrap();
        assert_eq!(list.past_len(), 1);
        assert!(list.get(1).is_none());
        assert!(list.get(2).is_some());
    }

    #[test]
    fn future_exhaustion_detected_at_tail() {
        let mut list = KeyList::new(2, 2);
        list.add_keys(vec![vec![1], vec![2]], 1);
        list.set_current(2).unwrap();
        assert!(list.is_near_future_exhaustion());
    }

    #[test]
    fn add_keys_discards_a_key_whose_id_already_exists() {
        let mut list = KeyList::new(2, 2);
        list.add_keys(vec![vec![1], vec![2]], 100);
        // Re-applying an overlapping batch must not duplicate id 101 nor
        // overwrite its original bytes.
        list.add_keys(vec![vec![99], vec![3]], 101);
        assert_eq!(list.len(), 3);
        assert_eq!(list.get(101).unwrap().key, vec![2]);
        assert_eq!(list.get(102).unwrap().key, vec![3]);
    }

    #[test]
    fn add_keys_wraps_u32_max_to_one_never_zero() {
        let mut list = KeyList::new(2, 2);
        list.add_keys(vec![vec![1], vec![2], vec![3]], u32::MAX - 1);
        assert_eq!(list.get(u32::MAX - 1).unwrap().key, vec![1]);
        assert_eq!(list.get(u32::MAX).unwrap().key, vec![2]);
        assert!(list.get(0).is_none());
        assert_eq!(list.get(1).unwrap().key, vec![3]);
    }
}
