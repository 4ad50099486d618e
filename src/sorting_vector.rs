//! Per-document vector of sortable field values.
//!
//! Retrieval sorts by these without loading document bodies. Slots are
//! keyed by the schema's sort index; unwritten slots stay `Nil`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum SortableValue {
    #[default]
    Nil,
    Str(Box<str>),
    Num(f64),
}

impl SortableValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SortableValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            SortableValue::Num(n) => Some(*n),
            _ => None,
        }
    }
}

/// Fixed-length array of tagged sortable values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SortingVector {
    values: Vec<SortableValue>,
}

impl SortingVector {
    pub fn new(len: usize) -> Self {
        Self {
            values: vec![SortableValue::Nil; len],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn put_str(&mut self, idx: usize, value: &str) {
        if let Some(slot) = self.values.get_mut(idx) {
            *slot = SortableValue::Str(value.into());
        }
    }

    pub fn put_num(&mut self, idx: usize, value: f64) {
        if let Some(slot) = self.values.get_mut(idx) {
            *slot = SortableValue::Num(value);
        }
    }

    pub fn get(&self, idx: usize) -> Option<&SortableValue> {
        self.values.get(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let mut sv = SortingVector::new(2);
        sv.put_str(0, "Widget");
        sv.put_num(1, 9.99);
        assert_eq!(sv.get(0).unwrap().as_str(), Some("Widget"));
        assert_eq!(sv.get(1).unwrap().as_num(), Some(9.99));
    }

    #[test]
    fn test_out_of_range_put_is_ignored() {
        let mut sv = SortingVector::new(1);
        sv.put_num(5, 1.0);
        assert_eq!(sv.get(0), Some(&SortableValue::Nil));
        assert!(sv.get(5).is_none());
    }
}
