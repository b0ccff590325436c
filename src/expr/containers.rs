//! Ordered argument containers.

/// An ordered, growable sequence used to pass argument lists to node
/// constructors.
///
/// # Examples
///
/// ```
/// use u_mipmodel::expr::IntArray;
///
/// let mut weights = IntArray::new();
/// weights.add(2);
/// weights.add(-1);
/// assert_eq!(weights.size(), 2);
/// assert_eq!(weights.get_item(1), Some(&-1));
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Array<T> {
    items: Vec<T>,
}

/// Sequence of expression nodes.
pub type ExprArray = Array<crate::expr::NodeId>;
/// Sequence of integers (weights, values, cardinality bounds).
pub type IntArray = Array<i64>;
/// Sequence of doubles.
pub type DoubleArray = Array<f64>;

impl<T> Array<T> {
    /// Creates an empty array.
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Number of items.
    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends an item.
    pub fn add(&mut self, item: T) {
        self.items.push(item);
    }

    /// Replaces the item at `i`, returning the previous one.
    ///
    /// Returns `None` and leaves the array untouched when `i` is out of range.
    pub fn set_item(&mut self, i: usize, item: T) -> Option<T> {
        self.items
            .get_mut(i)
            .map(|slot| std::mem::replace(slot, item))
    }

    pub fn get_item(&self, i: usize) -> Option<&T> {
        self.items.get(i)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T> From<Vec<T>> for Array<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

impl<T: Clone> From<&[T]> for Array<T> {
    fn from(items: &[T]) -> Self {
        Self {
            items: items.to_vec(),
        }
    }
}

impl<T, const N: usize> From<[T; N]> for Array<T> {
    fn from(items: [T; N]) -> Self {
        Self {
            items: items.into(),
        }
    }
}

impl<T> FromIterator<T> for Array<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<'a, T> IntoIterator for &'a Array<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_item() {
        let mut arr: DoubleArray = vec![1.0, 2.0].into();
        assert_eq!(arr.set_item(1, 5.0), Some(2.0));
        assert_eq!(arr.as_slice(), &[1.0, 5.0]);
        assert_eq!(arr.set_item(2, 9.0), None);
        assert_eq!(arr.size(), 2);
    }

    #[test]
    fn test_collect() {
        let arr: IntArray = (1..=3).collect();
        assert_eq!(arr.iter().sum::<i64>(), 6);
        assert!(!arr.is_empty());
        assert!(IntArray::new().is_empty());
    }
}
