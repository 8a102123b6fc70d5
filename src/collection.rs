use serde::{Deserialize, Serialize};

pub trait GetId<T> {
    fn get_id(&self) -> &T;
}

/// Serializable collection keyed by id.
/// Keeps insertion order and is written out as a plain list.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(from = "Vec<V>", into = "Vec<V>")]
pub struct Collection<K, V>
where
    K: PartialEq + Clone,
    V: GetId<K> + Clone,
{
    data: Vec<V>,
    #[serde(skip)]
    _key: std::marker::PhantomData<K>,
}

impl<K, V> Default for Collection<K, V>
where
    K: PartialEq + Clone,
    V: GetId<K> + Clone,
{
    fn default() -> Self {
        Self {
            data: Vec::new(),
            _key: std::marker::PhantomData,
        }
    }
}

impl<K, V> Collection<K, V>
where
    K: PartialEq + Clone,
    V: GetId<K> + Clone,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn position(&self, id: &K) -> Option<usize> {
        self.data.iter().position(|item| item.get_id() == id)
    }

    #[must_use]
    pub fn get(&self, id: &K) -> Option<&V> {
        self.data.iter().find(|item| item.get_id() == id)
    }

    pub fn get_mut(&mut self, id: &K) -> Option<&mut V> {
        self.data.iter_mut().find(|item| item.get_id() == id)
    }

    /// Appends `item`, or replaces the item with the same id in place.
    /// Returns the replaced item.
    pub fn insert(&mut self, item: V) -> Option<V> {
        match self.position(item.get_id()) {
            Some(index) => Some(std::mem::replace(&mut self.data[index], item)),
            None => {
                self.data.push(item);
                None
            }
        }
    }

    pub fn remove(&mut self, id: &K) -> Option<V> {
        let index = self.position(id)?;
        Some(self.data.remove(index))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, V> {
        self.data.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[V] {
        &self.data
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<K, V> From<Vec<V>> for Collection<K, V>
where
    K: PartialEq + Clone,
    V: GetId<K> + Clone,
{
    /// later duplicates replace earlier ones
    fn from(value: Vec<V>) -> Self {
        let mut obj: Self = Self::new();
        value.into_iter().for_each(|v| {
            obj.insert(v);
        });
        obj
    }
}

impl<K, V> From<Collection<K, V>> for Vec<V>
where
    K: PartialEq + Clone,
    V: GetId<K> + Clone,
{
    fn from(val: Collection<K, V>) -> Self {
        val.data
    }
}

impl<'a, K, V> IntoIterator for &'a Collection<K, V>
where
    K: PartialEq + Clone,
    V: GetId<K> + Clone,
{
    type Item = &'a V;
    type IntoIter = std::slice::Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}
