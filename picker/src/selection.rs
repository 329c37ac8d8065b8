use api_client::MediaItem;

/// The media items the user picked, in the order they were picked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    items: Vec<MediaItem>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a selection from `items`, keeping the first occurrence of each id.
    pub fn from_items(items: Vec<MediaItem>) -> Self {
        let mut selection = Self::new();
        for item in items {
            selection.insert(item);
        }
        selection
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|i| i.id == id)
    }

    /// Returns false if an item with the same id is already selected.
    pub fn insert(&mut self, item: MediaItem) -> bool {
        if self.contains(&item.id) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<MediaItem> {
        let idx = self.items.iter().position(|i| i.id == id)?;
        Some(self.items.remove(idx))
    }

    pub fn replace(&mut self, items: Vec<MediaItem>) {
        *self = Self::from_items(items);
    }
}
