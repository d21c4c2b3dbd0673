/// Array-backed move-to-front list.
#[derive(Debug, Clone)]
pub(crate) struct MoveToFront<T> {
    items: Vec<T>,
}

impl<T: Copy> MoveToFront<T> {
    pub(crate) fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    pub(crate) fn front(&self) -> Option<T> {
        self.items.first().copied()
    }

    /// Move the entry at `index` to the front and return it.
    pub(crate) fn promote(&mut self, index: usize) -> Option<T> {
        let value = *self.items.get(index)?;
        self.items[..=index].rotate_right(1);
        Some(value)
    }
}
