/// Round-robin ring over the devices that are currently probed.
///
/// New members join at the tail and never reset the cursor, so a device
/// added mid-rotation waits until the rotation reaches it. Removing a
/// member keeps the cursor on the same next element; a cursor past the end
/// wraps to 0.
#[derive(Debug, Clone)]
pub struct Rotation<K> {
    ring: Vec<K>,
    cursor: usize,
}

impl<K> Default for Rotation<K> {
    fn default() -> Self {
        Self {
            ring: Vec::new(),
            cursor: 0,
        }
    }
}

impl<K: PartialEq + Clone> Rotation<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Index of the member returned by the next [`Rotation::advance`]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn contains(&self, key: &K) -> bool {
        self.ring.contains(key)
    }

    /// Append `key` at the tail. Returns `false` if it is already a member.
    pub fn push(&mut self, key: K) -> bool {
        if self.contains(&key) {
            return false;
        }
        self.ring.push(key);
        true
    }

    /// Remove `key`. Returns `false` if it was not a member.
    pub fn remove(&mut self, key: &K) -> bool {
        let Some(index) = self.ring.iter().position(|k| k == key) else {
            return false;
        };

        self.ring.remove(index);
        if index < self.cursor {
            self.cursor -= 1;
        }
        if self.cursor >= self.ring.len() {
            self.cursor = 0;
        }
        true
    }

    /// Member at the cursor, then step the cursor modulo the ring length.
    pub fn advance(&mut self) -> Option<K> {
        if self.ring.is_empty() {
            return None;
        }
        if self.cursor >= self.ring.len() {
            self.cursor = 0;
        }

        let key = self.ring[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.ring.len();
        Some(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.ring.iter()
    }
}
