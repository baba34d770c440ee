//! Text layout cache.
//!
//! Shaping text is the most expensive thing an overlay does per frame, and
//! overlays redraw the same labels every frame. Layouts are keyed by the
//! string itself; one live layout per string.

use std::collections::HashMap;

struct CacheEntry<L> {
    font_id: u64,
    layout: L,
}

pub struct TextLayoutCache<L> {
    entries: HashMap<String, CacheEntry<L>>,
}

impl<L> Default for TextLayoutCache<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L> TextLayoutCache<L> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Return the cached layout for `text`, creating it on a miss.
    ///
    /// A hit shaped with a different font is replaced, so a string never
    /// has two live layouts.
    pub fn get_or_create<E, F>(&mut self, text: &str, font_id: u64, create: F) -> Result<&L, E>
    where
        F: FnOnce() -> Result<L, E>,
    {
        let hit = self
            .entries
            .get(text)
            .is_some_and(|entry| entry.font_id == font_id);

        if !hit {
            let layout = create()?;
            self.entries
                .insert(text.to_string(), CacheEntry { font_id, layout });
        }

        Ok(&self.entries[text].layout)
    }

    pub fn contains(&self, text: &str) -> bool {
        self.entries.contains_key(text)
    }

    /// Drop every cached layout, returning how many were released.
    pub fn flush(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        if count > 0 {
            log::debug!("[SURFACE] Flushed {} cached text layout(s)", count);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
