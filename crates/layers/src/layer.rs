use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LayerId(pub u64);

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of a page's layer list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerEntry {
    pub name: String,
    pub visible: bool,
    pub id: LayerId,
}

/// Ordered layer entries with ids handed out monotonically, starting at 1.
///
/// Ids are never reused within a session, even after removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerList {
    entries: Vec<LayerEntry>,
    next_id: u64,
}

impl LayerList {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    /// Append a visible entry and return its id.
    pub fn push(&mut self, name: impl Into<String>) -> LayerId {
        let id = LayerId(self.next_id);
        self.next_id += 1;
        self.entries.push(LayerEntry {
            name: name.into(),
            visible: true,
            id,
        });
        id
    }

    pub fn get(&self, id: LayerId) -> Option<&LayerEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Flip visibility; returns the new state.
    pub fn toggle(&mut self, id: LayerId) -> Option<bool> {
        let entry = self.entries.iter_mut().find(|e| e.id == id)?;
        entry.visible = !entry.visible;
        Some(entry.visible)
    }

    pub fn remove(&mut self, id: LayerId) -> Option<LayerEntry> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(pos))
    }

    pub fn entries(&self) -> &[LayerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for LayerList {
    fn default() -> Self {
        Self::new()
    }
}
