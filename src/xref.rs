use log::warn;
use std::collections::BTreeMap;

/// Highest generation number; an entry that reaches it is frozen and never
/// handed out again.
pub const MAX_GENERATION: u16 = 65535;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XrefType {
    /// Cross-reference stream (PDF 1.5 and later).
    CrossReferenceStream,
    /// Classical cross-reference table.
    CrossReferenceTable,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum XrefEntry {
    /// Member of the circular free list headed at entry 0.
    Free { next_free: u32, generation: u16 },
    /// Slot that reached the maximum generation; kept out of the free list.
    UnusableFree,
    /// Object stored at a byte offset in the file.
    Normal { offset: u64, generation: u16 },
    /// Object packed inside the object stream `container` at `index`.
    Compressed { container: u32, index: u16 },
}

impl XrefEntry {
    pub fn is_normal(&self) -> bool {
        matches!(*self, XrefEntry::Normal { .. })
    }

    pub fn is_compressed(&self) -> bool {
        matches!(*self, XrefEntry::Compressed { .. })
    }

    pub fn is_free(&self) -> bool {
        matches!(*self, XrefEntry::Free { .. } | XrefEntry::UnusableFree)
    }

    pub fn generation(&self) -> u16 {
        match *self {
            XrefEntry::Free { generation, .. } => generation,
            XrefEntry::UnusableFree => MAX_GENERATION,
            XrefEntry::Normal { generation, .. } => generation,
            XrefEntry::Compressed { .. } => 0,
        }
    }
}

/// In-memory cross-reference table.
///
/// Entry 0 always exists, is free with generation 65535, and heads the
/// circular free list: following `next_free` pointers from entry 0 visits
/// every recyclable free entry and comes back to 0.
#[derive(Clone, Debug)]
pub struct Xref {
    /// Entries indexed by object number.
    pub entries: BTreeMap<u32, XrefEntry>,
    /// Total number of entries, one more than the largest object number.
    pub size: u32,
    /// Which representation the source document used.
    pub cross_reference_type: XrefType,
}

impl Xref {
    pub fn new(size: u32, xref_type: XrefType) -> Xref {
        let mut entries = BTreeMap::new();
        entries.insert(
            0,
            XrefEntry::Free {
                next_free: 0,
                generation: MAX_GENERATION,
            },
        );
        Xref {
            entries,
            size: size.max(1),
            cross_reference_type: xref_type,
        }
    }

    pub fn get(&self, id: u32) -> Option<&XrefEntry> {
        self.entries.get(&id)
    }

    pub fn insert(&mut self, id: u32, entry: XrefEntry) {
        self.entries.insert(id, entry);
        if id >= self.size {
            self.size = id + 1;
        }
    }

    /// Merge an earlier cross-reference section into this one. Entries read
    /// from newer sections win, so only absent object numbers are taken.
    pub fn merge(&mut self, prev: Xref) {
        for (id, entry) in prev.entries {
            self.entries.entry(id).or_insert(entry);
        }
        self.size = self.size.max(prev.size);
    }

    pub fn max_id(&self) -> u32 {
        self.entries.keys().next_back().copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.entries.insert(
            0,
            XrefEntry::Free {
                next_free: 0,
                generation: MAX_GENERATION,
            },
        );
        self.size = 1;
    }

    fn head(&self) -> u32 {
        match self.entries.get(&0) {
            Some(XrefEntry::Free { next_free, .. }) => *next_free,
            _ => 0,
        }
    }

    fn set_head(&mut self, next_free: u32) {
        self.entries.insert(
            0,
            XrefEntry::Free {
                next_free,
                generation: MAX_GENERATION,
            },
        );
    }

    /// Release an object number onto the head of the free list, bumping its
    /// generation. A slot that reaches the maximum generation is frozen.
    pub fn free(&mut self, id: u32) {
        if id == 0 {
            return;
        }
        let generation = self.entries.get(&id).map(XrefEntry::generation).unwrap_or(0);
        if generation >= MAX_GENERATION - 1 {
            self.entries.insert(id, XrefEntry::UnusableFree);
            return;
        }
        let head = self.head();
        self.entries.insert(
            id,
            XrefEntry::Free {
                next_free: head,
                generation: generation + 1,
            },
        );
        self.set_head(id);
    }

    /// Pop the head of the free list, returning the recycled object number
    /// and the generation a new object in that slot must carry.
    pub fn recycle(&mut self) -> Option<(u32, u16)> {
        let head = self.head();
        if head == 0 {
            return None;
        }
        match self.entries.get(&head) {
            Some(&XrefEntry::Free { next_free, generation }) => {
                self.set_head(next_free);
                Some((head, generation))
            }
            other => {
                warn!("free list head {} is not a free entry: {:?}", head, other);
                self.set_head(0);
                None
            }
        }
    }

    /// Walk the free list from entry 0. Returns the visited object numbers
    /// (entry 0 excluded) or `None` if the walk does not cycle back to 0.
    pub fn free_list(&self) -> Option<Vec<u32>> {
        let mut visited = Vec::new();
        let mut current = self.head();
        while current != 0 {
            if visited.contains(&current) || visited.len() > self.entries.len() {
                return None;
            }
            visited.push(current);
            current = match self.entries.get(&current) {
                Some(XrefEntry::Free { next_free, .. }) => *next_free,
                _ => return None,
            };
        }
        Some(visited)
    }
}
