use crate::io::layer_record::LayerRecord;

/// A layer record paired with its traversal index
#[derive(Clone, Copy, Debug)]
pub struct IndexedLayer<'a> {
    pub index: usize,
    pub record: &'a LayerRecord,
}

impl<'a> IndexedLayer<'a> {
    pub fn new(index: usize, record: &'a LayerRecord) -> Self {
        Self { index, record }
    }
}

/// Reverse the stored order and number the layers 0..N-1 in traversal order
pub fn traversal_order(records: &[LayerRecord]) -> impl Iterator<Item = IndexedLayer<'_>> {
    records
        .iter()
        .rev()
        .enumerate()
        .map(|(index, record)| IndexedLayer::new(index, record))
}

/// Currently open ancestor folders, outermost first
#[derive(Debug, Default)]
pub struct FolderStack<'a> {
    folders: Vec<IndexedLayer<'a>>,
}

impl<'a> FolderStack<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, folder: IndexedLayer<'a>) {
        self.folders.push(folder);
    }

    /// Close the innermost folder. Returns `false` when nothing was open.
    pub fn pop(&mut self) -> bool {
        self.folders.pop().is_some()
    }

    pub fn depth(&self) -> usize {
        self.folders.len()
    }

    pub fn ancestors(&self) -> &[IndexedLayer<'a>] {
        &self.folders
    }

    pub fn snapshot(&self) -> Vec<IndexedLayer<'a>> {
        self.folders.clone()
    }
}
