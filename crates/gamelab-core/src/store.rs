//! Flattened, ordered collection of manifest documents

use crate::document::Document;

/// Holds every document to deploy, in load order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManifestStore {
    documents: Vec<Document>,
}

impl ManifestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, document: Document) {
        self.documents.push(document);
    }

    /// Documents whose kind is one of `kinds`, in original order
    pub fn filter_by_kind(&self, kinds: &[&str]) -> Vec<Document> {
        self.documents
            .iter()
            .filter(|doc| kinds.contains(&doc.kind()))
            .cloned()
            .collect()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl From<Vec<Document>> for ManifestStore {
    fn from(documents: Vec<Document>) -> Self {
        Self { documents }
    }
}

impl FromIterator<Document> for ManifestStore {
    fn from_iter<I: IntoIterator<Item = Document>>(iter: I) -> Self {
        Self {
            documents: iter.into_iter().collect(),
        }
    }
}

impl Extend<Document> for ManifestStore {
    fn extend<I: IntoIterator<Item = Document>>(&mut self, iter: I) {
        self.documents.extend(iter);
    }
}
