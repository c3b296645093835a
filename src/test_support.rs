//! Fixtures shared by the in-module tests.

use crate::core::model::{DocumentId, NewDocument, NewNode};
use crate::storage::Store;

pub fn doc(project: &str, source: &str) -> NewDocument {
    NewDocument {
        project: project.to_string(),
        source: source.to_string(),
        title: source.trim_end_matches(".md").to_string(),
    }
}

pub fn node(full_id: &str, document_id: DocumentId, text: &str) -> NewNode {
    NewNode {
        full_id: full_id.to_string(),
        document_id,
        kind: "chunk".to_string(),
        text: text.to_string(),
        position: 0,
    }
}

/// Insert a document with a single node holding `text`. Returns the document id.
pub fn add_note(store: &Store, project: &str, source: &str, text: &str) -> DocumentId {
    let doc_id = store.insert_document(&doc(project, source)).unwrap();
    store
        .insert_node(&node(&format!("{}#0", source), doc_id, text))
        .unwrap();
    doc_id
}

/// One document in project `brain` holding nodes `v0..vN`, each with the
/// given vector under `model`.
pub fn seed_vectors(store: &Store, model: &str, vectors: &[Vec<f32>]) -> DocumentId {
    let doc_id = store.insert_document(&doc("brain", "vectors.md")).unwrap();
    for (i, vector) in vectors.iter().enumerate() {
        let full_id = format!("v{}", i);
        store
            .insert_node(&node(&full_id, doc_id, &format!("vector node {}", i)))
            .unwrap();
        store.put_embedding(&full_id, model, vector).unwrap();
    }
    doc_id
}
