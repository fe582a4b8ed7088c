//! The opaque document type that flows through the graph.

use std::any::Any;
use std::sync::Arc;

/// A document is an opaque, reference-counted, dynamically-typed payload.
///
/// The runtime core never inspects a document's contents; it only moves it
/// between terminals. Concrete processors agree on a shape out of band (by
/// protocol tag) and downcast at the edges.
pub type Document = Arc<dyn Any + Send + Sync>;

/// Wraps a value as a [`Document`].
pub fn doc<T: Any + Send + Sync>(value: T) -> Document {
    Arc::new(value)
}

/// Downcasts a document to a concrete type, if it holds one.
pub fn downcast<T: Any + Send + Sync>(document: &Document) -> Option<&T> {
    document.downcast_ref::<T>()
}
